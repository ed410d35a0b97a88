use remez_service::{AnalyzeOptions, AnalyzeRequest};

use super::*;

#[tokio::test]
async fn repeated_document_reuses_the_cached_response() {
	let harness = harness();
	let request =
		AnalyzeRequest { document_id: "doc-1".to_string(), text: QUOTING_TEXT.to_string() };
	let options = AnalyzeOptions { two_pass: Some(true), ..Default::default() };

	harness.generative.push_ok(
		&serde_json::json!({
			"suspects": [{ "snippet": "כל המקיים נפש אחת מישראל", "concept": "saving a life" }]
		})
		.to_string(),
	);
	harness.generative.push_ok(
		&serde_json::json!({
			"findings": [{
				"source": CANONICAL_SOURCE,
				"snippet": "כל המקיים נפש אחת מישראל",
				"justification": "Quotation.",
			}]
		})
		.to_string(),
	);

	let first =
		harness.service.analyze(&request, &options).await.expect("first analysis failed");

	assert_eq!(harness.generative.call_count(), 2);

	let second =
		harness.service.analyze(&request, &options).await.expect("second analysis failed");

	// The second run served the chunk from cache; no further provider calls.
	assert_eq!(harness.generative.call_count(), 2);

	let keys = |findings: &[remez_domain::finding::Finding]| {
		let mut keys: Vec<(String, String)> = findings
			.iter()
			.map(|finding| (finding.source.clone(), finding.snippet.clone()))
			.collect();

		keys.sort();

		keys
	};

	assert_eq!(keys(&first), keys(&second));
}

#[tokio::test]
async fn zero_suspect_chunks_are_cached_too() {
	let harness = harness();
	let request = AnalyzeRequest {
		document_id: "doc-2".to_string(),
		text: "שנאמר דברים בעלמא ותו לא מידי".to_string(),
	};
	let options = AnalyzeOptions { two_pass: Some(true), ..Default::default() };

	harness.generative.push_ok(r#"{"suspects": []}"#);
	harness.service.analyze(&request, &options).await.expect("first analysis failed");
	harness.service.analyze(&request, &options).await.expect("second analysis failed");

	assert_eq!(harness.generative.call_count(), 1);
}
