use remez_service::AnalyzeRequest;

use super::*;

fn request(text: &str) -> AnalyzeRequest {
	AnalyzeRequest { document_id: "doc-1".to_string(), text: text.to_string() }
}

fn two_pass() -> remez_service::AnalyzeOptions {
	remez_service::AnalyzeOptions { two_pass: Some(true), ..Default::default() }
}

#[tokio::test]
async fn two_pass_pipeline_produces_grounded_findings() {
	let harness = harness();

	harness.index.seed("talmud", "Sanhedrin 37a:13", CANONICAL_TEXT);
	harness.generative.push_ok(
		&serde_json::json!({
			"suspects": [{
				"snippet": "כל המקיים נפש אחת מישראל מעלה עליו הכתוב כאילו קיים עולם מלא",
				"concept": "saving a single life sustains a whole world",
				"keywords": ["מקיים נפש אחת"],
			}]
		})
		.to_string(),
	);
	harness.generative.push_ok(
		&serde_json::json!({
			"findings": [{
				"source": CANONICAL_SOURCE,
				"snippet": "כל המקיים נפש אחת מישראל מעלה עליו הכתוב כאילו קיים עולם מלא",
				"justification": "Near-verbatim quotation introduced by a citation formula.",
			}]
		})
		.to_string(),
	);

	let findings = harness
		.service
		.analyze(&request(QUOTING_TEXT), &two_pass())
		.await
		.expect("analysis failed");

	assert_eq!(harness.generative.call_count(), 2);

	let canonical: Vec<_> =
		findings.iter().filter(|finding| finding.source == CANONICAL_SOURCE).collect();

	assert!(!canonical.is_empty(), "expected a finding for {CANONICAL_SOURCE}");
	assert!(
		canonical.iter().any(|finding| finding.start_offset.is_some()),
		"expected the quotation to be grounded in the document"
	);

	// The verifier saw the seeded canonical passage, under its normalized
	// passage-level reference.
	let requests = harness.generative.requests.lock().expect("lock");

	assert!(requests[1].contains("Candidate [Sanhedrin 37a]"));
}

#[tokio::test]
async fn zero_suspects_skip_the_verification_call() {
	let harness = harness();

	harness.generative.push_ok(r#"{"suspects": []}"#);

	let findings = harness
		.service
		.analyze(&request("שנאמר דברים בעלמא ותו לא מידי"), &two_pass())
		.await
		.expect("analysis failed");

	assert_eq!(harness.generative.call_count(), 1);
	assert!(findings.is_empty());
}

#[tokio::test]
async fn truncated_verification_splits_the_chunk() {
	let harness = harness();
	let text = format!("שנאמר {}", "דברים בעלמא ".repeat(120));

	harness.generative.push_ok(
		&serde_json::json!({
			"suspects": [{ "snippet": "דברים בעלמא", "concept": "filler" }]
		})
		.to_string(),
	);
	// Truncated mid-structure; unrecoverable by repair, so the chunk splits.
	harness.generative.push_ok(r#"{"findings": [{"so"#);

	harness
		.service
		.analyze(&request(&text), &two_pass())
		.await
		.expect("analysis failed");

	// Scan + truncated verify, then one scan per half, each answering with no
	// suspects (the script is exhausted by then).
	assert_eq!(harness.generative.call_count(), 4);
}

#[tokio::test]
async fn single_pass_uses_one_call_per_chunk() {
	let harness = harness();

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

	let options =
		remez_service::AnalyzeOptions { two_pass: Some(false), ..Default::default() };
	let findings = harness
		.service
		.analyze(&request(QUOTING_TEXT), &options)
		.await
		.expect("analysis failed");

	assert_eq!(harness.generative.call_count(), 1);
	assert!(findings.iter().any(|finding| finding.source == CANONICAL_SOURCE));
}

#[tokio::test]
async fn empty_document_is_rejected() {
	let harness = harness();
	let result = harness.service.analyze(&request("   "), &two_pass()).await;

	assert!(matches!(result, Err(remez_service::ServiceError::InvalidRequest { .. })));
}
