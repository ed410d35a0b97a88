use remez_domain::finding::DetectionMethod;
use remez_service::{AnalyzeOptions, AnalyzeRequest, ServiceError};
use remez_testkit::ScriptedResponse;

use super::*;

fn marker_request() -> AnalyzeRequest {
	AnalyzeRequest {
		document_id: "doc-1".to_string(),
		text: "שנאמר דברים בעלמא ותו לא מידי".to_string(),
	}
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
	let harness = harness();

	harness.generative.push(ScriptedResponse::Transient(503));
	harness.generative.push(ScriptedResponse::Quota);
	harness.generative.push_ok(r#"{"suspects": []}"#);

	harness
		.service
		.analyze(&marker_request(), &AnalyzeOptions { two_pass: Some(true), ..Default::default() })
		.await
		.expect("analysis failed");

	assert_eq!(harness.generative.call_count(), 3);
}

#[tokio::test]
async fn an_exhausted_retry_budget_surfaces_as_provider_exhausted() {
	let harness = harness();

	for _ in 0..8 {
		harness.generative.push(ScriptedResponse::Transient(503));
	}

	let result = harness
		.service
		.analyze(&marker_request(), &AnalyzeOptions { two_pass: Some(true), ..Default::default() })
		.await;

	assert!(matches!(result, Err(ServiceError::ProviderExhausted { .. })));
	// One initial attempt plus max_retries retries, never more.
	assert_eq!(harness.generative.call_count(), 4);
}

#[tokio::test]
async fn malformed_provider_errors_are_not_retried() {
	let harness = harness();

	harness
		.generative
		.push(ScriptedResponse::Malformed("no choices in response".to_string()));

	let findings = harness
		.service
		.analyze(&marker_request(), &AnalyzeOptions { two_pass: Some(true), ..Default::default() })
		.await
		.expect("a malformed response must not fail the analysis");

	assert!(findings.is_empty());
	assert_eq!(harness.generative.call_count(), 1);
}

#[tokio::test]
async fn a_malformed_chunk_keeps_the_other_findings() {
	let harness = harness();

	harness.generative.push(ScriptedResponse::Malformed("no content".to_string()));

	let request =
		AnalyzeRequest { document_id: "doc-1".to_string(), text: QUOTING_TEXT.to_string() };
	let findings = harness
		.service
		.analyze(&request, &AnalyzeOptions { two_pass: Some(true), ..Default::default() })
		.await
		.expect("one malformed chunk must not abort the document");

	// The zero-cost lexical match survives the failed generative pass.
	assert!(findings.iter().any(|finding| {
		finding.method == DetectionMethod::FuzzyIndex && finding.source == CANONICAL_SOURCE
	}));
}
