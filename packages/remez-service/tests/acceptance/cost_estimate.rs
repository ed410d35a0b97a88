use super::*;

#[tokio::test]
async fn estimate_scales_with_document_size_and_passes() {
	let harness = harness();
	let short = "א".repeat(1_000);
	let long = "א".repeat(9_000);
	let short_estimate = harness.service.estimate_cost(&short, Some(true));
	let long_estimate = harness.service.estimate_cost(&long, Some(true));
	let single = harness.service.estimate_cost(&long, Some(false));

	assert_eq!(short_estimate.chunks, 1);
	assert_eq!(long_estimate.chunks, 3);
	assert_eq!(long_estimate.generative_calls, 6);
	assert_eq!(single.generative_calls, 3);
	assert!(long_estimate.estimated_tokens > short_estimate.estimated_tokens);
}
