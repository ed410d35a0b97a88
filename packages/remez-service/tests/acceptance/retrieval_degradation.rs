use std::sync::atomic::Ordering;

use remez_service::{AnalyzeOptions, AnalyzeRequest};

use super::*;

#[tokio::test]
async fn index_failure_degrades_to_verification_without_candidates() {
	let harness = harness();

	harness.index.seed("talmud", "Sanhedrin 37a:13", CANONICAL_TEXT);
	harness.index.fail_queries.store(64, Ordering::SeqCst);
	harness.generative.push_ok(
		&serde_json::json!({
			"suspects": [{
				"snippet": "כל המקיים נפש אחת מישראל",
				"concept": "saving a life",
				"keywords": ["מקיים נפש"],
			}]
		})
		.to_string(),
	);
	harness.generative.push_ok(r#"{"findings": []}"#);

	let request =
		AnalyzeRequest { document_id: "doc-1".to_string(), text: QUOTING_TEXT.to_string() };

	harness
		.service
		.analyze(&request, &AnalyzeOptions { two_pass: Some(true), ..Default::default() })
		.await
		.expect("retrieval failure must not fail the analysis");

	assert_eq!(harness.generative.call_count(), 2);

	// The verifier still ran, with an empty candidate block.
	let requests = harness.generative.requests.lock().expect("lock");

	assert!(!requests[1].contains("Candidate ["));
}

#[tokio::test]
async fn weak_semantic_matches_stay_below_the_floor() {
	let harness = harness();

	harness.index.seed("talmud", "Sanhedrin 37a:13", CANONICAL_TEXT);
	harness.index.seed("talmud", "Taanit 7a:4", "ומתלמידי יותר מכולן");

	let candidates = harness
		.service
		.retrieval
		.search("כל המקיים נפש אחת מישראל מעלה עליו הכתוב כאילו קיים עולם מלא", &[])
		.await;

	assert!(candidates.iter().any(|candidate| candidate.reference == "Sanhedrin 37a"));
	assert!(
		!candidates.iter().any(|candidate| candidate.reference == "Taanit 7a"),
		"a passage sharing no vocabulary must fall below the semantic floor"
	);
}

#[tokio::test]
async fn raising_the_semantic_floor_never_adds_candidates() {
	let mut previous = usize::MAX;

	for floor in [0., 0.65, 0.99] {
		let mut cfg = remez_testkit::test_config();

		cfg.retrieval.semantic_floor = floor;

		let harness = harness_with(cfg);

		harness.index.seed("talmud", "Sanhedrin 37a:13", CANONICAL_TEXT);
		harness.index.seed("talmud", "Taanit 7a:4", "ומתלמידי יותר מכולן");

		let candidates = harness.service.retrieval.search(QUOTING_TEXT, &[]).await;

		assert!(candidates.len() <= previous, "floor {floor} returned more candidates");

		previous = candidates.len();
	}
}

#[tokio::test]
async fn keyword_hits_boost_candidates_found_by_both_legs() {
	let harness = harness();

	harness.index.seed("talmud", "Sanhedrin 37a:13", CANONICAL_TEXT);

	let with_keyword = harness
		.service
		.retrieval
		.search(CANONICAL_TEXT, &["נפש אחת מישראל".to_string()])
		.await;
	let without_keyword = harness.service.retrieval.search(CANONICAL_TEXT, &[]).await;
	let boosted = with_keyword
		.iter()
		.find(|candidate| candidate.reference == "Sanhedrin 37a")
		.expect("candidate missing");
	let unboosted = without_keyword
		.iter()
		.find(|candidate| candidate.reference == "Sanhedrin 37a")
		.expect("candidate missing");

	assert!(boosted.score >= unboosted.score);
	assert_eq!(boosted.provenance, remez_service::Provenance::Hybrid);
}
