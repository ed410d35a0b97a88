use std::sync::{Arc, Mutex};

use remez_service::{AnalysisPhase, AnalyzeOptions, AnalyzeRequest};

use super::*;

#[tokio::test]
async fn plain_document_makes_no_provider_calls() {
	let harness = harness();
	let events: Arc<Mutex<Vec<(usize, AnalysisPhase, usize)>>> = Arc::new(Mutex::new(Vec::new()));
	let sink = events.clone();

	harness.service.events().subscribe(move |progress: &remez_service::AnalysisProgress| {
		if let Ok(mut seen) = sink.lock() {
			seen.push((progress.chunk_index, progress.phase, progress.chars_processed));
		}
	});

	let request =
		AnalyzeRequest { document_id: "doc-1".to_string(), text: "x".repeat(9_000) };
	let findings = harness
		.service
		.analyze(&request, &AnalyzeOptions::default())
		.await
		.expect("analysis failed");

	assert!(findings.is_empty());
	assert_eq!(harness.generative.call_count(), 0);
	assert_eq!(harness.embedding.calls.load(std::sync::atomic::Ordering::SeqCst), 0);

	let seen = events.lock().expect("lock");
	let skipped = seen.iter().filter(|(_, phase, _)| *phase == AnalysisPhase::Skipped).count();

	// 9,000 characters at the 4,000-character budget make exactly three chunks.
	assert_eq!(skipped, 3);

	let done = seen
		.iter()
		.find(|(_, phase, _)| *phase == AnalysisPhase::Done)
		.expect("no completion event");

	// Every chunk was accounted for: the whole document was covered.
	assert_eq!(done.2, 9_000);
}

#[tokio::test]
async fn only_chunks_with_lexical_signal_reach_the_provider() {
	let harness = harness();

	harness.generative.push_ok(r#"{"findings": []}"#);
	harness.generative.push_ok(r#"{"findings": []}"#);

	// Chunks one and three open with a citation marker; chunk two carries no
	// lexical signal at all.
	let text = format!("שנאמר {}{}שנאמר {}", "א".repeat(3_994), "x".repeat(4_000), "א".repeat(994));
	let request = AnalyzeRequest { document_id: "doc-1".to_string(), text };

	harness
		.service
		.analyze(&request, &AnalyzeOptions { two_pass: Some(false), ..Default::default() })
		.await
		.expect("analysis failed");

	assert_eq!(harness.generative.call_count(), 2);
}
