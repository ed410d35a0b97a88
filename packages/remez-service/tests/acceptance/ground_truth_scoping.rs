use remez_domain::finding::{DetectionMethod, Finding};
use remez_service::{AnalyzeOptions, AnalyzeRequest, Correction};
use remez_store::models::CorrectionAction;
use uuid::Uuid;

use super::*;

const PRECEDENT_PHRASE: &str = "אין שליח לדבר עבירה";
const PRECEDENT_SOURCE: &str = "Kiddushin 42b";

fn reviewed_finding() -> Finding {
	Finding {
		id: Uuid::new_v4(),
		source: PRECEDENT_SOURCE.to_string(),
		snippet: PRECEDENT_PHRASE.to_string(),
		context: None,
		justification: "Reviewed in an earlier document.".to_string(),
		confidence: 0.85,
		implicit: false,
		start_offset: None,
		end_offset: None,
		grounding_confidence: None,
		method: DetectionMethod::Generative,
	}
}

fn correction(action: CorrectionAction, reviewer: &str) -> Correction {
	Correction {
		finding: reviewed_finding(),
		action,
		corrected_source: None,
		reason: Some("precedent for tests".to_string()),
		reviewer: reviewer.to_string(),
	}
}

/// Floors relaxed so the token-bag fake embeddings clear them.
fn relaxed_config() -> remez_config::Config {
	let mut cfg = remez_testkit::test_config();

	cfg.ground_truth.auto_approve_floor = 0.7;
	cfg.ground_truth.auto_reject_floor = 0.7;

	cfg
}

fn quoting_request() -> AnalyzeRequest {
	AnalyzeRequest {
		document_id: "doc-1".to_string(),
		text: format!("שנאמר {PRECEDENT_PHRASE}"),
	}
}

fn options_for(identity: &str) -> AnalyzeOptions {
	AnalyzeOptions {
		two_pass: Some(true),
		identity: Some(identity.to_string()),
		..Default::default()
	}
}

#[tokio::test]
async fn an_approved_precedent_becomes_a_finding_without_verification() {
	let harness = harness_with(relaxed_config());

	harness
		.service
		.record_correction(correction(CorrectionAction::Approve, "rav-a"))
		.await
		.expect("recording failed");

	let findings = harness
		.service
		.analyze(&quoting_request(), &options_for("rav-a"))
		.await
		.expect("analysis failed");

	assert_eq!(harness.generative.call_count(), 0);
	assert!(findings.iter().any(|finding| {
		finding.method == DetectionMethod::GroundTruth && finding.source == PRECEDENT_SOURCE
	}));
}

#[tokio::test]
async fn precedents_never_leak_across_reviewer_identities() {
	let harness = harness_with(relaxed_config());

	harness
		.service
		.record_correction(correction(CorrectionAction::Approve, "rav-a"))
		.await
		.expect("recording failed");
	harness.generative.push_ok(r#"{"suspects": []}"#);

	let findings = harness
		.service
		.analyze(&quoting_request(), &options_for("rav-b"))
		.await
		.expect("analysis failed");

	assert!(
		!findings.iter().any(|finding| finding.method == DetectionMethod::GroundTruth),
		"a precedent recorded by rav-a must be invisible to rav-b"
	);
}

#[tokio::test]
async fn a_rejected_precedent_suppresses_generative_processing() {
	let harness = harness_with(relaxed_config());

	harness
		.service
		.record_correction(correction(CorrectionAction::Reject, "rav-a"))
		.await
		.expect("recording failed");

	let findings = harness
		.service
		.analyze(&quoting_request(), &options_for("rav-a"))
		.await
		.expect("analysis failed");

	assert_eq!(harness.generative.call_count(), 0);
	assert!(findings.is_empty());
}

#[tokio::test]
async fn a_precedent_for_absent_text_never_manufactures_a_finding() {
	let mut cfg = relaxed_config();

	// Even with no similarity floor at all, precedent may not project a
	// citation onto text where the phrase does not occur.
	cfg.ground_truth.auto_approve_floor = 0.;

	let harness = harness_with(cfg);

	harness
		.service
		.record_correction(correction(CorrectionAction::Approve, "rav-a"))
		.await
		.expect("recording failed");
	harness.generative.push_ok(r#"{"suspects": []}"#);

	let request = AnalyzeRequest {
		document_id: "doc-2".to_string(),
		text: "שנאמר דבר אחר לגמרי שאינו קשור".to_string(),
	};
	let findings = harness
		.service
		.analyze(&request, &options_for("rav-a"))
		.await
		.expect("analysis failed");

	assert!(
		!findings.iter().any(|finding| finding.method == DetectionMethod::GroundTruth),
		"precedent alone must not create findings for absent text"
	);
}

#[tokio::test]
async fn a_correction_requires_its_corrected_source() {
	let harness = harness();
	let mut invalid = correction(CorrectionAction::Correct, "rav-a");

	invalid.corrected_source = None;

	let result = harness.service.record_correction(invalid).await;

	assert!(matches!(result, Err(remez_service::ServiceError::InvalidRequest { .. })));
}
