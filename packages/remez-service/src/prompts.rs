use remez_domain::prefilter::Detection;
use remez_store::models::{CorrectionAction, GroundTruthRecord};
use serde_json::{Value, json};

use crate::{Suspect, retrieval::RetrievalCandidate};

pub(crate) const SCAN_SYSTEM_PROMPT: &str = "\
You locate possible citations of the canonical rabbinic corpus inside historical Hebrew prose. \
Report every passage that might quote or paraphrase a canonical text, even uncertain ones; a later \
step verifies each one. For each suspect return the exact snippet as it appears in the document, \
the canonical concept it seems to invoke, and short Hebrew keyword phrases from the snippet that \
would locate the canonical passage. Respond with JSON only.";

pub(crate) const VERIFY_SYSTEM_PROMPT: &str = "\
You verify suspected citations of the canonical rabbinic corpus against retrieved canonical \
passages. Confirm a suspect only when the document wording genuinely corresponds to a canonical \
passage, quoted or clearly paraphrased. Use the canonical reference id of the matched passage as \
the source. Mark a finding implicit when the document alludes to the passage without quoting it. \
Reviewer precedents describe past decisions on other documents; follow their judgments but never \
report a citation whose wording is absent from the document text itself. Respond with JSON only.";

pub(crate) const SINGLE_PASS_SYSTEM_PROMPT: &str = "\
You find citations of the canonical rabbinic corpus inside historical Hebrew prose. Report only \
citations whose wording is genuinely present in the document, quoted or clearly paraphrased, and \
cite each with its canonical reference id. Mark a finding implicit when the document alludes to a \
passage without quoting it. Reviewer precedents describe past decisions on other documents; follow \
their judgments but never report a citation whose wording is absent from the document text itself. \
Respond with JSON only.";

pub(crate) fn scan_schema() -> Value {
	json!({
		"name": "citation_suspects",
		"schema": {
			"type": "object",
			"properties": {
				"suspects": {
					"type": "array",
					"items": {
						"type": "object",
						"properties": {
							"snippet": { "type": "string" },
							"concept": { "type": "string" },
							"keywords": { "type": "array", "items": { "type": "string" } }
						},
						"required": ["snippet", "concept"]
					}
				}
			},
			"required": ["suspects"]
		}
	})
}

pub(crate) fn findings_schema() -> Value {
	json!({
		"name": "citation_findings",
		"schema": {
			"type": "object",
			"properties": {
				"findings": {
					"type": "array",
					"items": {
						"type": "object",
						"properties": {
							"source": { "type": "string" },
							"snippet": { "type": "string" },
							"justification": { "type": "string" },
							"implicit": { "type": "boolean" }
						},
						"required": ["source", "snippet", "justification"]
					}
				}
			},
			"required": ["findings"]
		}
	})
}

pub(crate) fn scan_user_message(chunk_text: &str, detection: &Detection) -> Value {
	let mut content = String::new();

	if !detection.markers.is_empty() {
		content.push_str(&format!("Citation markers present: {}.\n", detection.markers.join(", ")));
	}
	if !detection.tractate_names.is_empty() {
		content.push_str(&format!(
			"Tractate names mentioned: {}.\n",
			detection.tractate_names.join(", ")
		));
	}
	if !detection.fuzzy_matches.is_empty() {
		let sources: Vec<&str> =
			detection.fuzzy_matches.iter().map(|fuzzy| fuzzy.source.as_str()).collect();

		content.push_str(&format!("Near-verbatim overlap detected with: {}.\n", sources.join(", ")));
	}

	content.push_str("Document chunk:\n");
	content.push_str(chunk_text);

	json!({ "role": "user", "content": content })
}

pub(crate) fn verify_user_message(
	chunk_text: &str,
	suspects: &[(Suspect, Vec<RetrievalCandidate>)],
	examples: &[GroundTruthRecord],
) -> Value {
	let mut content = String::new();

	content.push_str(&ground_truth_block(examples));

	for (index, (suspect, candidates)) in suspects.iter().enumerate() {
		content.push_str(&format!(
			"Suspect {}:\nSnippet: {}\nConcept: {}\n",
			index + 1,
			suspect.snippet,
			suspect.concept
		));
		content.push_str(&candidates_block(candidates));
		content.push('\n');
	}

	content.push_str("Document chunk:\n");
	content.push_str(chunk_text);

	json!({ "role": "user", "content": content })
}

pub(crate) fn single_pass_user_message(
	chunk_text: &str,
	detection: &Detection,
	examples: &[GroundTruthRecord],
) -> Value {
	let mut content = String::new();

	content.push_str(&ground_truth_block(examples));

	if !detection.fuzzy_matches.is_empty() {
		let sources: Vec<&str> =
			detection.fuzzy_matches.iter().map(|fuzzy| fuzzy.source.as_str()).collect();

		content.push_str(&format!("Near-verbatim overlap detected with: {}.\n", sources.join(", ")));
	}

	content.push_str("Document chunk:\n");
	content.push_str(chunk_text);

	json!({ "role": "user", "content": content })
}

/// Retrieved canonical passages for one suspect. Empty retrieval yields an
/// empty block rather than a fabricated placeholder.
fn candidates_block(candidates: &[RetrievalCandidate]) -> String {
	let mut block = String::new();

	for candidate in candidates {
		block.push_str(&format!(
			"Candidate [{}] (score {:.2}): {}\n",
			candidate.reference, candidate.score, candidate.text
		));
	}

	block
}

fn ground_truth_block(examples: &[GroundTruthRecord]) -> String {
	if examples.is_empty() {
		return String::new();
	}

	let mut block = String::from("Reviewer precedents from past documents:\n");

	for example in examples {
		let verdict = match example.action {
			CorrectionAction::Approve => "approved".to_string(),
			CorrectionAction::Reject => "rejected".to_string(),
			CorrectionAction::Correct => format!(
				"corrected to {}",
				example.corrected_source.as_deref().unwrap_or("another source")
			),
		};

		block.push_str(&format!("- \"{}\" as {} was {}", example.phrase, example.source, verdict));

		if let Some(reason) = &example.reason {
			block.push_str(&format!(" ({reason})"));
		}

		block.push('\n');
	}

	block.push('\n');

	block
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;
	use uuid::Uuid;

	use super::*;
	use remez_store::models::ConfidenceTier;

	#[test]
	fn empty_retrieval_produces_an_empty_candidate_block() {
		assert_eq!(candidates_block(&[]), "");
	}

	#[test]
	fn ground_truth_block_names_the_verdict() {
		let example = GroundTruthRecord {
			id: Uuid::new_v4(),
			reviewer: "reviewer-1".to_string(),
			action: CorrectionAction::Reject,
			phrase: "כל המקיים נפש אחת".to_string(),
			snippet: "כל המקיים נפש אחת".to_string(),
			source: "Sanhedrin 37a".to_string(),
			corrected_source: None,
			reason: Some("paraphrase too loose".to_string()),
			confidence_tier: ConfidenceTier::High,
			created_at: OffsetDateTime::now_utc(),
		};
		let block = ground_truth_block(&[example]);

		assert!(block.contains("rejected"));
		assert!(block.contains("paraphrase too loose"));
	}
}
