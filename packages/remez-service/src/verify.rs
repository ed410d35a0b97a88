use remez_domain::{
	finding::{DetectionMethod, Finding},
	prefilter::Detection,
};
use remez_store::models::GroundTruthRecord;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
	Service, ServiceResult, Suspect,
	prompts,
	retrieval::RetrievalCandidate,
	scan::{ModelParse, parse_model_response},
};

/// Confidence assigned to a verified quotation vs. an allusion the verifier
/// marked implicit.
const EXPLICIT_CONFIDENCE: f32 = 0.85;
const IMPLICIT_CONFIDENCE: f32 = 0.6;

#[derive(Deserialize)]
struct RawFinding {
	source: String,
	snippet: String,
	justification: String,
	#[serde(default)]
	implicit: bool,
}

impl Service {
	/// Second pass: one verification call covering every suspect of the chunk
	/// together with its retrieved candidates.
	pub(crate) async fn verify_suspects(
		&self,
		chunk_text: &str,
		suspects: &[(Suspect, Vec<RetrievalCandidate>)],
		examples: &[GroundTruthRecord],
	) -> ServiceResult<ModelParse<(Vec<Finding>, String)>> {
		let messages = [prompts::verify_user_message(chunk_text, suspects, examples)];
		let schema = prompts::findings_schema();
		let raw = self
			.generate_with_retry(prompts::VERIFY_SYSTEM_PROMPT, &messages, Some(&schema))
			.await?;

		match parse_model_response(&raw)? {
			ModelParse::Value(value) => Ok(ModelParse::Value((findings_from_value(&value), raw))),
			ModelParse::Truncated => Ok(ModelParse::Truncated),
		}
	}

	/// Combined scan-and-verify in one call, for callers that trade precision
	/// for half the generative traffic.
	pub(crate) async fn single_pass(
		&self,
		chunk_text: &str,
		detection: &Detection,
		examples: &[GroundTruthRecord],
	) -> ServiceResult<ModelParse<(Vec<Finding>, String)>> {
		let messages = [prompts::single_pass_user_message(chunk_text, detection, examples)];
		let schema = prompts::findings_schema();
		let raw = self
			.generate_with_retry(prompts::SINGLE_PASS_SYSTEM_PROMPT, &messages, Some(&schema))
			.await?;

		match parse_model_response(&raw)? {
			ModelParse::Value(value) => Ok(ModelParse::Value((findings_from_value(&value), raw))),
			ModelParse::Truncated => Ok(ModelParse::Truncated),
		}
	}
}

pub(crate) fn findings_from_value(value: &Value) -> Vec<Finding> {
	let Some(items) = value.get("findings").and_then(Value::as_array) else {
		return Vec::new();
	};

	items
		.iter()
		.filter_map(|item| serde_json::from_value::<RawFinding>(item.clone()).ok())
		.filter(|raw| !raw.source.trim().is_empty() && !raw.snippet.trim().is_empty())
		.map(|raw| Finding {
			id: Uuid::new_v4(),
			source: raw.source,
			snippet: raw.snippet,
			context: None,
			justification: raw.justification,
			confidence: if raw.implicit { IMPLICIT_CONFIDENCE } else { EXPLICIT_CONFIDENCE },
			implicit: raw.implicit,
			start_offset: None,
			end_offset: None,
			grounding_confidence: None,
			method: DetectionMethod::Generative,
		})
		.collect()
}
