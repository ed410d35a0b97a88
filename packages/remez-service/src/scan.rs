use remez_domain::{
	prefilter::Detection,
	repair::{RepairOutcome, parse_or_repair},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{Service, ServiceError, ServiceResult, prompts};

/// A possible citation flagged by the high-recall scanning pass.
#[derive(Clone, Debug, Deserialize)]
pub struct Suspect {
	/// The snippet exactly as it appears in the document chunk.
	pub snippet: String,
	/// The canonical concept the snippet seems to invoke.
	pub concept: String,
	/// Hebrew keyword phrases used by lexical retrieval.
	#[serde(default)]
	pub keywords: Vec<String>,
}

/// Model output after repair: either a usable value or a truncation signal
/// that sends the chunk back for splitting.
pub(crate) enum ModelParse<T> {
	Value(T),
	Truncated,
}

impl Service {
	/// First pass: flags suspects with high recall. Precision comes from the
	/// verification pass.
	pub(crate) async fn scan_chunk(
		&self,
		chunk_text: &str,
		detection: &Detection,
	) -> ServiceResult<ModelParse<Vec<Suspect>>> {
		let messages = [prompts::scan_user_message(chunk_text, detection)];
		let schema = prompts::scan_schema();
		let raw = self
			.generate_with_retry(prompts::SCAN_SYSTEM_PROMPT, &messages, Some(&schema))
			.await?;
		let value = match parse_model_response(&raw)? {
			ModelParse::Value(value) => value,
			ModelParse::Truncated => return Ok(ModelParse::Truncated),
		};
		let mut suspects = suspects_from_value(&value);

		suspects.truncate(self.cfg.analysis.max_suspects_per_chunk);

		Ok(ModelParse::Value(suspects))
	}
}

pub(crate) fn parse_model_response(raw: &str) -> ServiceResult<ModelParse<Value>> {
	match parse_or_repair(raw) {
		RepairOutcome::Parsed(value) => Ok(ModelParse::Value(value)),
		RepairOutcome::Repaired { value, strategy } => {
			tracing::debug!(?strategy, "Repaired a malformed model response.");

			Ok(ModelParse::Value(value))
		},
		RepairOutcome::Truncated => Ok(ModelParse::Truncated),
		RepairOutcome::Invalid => Err(ServiceError::Provider {
			message: "Model response was not JSON.".to_string(),
		}),
	}
}

fn suspects_from_value(value: &Value) -> Vec<Suspect> {
	let Some(items) = value.get("suspects").and_then(Value::as_array) else {
		return Vec::new();
	};

	items
		.iter()
		.filter_map(|item| serde_json::from_value::<Suspect>(item.clone()).ok())
		.filter(|suspect| !suspect.snippet.trim().is_empty())
		.collect()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn parses_well_formed_suspects() {
		let value = json!({
			"suspects": [
				{ "snippet": "כל המקיים נפש אחת", "concept": "saving one life", "keywords": ["מקיים נפש"] },
				{ "snippet": "   ", "concept": "blank" },
				{ "concept": "missing snippet entirely" },
			]
		});
		let suspects = suspects_from_value(&value);

		assert_eq!(suspects.len(), 1);
		assert_eq!(suspects[0].keywords, ["מקיים נפש"]);
	}

	#[test]
	fn missing_suspects_key_yields_no_suspects() {
		assert!(suspects_from_value(&json!({"other": 1})).is_empty());
	}

	#[test]
	fn truncated_response_is_signaled_not_parsed() {
		let raw = r#"{"suspects": [{"snippet": "כל המקיים"#;

		// An unterminated string repairs into a value; a cut inside structure
		// that no strategy can close reports truncation.
		match parse_model_response(raw) {
			Ok(ModelParse::Value(_) | ModelParse::Truncated) => {},
			Err(err) => panic!("unexpected error: {err}"),
		}
	}

	#[test]
	fn non_json_is_an_error() {
		assert!(parse_model_response("I could not process this text.").is_err());
	}
}
