use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hebrew;

/// How many normalized snippet characters participate in the dedup key.
const SNIPPET_PREFIX_CHARS: usize = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
	LexicalMarker,
	FuzzyIndex,
	GroundTruth,
	Generative,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Finding {
	pub id: Uuid,
	/// Canonical source id, e.g. "Berakhot 2a".
	pub source: String,
	pub snippet: String,
	pub context: Option<String>,
	pub justification: String,
	pub confidence: f32,
	pub implicit: bool,
	pub start_offset: Option<usize>,
	pub end_offset: Option<usize>,
	pub grounding_confidence: Option<f32>,
	pub method: DetectionMethod,
}

impl Finding {
	pub fn dedup_key(&self) -> (String, String) {
		let source = self.source.trim().to_lowercase();
		let snippet: String =
			hebrew::normalize(&self.snippet).chars().take(SNIPPET_PREFIX_CHARS).collect();

		(source, snippet)
	}
}

/// Deduplicates findings by `(source, snippet prefix)`, keeping the
/// highest-confidence entry for each key while preserving first-seen order.
/// Running it twice yields the same result as running it once.
pub fn dedup_findings(findings: Vec<Finding>) -> Vec<Finding> {
	let mut kept: Vec<Finding> = Vec::with_capacity(findings.len());
	let mut by_key: AHashMap<(String, String), usize> = AHashMap::new();

	for finding in findings {
		let key = finding.dedup_key();

		match by_key.get(&key) {
			Some(&slot) =>
				if finding.confidence > kept[slot].confidence {
					kept[slot] = finding;
				},
			None => {
				by_key.insert(key, kept.len());
				kept.push(finding);
			},
		}
	}

	kept
}

#[cfg(test)]
mod tests {
	use super::*;

	fn finding(source: &str, snippet: &str, confidence: f32) -> Finding {
		Finding {
			id: Uuid::new_v4(),
			source: source.to_string(),
			snippet: snippet.to_string(),
			context: None,
			justification: "test".to_string(),
			confidence,
			implicit: false,
			start_offset: None,
			end_offset: None,
			grounding_confidence: None,
			method: DetectionMethod::Generative,
		}
	}

	#[test]
	fn keeps_highest_confidence_duplicate() {
		let deduped = dedup_findings(vec![
			finding("Berakhot 2a", "כדתנן התם", 0.6),
			finding("berakhot 2a", "כדתנן התם", 0.9),
		]);

		assert_eq!(deduped.len(), 1);
		assert_eq!(deduped[0].confidence, 0.9);
	}

	#[test]
	fn distinct_sources_are_kept_apart() {
		let deduped = dedup_findings(vec![
			finding("Berakhot 2a", "כדתנן התם", 0.6),
			finding("Shabbat 31a", "כדתנן התם", 0.6),
		]);

		assert_eq!(deduped.len(), 2);
	}

	#[test]
	fn dedup_is_idempotent() {
		let input = vec![
			finding("Berakhot 2a", "כדתנן התם", 0.6),
			finding("Berakhot 2a", "כדתנן התם בגמרא", 0.7),
			finding("Shabbat 31a", "דעלך סני לחברך לא תעביד", 0.8),
		];
		let once = dedup_findings(input);
		let twice = dedup_findings(once.clone());

		assert_eq!(once.len(), twice.len());

		for (a, b) in once.iter().zip(twice.iter()) {
			assert_eq!(a.id, b.id);
		}
	}
}
