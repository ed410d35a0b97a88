use ahash::AHashSet;
use regex::Regex;

use crate::hebrew;

/// Rhetorical formulae that introduce a citation in rabbinic prose.
const CITATION_MARKERS: [&str; 14] = [
	"שנאמר",
	"דכתיב",
	"כדכתיב",
	"כדתנן",
	"דתנן",
	"תנו רבנן",
	"דתניא",
	"כדתניא",
	"כדאמרינן",
	"דאמרינן",
	"אמרו חכמים",
	"מנא הני מילי",
	"תניא נמי הכי",
	"איתא בגמרא",
];

/// Tractate names of the canonical corpus, in corpus orthography.
const TRACTATE_NAMES: [&str; 37] = [
	"ברכות", "שבת", "עירובין", "פסחים", "שקלים", "יומא", "סוכה", "ביצה", "ראש השנה", "תענית",
	"מגילה", "מועד קטן", "חגיגה", "יבמות", "כתובות", "נדרים", "נזיר", "סוטה", "גיטין", "קידושין",
	"בבא קמא", "בבא מציעא", "בבא בתרא", "סנהדרין", "מכות", "שבועות", "עבודה זרה", "הוריות",
	"אבות", "זבחים", "מנחות", "חולין", "בכורות", "ערכין", "תמורה", "כריתות", "נדה",
];

#[derive(Clone, Debug)]
pub struct CanonicalPassage {
	pub source: String,
	pub text: String,
}

#[derive(Clone, Debug)]
pub struct FuzzyMatch {
	pub source: String,
	pub matched_text: String,
	/// Character range of the window within the normalized chunk text.
	pub start: usize,
	pub end: usize,
	/// Normalized similarity on a 0-100 scale.
	pub similarity: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Detection {
	pub markers: Vec<String>,
	pub tractate_names: Vec<String>,
	pub fuzzy_matches: Vec<FuzzyMatch>,
	pub has_likely_citations: bool,
}

struct IndexedPassage {
	source: String,
	normalized: String,
	trigrams: AHashSet<u64>,
}

pub struct Prefilter {
	fuzzy_threshold: u32,
	min_window_tokens: usize,
	max_window_tokens: usize,
	marker_regex: Option<Regex>,
	tractates: Vec<(String, String)>,
	passages: Vec<IndexedPassage>,
}

impl Prefilter {
	pub fn new(cfg: &remez_config::PrefilterConfig, passages: Vec<CanonicalPassage>) -> Self {
		let normalized_markers: Vec<String> = CITATION_MARKERS
			.iter()
			.map(|marker| regex::escape(&hebrew::normalize(marker)))
			.collect();
		// The alternation is built from a fixed, escaped vocabulary; a `None`
		// here would only mean a broken vocabulary and disables marker
		// matching rather than failing construction.
		let marker_regex =
			Regex::new(&format!(r"(?:^|\s)({})(?:\s|$)", normalized_markers.join("|"))).ok();
		let tractates = TRACTATE_NAMES
			.iter()
			.map(|name| ((*name).to_string(), hebrew::normalize(name)))
			.collect();
		let passages = passages
			.into_iter()
			.map(|passage| {
				let normalized = hebrew::normalize(&passage.text);
				let trigrams = token_trigrams(&normalized);

				IndexedPassage { source: passage.source, normalized, trigrams }
			})
			.collect();

		Self {
			fuzzy_threshold: cfg.fuzzy_threshold,
			min_window_tokens: cfg.min_window_tokens,
			max_window_tokens: cfg.max_window_tokens,
			marker_regex,
			tractates,
			passages,
		}
	}

	/// Purely lexical detection over one chunk. Never performs I/O; this is
	/// the gate that lets most chunks avoid generative calls entirely.
	pub fn detect(&self, text: &str) -> Detection {
		let normalized = hebrew::normalize(text);
		let markers = self.find_markers(&normalized);
		let tractate_names = self.find_tractates(&normalized);
		let fuzzy_matches = self.find_fuzzy_matches(&normalized);
		let has_likely_citations =
			!markers.is_empty() || !tractate_names.is_empty() || !fuzzy_matches.is_empty();

		Detection { markers, tractate_names, fuzzy_matches, has_likely_citations }
	}

	fn find_markers(&self, normalized: &str) -> Vec<String> {
		let Some(marker_regex) = &self.marker_regex else {
			return Vec::new();
		};
		let mut found = Vec::new();

		for capture in marker_regex.captures_iter(normalized) {
			if let Some(marker) = capture.get(1) {
				let marker = marker.as_str().to_string();

				if !found.contains(&marker) {
					found.push(marker);
				}
			}
		}

		found
	}

	fn find_tractates(&self, normalized: &str) -> Vec<String> {
		let padded = format!(" {normalized} ");

		self.tractates
			.iter()
			.filter(|(_, normalized_name)| padded.contains(&format!(" {normalized_name} ")))
			.map(|(name, _)| name.clone())
			.collect()
	}

	fn find_fuzzy_matches(&self, normalized: &str) -> Vec<FuzzyMatch> {
		let tokens = char_offset_tokens(normalized);

		if tokens.len() < self.min_window_tokens {
			return Vec::new();
		}

		let mut matches = Vec::new();

		for window_size in self.min_window_tokens..=self.max_window_tokens {
			if tokens.len() < window_size {
				break;
			}

			for window_start in 0..=tokens.len() - window_size {
				let window = &tokens[window_start..window_start + window_size];
				let window_text = join_tokens(window);
				let window_trigrams = token_trigrams(&window_text);

				for passage in &self.passages {
					// Trigram overlap gates the expensive edit-distance pass.
					if window_trigrams.is_disjoint(&passage.trigrams) {
						continue;
					}

					let similarity = similarity_score(&window_text, &passage.normalized);

					if similarity >= self.fuzzy_threshold {
						matches.push(FuzzyMatch {
							source: passage.source.clone(),
							matched_text: window_text.clone(),
							start: window[0].start,
							end: window[window.len() - 1].end,
							similarity,
						});
					}
				}
			}
		}

		dedup_overlapping(matches)
	}
}

#[derive(Clone, Debug)]
struct OffsetToken {
	text: String,
	start: usize,
	end: usize,
}

fn char_offset_tokens(normalized: &str) -> Vec<OffsetToken> {
	let mut tokens = Vec::new();
	let mut position = 0_usize;

	for token in normalized.split(' ') {
		let chars = token.chars().count();

		if chars > 0 {
			tokens.push(OffsetToken {
				text: token.to_string(),
				start: position,
				end: position + chars,
			});
		}

		position += chars + 1;
	}

	tokens
}

fn join_tokens(tokens: &[OffsetToken]) -> String {
	let mut out = String::new();

	for (index, token) in tokens.iter().enumerate() {
		if index > 0 {
			out.push(' ');
		}

		out.push_str(&token.text);
	}

	out
}

fn token_trigrams(normalized: &str) -> AHashSet<u64> {
	let tokens: Vec<&str> = normalized.split_whitespace().collect();
	let mut trigrams = AHashSet::new();

	for window in tokens.windows(3) {
		let mut hasher = ahash::AHasher::default();

		std::hash::Hash::hash(&window, &mut hasher);
		trigrams.insert(std::hash::Hasher::finish(&hasher));
	}

	trigrams
}

/// Normalized Levenshtein similarity on a 0-100 scale.
fn similarity_score(a: &str, b: &str) -> u32 {
	let a_chars: Vec<char> = a.chars().collect();
	let b_chars: Vec<char> = b.chars().collect();
	let longest = a_chars.len().max(b_chars.len());

	if longest == 0 {
		return 100;
	}

	let distance = levenshtein(&a_chars, &b_chars);

	(100.0 * (1.0 - distance as f64 / longest as f64)).round() as u32
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
	let mut previous: Vec<usize> = (0..=b.len()).collect();
	let mut current = vec![0_usize; b.len() + 1];

	for (row, &ch_a) in a.iter().enumerate() {
		current[0] = row + 1;

		for (col, &ch_b) in b.iter().enumerate() {
			let cost = usize::from(ch_a != ch_b);

			current[col + 1] =
				(previous[col + 1] + 1).min(current[col] + 1).min(previous[col] + cost);
		}

		std::mem::swap(&mut previous, &mut current);
	}

	previous[b.len()]
}

/// Keeps the highest-similarity match per overlapping character range.
fn dedup_overlapping(mut matches: Vec<FuzzyMatch>) -> Vec<FuzzyMatch> {
	matches.sort_by(|a, b| b.similarity.cmp(&a.similarity).then(a.start.cmp(&b.start)));

	let mut kept: Vec<FuzzyMatch> = Vec::new();

	for candidate in matches {
		let overlaps = kept
			.iter()
			.any(|existing| candidate.start < existing.end && existing.start < candidate.end);

		if !overlaps {
			kept.push(candidate);
		}
	}

	kept.sort_by_key(|entry| entry.start);

	kept
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::corpus::builtin_passages;

	fn prefilter() -> Prefilter {
		let cfg = remez_config::PrefilterConfig {
			fuzzy_threshold: 85,
			min_window_tokens: 5,
			max_window_tokens: 15,
		};

		Prefilter::new(&cfg, builtin_passages())
	}

	#[test]
	fn detects_citation_markers() {
		let detection = prefilter().detect("וזה לשונו שנאמר אין אדם עומד על דברי תורה");

		assert!(!detection.markers.is_empty());
		assert!(detection.has_likely_citations);
	}

	#[test]
	fn detects_tractate_names() {
		let detection = prefilter().detect("ועיין במסכת סנהדרין שם האריך");

		assert!(detection.tractate_names.iter().any(|name| name == "סנהדרין"));
	}

	#[test]
	fn fuzzy_matches_a_near_verbatim_quotation() {
		let detection = prefilter()
			.detect("וכבר אמרו כל המקיים נפש אחת מישראל מעלה עליו הכתוב כאילו קיים עולם מלא ודוק");

		assert!(
			detection
				.fuzzy_matches
				.iter()
				.any(|fuzzy| fuzzy.source == "Sanhedrin 37a" && fuzzy.similarity >= 85)
		);
	}

	#[test]
	fn plain_prose_has_no_signal() {
		let detection =
			prefilter().detect("The weather in the harbor town was mild throughout the autumn.");

		assert!(!detection.has_likely_citations);
	}

	#[test]
	fn overlapping_fuzzy_matches_keep_the_best() {
		let matches = vec![
			FuzzyMatch {
				source: "A".to_string(),
				matched_text: "x".to_string(),
				start: 0,
				end: 10,
				similarity: 90,
			},
			FuzzyMatch {
				source: "B".to_string(),
				matched_text: "y".to_string(),
				start: 5,
				end: 15,
				similarity: 95,
			},
			FuzzyMatch {
				source: "C".to_string(),
				matched_text: "z".to_string(),
				start: 20,
				end: 30,
				similarity: 86,
			},
		];
		let kept = dedup_overlapping(matches);

		assert_eq!(kept.len(), 2);
		assert_eq!(kept[0].source, "B");
		assert_eq!(kept[1].source, "C");
	}
}
