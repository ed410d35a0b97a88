use unicode_normalization::UnicodeNormalization;
use unicode_script::{Script, UnicodeScript};

/// Single-letter clitic prefixes (conjunctions, prepositions, articles, and
/// the Aramaic relative dalet) that attach to the following word.
const CLITIC_PREFIXES: [char; 8] = ['ו', 'ה', 'ב', 'ל', 'מ', 'ש', 'כ', 'ד'];

pub fn contains_hebrew(input: &str) -> bool {
	input.chars().any(|ch| ch.script() == Script::Hebrew)
}

/// Reduces text to the canonical comparison form used by the lexical index:
/// NFKC, cantillation and vowel points stripped, final letters folded, clitic
/// prefixes removed per token, whitespace collapsed.
pub fn normalize(input: &str) -> String {
	let stripped: String =
		input.nfkc().filter(|ch| !is_pointing(*ch)).map(fold_final_letter).collect();
	let mut out = String::with_capacity(stripped.len());

	for token in stripped.split_whitespace() {
		let token = trim_punctuation(token);

		if token.is_empty() {
			continue;
		}
		if !out.is_empty() {
			out.push(' ');
		}

		out.push_str(strip_clitic_prefix(token));
	}

	out
}

pub fn tokenize(input: &str) -> Vec<String> {
	normalize(input).split_whitespace().map(str::to_string).collect()
}

fn is_pointing(ch: char) -> bool {
	// Hebrew accents (te'amim), points (niqqud), and the upper/lower dots.
	matches!(ch, '\u{0591}'..='\u{05BD}' | '\u{05BF}' | '\u{05C1}' | '\u{05C2}' | '\u{05C4}' | '\u{05C5}' | '\u{05C7}')
}

fn fold_final_letter(ch: char) -> char {
	match ch {
		'ך' => 'כ',
		'ם' => 'מ',
		'ן' => 'נ',
		'ף' => 'פ',
		'ץ' => 'צ',
		other => other,
	}
}

fn trim_punctuation(token: &str) -> &str {
	token.trim_matches(|ch: char| !ch.is_alphanumeric())
}

fn strip_clitic_prefix(token: &str) -> &str {
	let mut chars = token.chars();
	let Some(first) = chars.next() else {
		return token;
	};
	let rest = chars.as_str();

	// Only strip when enough of the word remains to stay recognizable.
	if CLITIC_PREFIXES.contains(&first) && rest.chars().count() >= 3 {
		return rest;
	}

	token
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn detects_hebrew_script() {
		assert!(contains_hebrew("כדתנן התם"));
		assert!(!contains_hebrew("plain latin text"));
	}

	#[test]
	fn strips_vowel_points_and_accents() {
		assert_eq!(normalize("בְּרֵאשִׁית"), normalize("בראשית"));
	}

	#[test]
	fn folds_final_letters() {
		// The leading shin is treated as a clitic and stripped.
		assert_eq!(normalize("שלום"), "לומ");
		assert_eq!(normalize("אדם"), "אדמ");
	}

	#[test]
	fn strips_one_clitic_layer_on_long_tokens() {
		assert_eq!(normalize("והתורה"), "התורה");
		// Short remainders are kept whole so tractate names survive.
		assert_eq!(normalize("שבת"), "שבת");
		assert_eq!(normalize("וה"), "וה");
	}

	#[test]
	fn collapses_whitespace_and_punctuation() {
		assert_eq!(normalize("  תורה,   תורה.  "), "תורה תורה");
	}
}
