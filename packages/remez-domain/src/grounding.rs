/// Anchor length used for the prefix/suffix fallback strategies.
const ANCHOR_CHARS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grounding {
	pub start_offset: usize,
	pub end_offset: usize,
	pub confidence: f32,
}

/// Locates a snippet inside the source document, tolerating whitespace
/// differences. Strategies are tried in order of decreasing confidence:
/// whole-snippet match (1.0), prefix anchor (0.7), suffix anchor (0.5).
/// Returns `None` when nothing anchors; callers keep the finding ungrounded.
pub fn ground(document: &str, snippet: &str) -> Option<Grounding> {
	let snippet = snippet.trim();

	if snippet.is_empty() {
		return None;
	}

	if let Some((start, end)) = find_ws_tolerant(document, snippet) {
		return Some(Grounding { start_offset: start, end_offset: end, confidence: 1.0 });
	}

	let prefix = char_prefix(snippet, ANCHOR_CHARS);

	if let Some((start, _)) = find_ws_tolerant(document, prefix) {
		let end = floor_char_boundary(document, (start + snippet.len()).min(document.len()));

		return Some(Grounding { start_offset: start, end_offset: end, confidence: 0.7 });
	}

	let suffix = char_suffix(snippet, ANCHOR_CHARS);

	if let Some((_, end)) = find_ws_tolerant(document, suffix) {
		let start = floor_char_boundary(document, end.saturating_sub(snippet.len()));

		return Some(Grounding { start_offset: start, end_offset: end, confidence: 0.5 });
	}

	None
}

/// Finds `needle` in `haystack` treating any run of whitespace in either as
/// equivalent. Returns the byte range of the match.
fn find_ws_tolerant(haystack: &str, needle: &str) -> Option<(usize, usize)> {
	let tokens: Vec<&str> = needle.split_whitespace().collect();
	let first = tokens.first()?;

	for (candidate, _) in haystack.match_indices(first) {
		if let Some(end) = match_tokens_at(haystack, candidate, &tokens) {
			return Some((candidate, end));
		}
	}

	None
}

fn match_tokens_at(haystack: &str, start: usize, tokens: &[&str]) -> Option<usize> {
	let mut cursor = start;

	for (position, token) in tokens.iter().enumerate() {
		if position > 0 {
			let rest = &haystack[cursor..];
			let skipped: usize =
				rest.chars().take_while(|ch| ch.is_whitespace()).map(char::len_utf8).sum();

			if skipped == 0 {
				return None;
			}

			cursor += skipped;
		}

		if !haystack[cursor..].starts_with(token) {
			return None;
		}

		cursor += token.len();
	}

	Some(cursor)
}

fn char_prefix(text: &str, chars: usize) -> &str {
	match text.char_indices().nth(chars) {
		Some((offset, _)) => &text[..offset],
		None => text,
	}
}

fn char_suffix(text: &str, chars: usize) -> &str {
	let total = text.chars().count();

	if total <= chars {
		return text;
	}

	match text.char_indices().nth(total - chars) {
		Some((offset, _)) => &text[offset..],
		None => text,
	}
}

fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
	offset = offset.min(text.len());

	while offset > 0 && !text.is_char_boundary(offset) {
		offset -= 1;
	}

	offset
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_match_grounds_with_full_confidence() {
		let doc = "prelude כדתנן התם coda";
		let grounding = ground(doc, "כדתנן התם").expect("grounding failed");

		assert_eq!(grounding.confidence, 1.0);
		assert_eq!(&doc[grounding.start_offset..grounding.end_offset], "כדתנן התם");
	}

	#[test]
	fn whitespace_differences_are_tolerated() {
		let doc = "prelude כדתנן\n  התם coda";
		let grounding = ground(doc, "כדתנן התם").expect("grounding failed");

		assert_eq!(grounding.confidence, 1.0);
		assert!(doc[grounding.start_offset..grounding.end_offset].contains("התם"));
	}

	#[test]
	fn prefix_anchor_falls_back_to_lower_confidence() {
		let doc = "the quoted passage begins here and then the copy diverges entirely";
		let snippet = "the quoted passage begins here and then something completely different";
		let grounding = ground(doc, snippet).expect("grounding failed");

		assert_eq!(grounding.confidence, 0.7);
		assert_eq!(grounding.start_offset, 0);
	}

	#[test]
	fn unmatched_snippet_stays_ungrounded() {
		assert!(ground("entirely unrelated text", "כדתנן התם").is_none());
	}
}
