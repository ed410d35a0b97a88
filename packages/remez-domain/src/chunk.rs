use unicode_segmentation::UnicodeSegmentation;

#[derive(Clone, Debug)]
pub struct Chunk {
	pub index: usize,
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

/// Splits a document into consecutive chunks of at most `chunk_chars`
/// characters, cutting only on grapheme boundaries. Chunks never overlap and
/// concatenating them in order reconstructs the document exactly.
pub fn split_document(text: &str, chunk_chars: usize) -> Vec<Chunk> {
	let mut chunks = Vec::new();

	if text.is_empty() || chunk_chars == 0 {
		return chunks;
	}

	let mut start = 0_usize;
	let mut end = 0_usize;
	let mut chars_in_chunk = 0_usize;

	for (offset, grapheme) in text.grapheme_indices(true) {
		let grapheme_chars = grapheme.chars().count();

		if chars_in_chunk + grapheme_chars > chunk_chars && chars_in_chunk > 0 {
			chunks.push(Chunk {
				index: chunks.len(),
				start_offset: start,
				end_offset: offset,
				text: text[start..offset].to_string(),
			});

			start = offset;
			chars_in_chunk = 0;
		}

		chars_in_chunk += grapheme_chars;

		end = offset + grapheme.len();
	}

	if start < end {
		chunks.push(Chunk {
			index: chunks.len(),
			start_offset: start,
			end_offset: end,
			text: text[start..end].to_string(),
		});
	}

	chunks
}

/// Splits a chunk in half for truncation recovery, giving each half a small
/// overlap across the cut so a citation straddling it is not lost. Returns
/// `None` when the chunk is already at or below `min_chunk_chars`, which is
/// the hard guard against unbounded recursion.
pub fn split_for_retry(
	chunk: &Chunk,
	overlap_chars: usize,
	min_chunk_chars: usize,
) -> Option<(Chunk, Chunk)> {
	let char_len = chunk.text.chars().count();

	if char_len <= min_chunk_chars {
		return None;
	}

	let mid_chars = char_len / 2;
	let mut mid_byte = chunk.text.len();
	let mut second_start_byte = 0_usize;
	let mut counted = 0_usize;

	for (offset, grapheme) in chunk.text.grapheme_indices(true) {
		if counted >= mid_chars.saturating_sub(overlap_chars) && second_start_byte == 0 {
			second_start_byte = offset;
		}
		if counted >= mid_chars {
			mid_byte = offset;

			break;
		}

		counted += grapheme.chars().count();
	}

	if second_start_byte == 0 || mid_byte >= chunk.text.len() {
		return None;
	}

	let first = Chunk {
		index: chunk.index,
		start_offset: chunk.start_offset,
		end_offset: chunk.start_offset + mid_byte,
		text: chunk.text[..mid_byte].to_string(),
	};
	let second = Chunk {
		index: chunk.index,
		start_offset: chunk.start_offset + second_start_byte,
		end_offset: chunk.end_offset,
		text: chunk.text[second_start_byte..].to_string(),
	};

	Some((first, second))
}
