use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairStrategy {
	StrippedCodeFence,
	ClosedString,
	ClosedBrackets,
	TrimmedToLastElement,
}

#[derive(Clone, Debug)]
pub enum RepairOutcome {
	/// Strict parse succeeded, no repair needed.
	Parsed(Value),
	Repaired { value: Value, strategy: RepairStrategy },
	/// The payload looks like truncated JSON that no strategy could close;
	/// callers fall back to splitting the chunk.
	Truncated,
	/// Not JSON at all.
	Invalid,
}

/// Attempts a strict parse first, then a small enumerated set of repair
/// strategies. Each strategy either yields a value or passes to the next;
/// nothing in here panics or guesses beyond the listed transformations.
pub fn parse_or_repair(raw: &str) -> RepairOutcome {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return RepairOutcome::Invalid;
	}

	if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
		return RepairOutcome::Parsed(value);
	}

	let unfenced = strip_code_fence(trimmed);

	if unfenced != trimmed
		&& let Ok(value) = serde_json::from_str::<Value>(unfenced)
	{
		return RepairOutcome::Repaired { value, strategy: RepairStrategy::StrippedCodeFence };
	}

	let state = scan(unfenced);

	if state.in_string {
		let mut candidate = unfenced.to_string();

		candidate.push('"');
		push_closers(&mut candidate, &state.open);

		if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
			return RepairOutcome::Repaired { value, strategy: RepairStrategy::ClosedString };
		}
	} else if !state.open.is_empty() {
		let mut candidate = unfenced.to_string();

		push_closers(&mut candidate, &state.open);

		if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
			return RepairOutcome::Repaired { value, strategy: RepairStrategy::ClosedBrackets };
		}
	}

	// Cut back to the last complete object and close whatever remains open.
	if let Some(position) = unfenced.rfind('}') {
		let cut = &unfenced[..=position];
		let cut_state = scan(cut);

		if !cut_state.in_string {
			let mut candidate = cut.to_string();

			push_closers(&mut candidate, &cut_state.open);

			if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
				return RepairOutcome::Repaired {
					value,
					strategy: RepairStrategy::TrimmedToLastElement,
				};
			}
		}
	}

	if unfenced.starts_with('{') || unfenced.starts_with('[') {
		return RepairOutcome::Truncated;
	}

	RepairOutcome::Invalid
}

struct ScanState {
	open: Vec<char>,
	in_string: bool,
}

fn scan(text: &str) -> ScanState {
	let mut open = Vec::new();
	let mut in_string = false;
	let mut escaped = false;

	for ch in text.chars() {
		if in_string {
			if escaped {
				escaped = false;
			} else if ch == '\\' {
				escaped = true;
			} else if ch == '"' {
				in_string = false;
			}

			continue;
		}

		match ch {
			'"' => in_string = true,
			'{' => open.push('}'),
			'[' => open.push(']'),
			'}' | ']' => {
				if open.last() == Some(&ch) {
					open.pop();
				}
			},
			_ => {},
		}
	}

	ScanState { open, in_string }
}

fn push_closers(candidate: &mut String, open: &[char]) {
	for closer in open.iter().rev() {
		candidate.push(*closer);
	}
}

fn strip_code_fence(text: &str) -> &str {
	let Some(rest) = text.strip_prefix("```") else {
		return text;
	};
	let rest = rest.strip_prefix("json").unwrap_or(rest);
	let rest = rest.trim_start_matches(['\r', '\n']);

	rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}
