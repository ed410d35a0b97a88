use std::{sync::Arc, time::Duration};

use remez_config::{Config, EmbeddingProviderConfig, Limits, Retrieval};
use remez_domain::hebrew;
use tokio::task::JoinSet;

use crate::{EmbeddingProvider, RateLimiter, ServiceError, ServiceResult, VectorIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
	Semantic,
	Keyword,
	Hybrid,
}

#[derive(Clone, Debug)]
pub struct RetrievalCandidate {
	/// Canonical reference id, normalized to the passage level.
	pub reference: String,
	pub text: String,
	pub score: f32,
	pub provenance: Provenance,
}

/// Hybrid candidate retrieval over the corpus index. Cloneable so per-suspect
/// searches can run as spawned tasks.
#[derive(Clone)]
pub struct RetrievalLayer {
	index: Arc<dyn VectorIndex>,
	embedding: Arc<dyn EmbeddingProvider>,
	embedding_cfg: EmbeddingProviderConfig,
	cfg: Retrieval,
	limits: Limits,
	limiter: Arc<RateLimiter>,
}

impl RetrievalLayer {
	pub fn new(cfg: &Config, index: Arc<dyn VectorIndex>, embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self {
			index,
			embedding,
			embedding_cfg: cfg.providers.embedding.clone(),
			cfg: cfg.retrieval.clone(),
			limits: cfg.limits.clone(),
			limiter: Arc::new(RateLimiter::from_rpm(cfg.limits.embedding_rpm)),
		}
	}

	pub(crate) fn index(&self) -> &Arc<dyn VectorIndex> {
		&self.index
	}

	/// Semantic plus keyword retrieval with a hard deadline per leg. Retrieval
	/// is advisory: any failure degrades to fewer candidates, never an error.
	pub async fn search(&self, text: &str, keywords: &[String]) -> Vec<RetrievalCandidate> {
		let deadline = Duration::from_millis(self.cfg.timeout_ms);
		let semantic = match tokio::time::timeout(deadline, self.semantic(text)).await {
			Ok(Ok(candidates)) => candidates,
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Semantic retrieval failed; continuing without it.");

				Vec::new()
			},
			Err(_) => {
				tracing::warn!("Semantic retrieval timed out; continuing without it.");

				Vec::new()
			},
		};
		let hebrew_keywords: Vec<String> =
			keywords.iter().filter(|keyword| hebrew::contains_hebrew(keyword)).cloned().collect();
		let keyword = if hebrew_keywords.is_empty() {
			Vec::new()
		} else {
			match tokio::time::timeout(deadline, self.keyword(&hebrew_keywords)).await {
				Ok(Ok(candidates)) => candidates,
				Ok(Err(err)) => {
					tracing::warn!(error = %err, "Keyword retrieval failed; continuing without it.");

					Vec::new()
				},
				Err(_) => {
					tracing::warn!("Keyword retrieval timed out; continuing without it.");

					Vec::new()
				},
			}
		};

		merge_candidates(semantic, keyword, self.cfg.top_k)
	}

	/// Dense-vector retrieval across all configured namespaces in parallel.
	pub async fn semantic(&self, text: &str) -> ServiceResult<Vec<RetrievalCandidate>> {
		let vector = self.embed_query(text).await?;
		let mut set = JoinSet::new();

		for namespace in self.cfg.namespaces.clone() {
			let index = self.index.clone();
			let vector = vector.clone();
			let top_k = self.cfg.top_k;

			set.spawn(async move { index.query(&namespace, vector, top_k, &[]).await });
		}

		let mut candidates: Vec<RetrievalCandidate> = Vec::new();

		while let Some(joined) = set.join_next().await {
			match joined {
				Ok(Ok(matches)) =>
					for entry in matches {
						if entry.score < self.cfg.semantic_floor {
							continue;
						}

						push_best(&mut candidates, RetrievalCandidate {
							reference: normalize_reference(&entry.id),
							text: entry.text,
							score: entry.score,
							provenance: Provenance::Semantic,
						});
					},
				Ok(Err(err)) => {
					tracing::warn!(error = %err, "One namespace query failed; skipping it.");
				},
				Err(err) => {
					tracing::warn!(error = %err, "Namespace query task failed; skipping it.");
				},
			}
		}

		candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
		candidates.truncate(self.cfg.top_k);

		Ok(candidates)
	}

	/// BM25 phrase retrieval for Hebrew keywords. The word-gap bound is
	/// enforced here against the returned passage text.
	pub async fn keyword(&self, keywords: &[String]) -> ServiceResult<Vec<RetrievalCandidate>> {
		let filters = parse_path_filter(&self.cfg.keyword_path_filter);
		let mut set = JoinSet::new();

		for namespace in self.cfg.namespaces.clone() {
			for keyword in keywords {
				let index = self.index.clone();
				let namespace = namespace.clone();
				let phrase = keyword.clone();
				let filters = filters.clone();
				let top_k = self.cfg.top_k;

				set.spawn(async move {
					let field_filters: Vec<(&str, String)> =
						filters.iter().map(|(field, value)| (field.as_str(), value.clone())).collect();
					let matches =
						index.search_text(&namespace, &phrase, top_k, &field_filters).await;

					(phrase, matches)
				});
			}
		}

		let mut candidates: Vec<RetrievalCandidate> = Vec::new();

		while let Some(joined) = set.join_next().await {
			match joined {
				Ok((phrase, Ok(matches))) => {
					let phrase_normalized = hebrew::normalize(&phrase);

					for entry in matches {
						if !within_slop(
							&hebrew::normalize(&entry.text),
							&phrase_normalized,
							self.cfg.keyword_slop,
						) {
							continue;
						}

						// BM25 scores are not comparable to cosine scores. A
						// confirmed phrase match scores above the cosine
						// ceiling, so every keyword hit outranks every
						// semantic-only hit.
						push_best(&mut candidates, RetrievalCandidate {
							reference: normalize_reference(&entry.id),
							text: entry.text,
							score: 1. + self.cfg.keyword_boost,
							provenance: Provenance::Keyword,
						});
					}
				},
				Ok((phrase, Err(err))) => {
					tracing::warn!(error = %err, %phrase, "Keyword query failed; skipping it.");
				},
				Err(err) => {
					tracing::warn!(error = %err, "Keyword query task failed; skipping it.");
				},
			}
		}

		Ok(candidates)
	}

	/// One embedding call with rate limiting and bounded retry.
	pub(crate) async fn embed_query(&self, text: &str) -> ServiceResult<Vec<f32>> {
		let texts = [text.to_string()];
		let mut attempt = 0;

		loop {
			self.limiter.wait_for_slot().await;

			match self.embedding.embed(&self.embedding_cfg, &texts).await {
				Ok(vectors) => {
					return vectors.into_iter().next().ok_or_else(|| ServiceError::Provider {
						message: "Embedding provider returned no vectors.".to_string(),
					});
				},
				Err(err) if err.is_retryable() && attempt < self.limits.max_retries => {
					let delay = crate::backoff_for_attempt(
						self.limits.backoff_base_ms,
						self.limits.backoff_factor,
						attempt,
					);

					tracing::warn!(
						error = %err,
						attempt,
						"Embedding call failed; backing off before retry."
					);
					tokio::time::sleep(delay).await;

					attempt += 1;
				},
				Err(err) if err.is_retryable() => {
					return Err(ServiceError::ProviderExhausted { message: err.to_string() });
				},
				Err(err) => return Err(err.into()),
			}
		}
	}
}

/// Strips the sub-segment suffix so all hits on one passage merge under one
/// reference, e.g. "Sanhedrin 37a:13" becomes "Sanhedrin 37a".
pub(crate) fn normalize_reference(id: &str) -> String {
	match id.rsplit_once(':') {
		Some((passage, segment)) if !segment.is_empty() && segment.chars().all(|ch| ch.is_ascii_digit()) =>
			passage.to_string(),
		_ => id.to_string(),
	}
}

/// Keeps the best-scoring candidate per reference.
fn push_best(candidates: &mut Vec<RetrievalCandidate>, candidate: RetrievalCandidate) {
	if let Some(existing) =
		candidates.iter_mut().find(|existing| existing.reference == candidate.reference)
	{
		if candidate.score > existing.score {
			*existing = candidate;
		}
	} else {
		candidates.push(candidate);
	}
}

/// Optional payload restriction for keyword retrieval, written as
/// "field=value" in configuration. An empty or malformed filter restricts
/// nothing.
fn parse_path_filter(raw: &str) -> Vec<(String, String)> {
	match raw.split_once('=') {
		Some((field, value)) if !field.trim().is_empty() && !value.trim().is_empty() =>
			vec![(field.trim().to_string(), value.trim().to_string())],
		_ => Vec::new(),
	}
}

/// Whether the phrase tokens appear in order with at most `slop` extraneous
/// words between consecutive tokens.
pub(crate) fn within_slop(text: &str, phrase: &str, slop: usize) -> bool {
	let phrase_tokens: Vec<&str> = phrase.split_whitespace().collect();

	if phrase_tokens.is_empty() {
		return false;
	}

	let text_tokens: Vec<&str> = text.split_whitespace().collect();

	'starts: for start in 0..text_tokens.len() {
		if text_tokens[start] != phrase_tokens[0] {
			continue;
		}

		let mut position = start;

		for token in &phrase_tokens[1..] {
			let window_end = (position + 1 + slop + 1).min(text_tokens.len());
			let Some(found) = (position + 1..window_end).find(|&i| text_tokens[i] == *token) else {
				continue 'starts;
			};

			position = found;
		}

		return true;
	}

	false
}

/// Keyword candidates arrive pre-lifted above the cosine ceiling; a semantic
/// duplicate adds its score on top, so hybrid hits rank first, then
/// keyword-only, then semantic-only.
fn merge_candidates(
	semantic: Vec<RetrievalCandidate>,
	keyword: Vec<RetrievalCandidate>,
	top_k: usize,
) -> Vec<RetrievalCandidate> {
	let mut merged = semantic;

	for candidate in keyword {
		if let Some(existing) =
			merged.iter_mut().find(|existing| existing.reference == candidate.reference)
		{
			existing.score += candidate.score;
			existing.provenance = Provenance::Hybrid;
		} else {
			merged.push(candidate);
		}
	}

	merged.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.reference.cmp(&b.reference)));
	merged.truncate(top_k);

	merged
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reference_normalization_strips_segment_suffixes() {
		assert_eq!(normalize_reference("Sanhedrin 37a:13"), "Sanhedrin 37a");
		assert_eq!(normalize_reference("Pirkei Avot 1:14"), "Pirkei Avot 1");
		assert_eq!(normalize_reference("Sanhedrin 37a"), "Sanhedrin 37a");
		assert_eq!(normalize_reference("Genesis 1:abc"), "Genesis 1:abc");
	}

	#[test]
	fn slop_allows_bounded_gaps_only() {
		assert!(within_slop("א ב ג", "א ב ג", 0));
		assert!(within_slop("א x ב y ג", "א ב ג", 1));
		assert!(!within_slop("א x x ב ג", "א ב ג", 1));
		assert!(!within_slop("ב א ג", "א ב ג", 2));
		assert!(!within_slop("א ב", "א ב ג", 2));
	}

	#[test]
	fn keyword_hits_rank_above_every_semantic_hit() {
		let semantic = vec![
			RetrievalCandidate {
				reference: "Sanhedrin 37a".to_string(),
				text: String::new(),
				score: 0.95,
				provenance: Provenance::Semantic,
			},
			RetrievalCandidate {
				reference: "Berakhot 2a".to_string(),
				text: String::new(),
				score: 0.7,
				provenance: Provenance::Semantic,
			},
		];
		let keyword = vec![
			RetrievalCandidate {
				reference: "Berakhot 2a".to_string(),
				text: String::new(),
				score: 1.25,
				provenance: Provenance::Keyword,
			},
			RetrievalCandidate {
				reference: "Avot 1".to_string(),
				text: String::new(),
				score: 1.25,
				provenance: Provenance::Keyword,
			},
		];
		let merged = merge_candidates(semantic, keyword, 10);

		assert_eq!(merged[0].reference, "Berakhot 2a");
		assert!((merged[0].score - 1.95).abs() < 1e-6);
		assert_eq!(merged[0].provenance, Provenance::Hybrid);
		assert_eq!(merged[1].reference, "Avot 1");
		assert_eq!(merged[1].provenance, Provenance::Keyword);
		// The strongest semantic-only hit still ranks below every keyword hit.
		assert_eq!(merged[2].reference, "Sanhedrin 37a");
	}

	#[test]
	fn path_filter_parsing() {
		assert_eq!(
			parse_path_filter("category=talmud"),
			vec![("category".to_string(), "talmud".to_string())]
		);
		assert!(parse_path_filter("").is_empty());
		assert!(parse_path_filter("category=").is_empty());
	}
}
