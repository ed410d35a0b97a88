use remez_domain::{
	chunk::{Chunk, split_document, split_for_retry},
	finding::{DetectionMethod, Finding, dedup_findings},
	grounding::ground,
	prefilter::Detection,
};
use remez_store::models::GroundTruthRecord;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::{
	BoxFuture, Service, ServiceError, ServiceResult,
	events::{AnalysisPhase, AnalysisProgress},
	retrieval::RetrievalCandidate,
	scan::ModelParse,
	verify::findings_from_value,
};

/// Overlap carried across a truncation-recovery split so a citation straddling
/// the cut still lands wholly inside one half.
const RETRY_OVERLAP_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct AnalyzeRequest {
	pub document_id: String,
	pub text: String,
}

#[derive(Clone, Debug, Default)]
pub struct AnalyzeOptions {
	/// Overrides the configured two-pass setting for this run.
	pub two_pass: Option<bool>,
	/// Reviewer identity whose precedents may pre-approve or suppress chunks.
	pub identity: Option<String>,
	/// Estimate only; no provider call is made. The run logs the projected
	/// cost and returns no findings; [`Service::estimate_cost`] is the
	/// programmatic surface for the numbers.
	pub dry_run: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct CostEstimate {
	pub chunks: usize,
	pub generative_calls: usize,
	pub estimated_tokens: u64,
	pub estimated_seconds: u64,
}

impl Service {
	/// Analyzes a document end to end: chunking, lexical prefilter, reviewer
	/// precedents, cached or generative detection, then dedup and grounding
	/// over the whole document. Findings are returned ordered by document
	/// position, ungrounded ones last.
	pub async fn analyze(
		&self,
		request: &AnalyzeRequest,
		options: &AnalyzeOptions,
	) -> ServiceResult<Vec<Finding>> {
		if request.text.trim().is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "Document text is empty.".to_string(),
			});
		}

		let two_pass = options.two_pass.unwrap_or(self.cfg.analysis.two_pass);
		let chunks = split_document(&request.text, self.cfg.analysis.chunk_chars);
		let chunk_count = chunks.len();

		if options.dry_run {
			let estimate = self.estimate_cost(&request.text, options.two_pass);

			tracing::info!(
				document_id = %request.document_id,
				chunks = estimate.chunks,
				generative_calls = estimate.generative_calls,
				estimated_tokens = estimate.estimated_tokens,
				estimated_seconds = estimate.estimated_seconds,
				"Dry run; no provider calls were made."
			);

			return Ok(Vec::new());
		}

		let delay = std::time::Duration::from_millis(self.cfg.analysis.inter_chunk_delay_ms);
		let mut findings: Vec<Finding> = Vec::new();
		let mut chars_processed = 0_usize;
		let mut generative_used = false;

		for chunk in chunks {
			let chunk_index = chunk.index;
			let chunk_chars = chunk.text.chars().count();
			let detection = self.prefilter.detect(&chunk.text);

			self.emit_progress(chunk_index, chunk_count, chars_processed, AnalysisPhase::Prefilter);
			findings.extend(fuzzy_findings(&detection));

			if !detection.has_likely_citations {
				chars_processed += chunk_chars;

				self.emit_progress(
					chunk_index,
					chunk_count,
					chars_processed,
					AnalysisPhase::Skipped,
				);

				continue;
			}

			let mut examples: Vec<GroundTruthRecord> = Vec::new();

			if let Some(identity) = &options.identity {
				let precedents = self.relevant_ground_truth(&chunk.text, identity).await;
				let short_circuit = self.apply_precedents(&chunk.text, &precedents);

				findings.extend(short_circuit.auto_findings);

				examples = precedents.into_iter().map(|(record, _)| record).collect();

				if short_circuit.skip_generative {
					tracing::info!(
						document_id = %request.document_id,
						chunk = chunk_index,
						reason = short_circuit.reason.as_deref().unwrap_or_default(),
						"Chunk settled by reviewer precedent."
					);

					chars_processed += chunk_chars;

					self.emit_progress(
						chunk_index,
						chunk_count,
						chars_processed,
						AnalysisPhase::GroundTruth,
					);

					continue;
				}
			}

			if let Some(raw) = self.cache.check(&chunk.text) {
				chars_processed += chunk_chars;

				self.emit_progress(
					chunk_index,
					chunk_count,
					chars_processed,
					AnalysisPhase::CacheHit,
				);
				findings.extend(cached_findings(&raw));

				continue;
			}

			if generative_used && !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			self.emit_progress(
				chunk_index,
				chunk_count,
				chars_processed,
				if two_pass { AnalysisPhase::Scanning } else { AnalysisPhase::SinglePass },
			);

			// One bad chunk never takes down the document. Exhausted retry
			// budgets still surface, since every later chunk would hit the
			// same wall.
			match self.generative_findings(chunk, detection, two_pass, &examples).await {
				Ok(generated) => findings.extend(generated),
				Err(err @ ServiceError::ProviderExhausted { .. }) => return Err(err),
				Err(err) => {
					tracing::warn!(
						document_id = %request.document_id,
						chunk = chunk_index,
						error = %err,
						"Chunk analysis failed; continuing with the remaining chunks."
					);
				},
			}

			generative_used = true;
			chars_processed += chunk_chars;
		}

		let mut findings = dedup_findings(findings);

		for finding in &mut findings {
			if let Some(grounding) = ground(&request.text, &finding.snippet) {
				finding.start_offset = Some(grounding.start_offset);
				finding.end_offset = Some(grounding.end_offset);
				finding.grounding_confidence = Some(grounding.confidence);
			}
		}

		findings.sort_by_key(|finding| finding.start_offset.unwrap_or(usize::MAX));
		self.emit_progress(chunk_count, chunk_count, chars_processed, AnalysisPhase::Done);

		Ok(findings)
	}

	/// Projected provider usage for a document, computed without any I/O.
	/// This is the canonical estimate surface; a dry-run `analyze` reports
	/// the same numbers through the log.
	pub fn estimate_cost(&self, text: &str, two_pass: Option<bool>) -> CostEstimate {
		let analysis = &self.cfg.analysis;
		let passes = if two_pass.unwrap_or(analysis.two_pass) { 2_usize } else { 1 };
		let chunks = split_document(text, analysis.chunk_chars).len();
		let generative_calls = chunks * passes;
		let chars = text.chars().count() as u64;
		// Roughly four characters per token for mixed Hebrew prose, plus
		// prompt overhead per call.
		let estimated_tokens = chars / 4 * passes as u64 + 500 * generative_calls as u64;
		let rpm = self.cfg.limits.generative_rpm;
		let per_call_seconds = if rpm > 0 { 60. / f64::from(rpm) } else { 2. };
		let pacing_seconds =
			chunks.saturating_sub(1) as u64 * analysis.inter_chunk_delay_ms / 1_000;
		let estimated_seconds =
			(generative_calls as f64 * per_call_seconds).ceil() as u64 + pacing_seconds;

		CostEstimate { chunks, generative_calls, estimated_tokens, estimated_seconds }
	}

	/// Generative detection for one chunk, recursing into halves when the
	/// model output comes back truncated. `min_chunk_chars` bounds the
	/// recursion.
	fn generative_findings<'a>(
		&'a self,
		chunk: Chunk,
		detection: Detection,
		two_pass: bool,
		examples: &'a [GroundTruthRecord],
	) -> BoxFuture<'a, ServiceResult<Vec<Finding>>> {
		Box::pin(async move {
			if two_pass {
				let suspects = match self.scan_chunk(&chunk.text, &detection).await? {
					ModelParse::Value(suspects) => suspects,
					ModelParse::Truncated =>
						return self.retry_split(chunk, two_pass, examples).await,
				};

				if suspects.is_empty() {
					// Remembered so a repeated chunk skips the scan as well.
					self.cache.store(&chunk.text, r#"{"findings": []}"#);

					return Ok(Vec::new());
				}

				let paired = self.retrieve_for_suspects(suspects).await;

				match self.verify_suspects(&chunk.text, &paired, examples).await? {
					ModelParse::Value((findings, raw)) => {
						self.cache.store(&chunk.text, &raw);

						Ok(findings)
					},
					ModelParse::Truncated => self.retry_split(chunk, two_pass, examples).await,
				}
			} else {
				match self.single_pass(&chunk.text, &detection, examples).await? {
					ModelParse::Value((findings, raw)) => {
						self.cache.store(&chunk.text, &raw);

						Ok(findings)
					},
					ModelParse::Truncated => self.retry_split(chunk, two_pass, examples).await,
				}
			}
		})
	}

	/// Candidate retrieval for every suspect concurrently; retrieval failures
	/// degrade to empty candidate lists per suspect.
	async fn retrieve_for_suspects(
		&self,
		suspects: Vec<crate::Suspect>,
	) -> Vec<(crate::Suspect, Vec<RetrievalCandidate>)> {
		let limit = self.cfg.retrieval.candidates_per_suspect;
		let mut set = JoinSet::new();

		for (slot, suspect) in suspects.into_iter().enumerate() {
			let layer = self.retrieval.clone();

			set.spawn(async move {
				let mut candidates = layer.search(&suspect.snippet, &suspect.keywords).await;

				candidates.truncate(limit);

				(slot, suspect, candidates)
			});
		}

		let mut paired: Vec<(usize, crate::Suspect, Vec<RetrievalCandidate>)> = Vec::new();

		while let Some(joined) = set.join_next().await {
			match joined {
				Ok(entry) => paired.push(entry),
				Err(err) => {
					tracing::warn!(error = %err, "Suspect retrieval task failed; skipping it.");
				},
			}
		}

		paired.sort_by_key(|(slot, ..)| *slot);

		paired.into_iter().map(|(_, suspect, candidates)| (suspect, candidates)).collect()
	}

	async fn retry_split(
		&self,
		chunk: Chunk,
		two_pass: bool,
		examples: &[GroundTruthRecord],
	) -> ServiceResult<Vec<Finding>> {
		let Some((first, second)) =
			split_for_retry(&chunk, RETRY_OVERLAP_CHARS, self.cfg.analysis.min_chunk_chars)
		else {
			tracing::warn!(
				chunk = chunk.index,
				"Model output stayed truncated at minimum chunk size; giving up on the chunk."
			);

			return Ok(Vec::new());
		};

		tracing::debug!(chunk = chunk.index, "Splitting chunk after truncated model output.");

		let first_detection = self.prefilter.detect(&first.text);
		let second_detection = self.prefilter.detect(&second.text);
		let mut findings =
			self.generative_findings(first, first_detection, two_pass, examples).await?;

		findings
			.extend(self.generative_findings(second, second_detection, two_pass, examples).await?);

		Ok(findings)
	}

	fn emit_progress(
		&self,
		chunk_index: usize,
		chunk_count: usize,
		chars_processed: usize,
		phase: AnalysisPhase,
	) {
		self.events.emit(&AnalysisProgress { chunk_index, chunk_count, chars_processed, phase });
	}
}

fn fuzzy_findings(detection: &Detection) -> Vec<Finding> {
	detection
		.fuzzy_matches
		.iter()
		.map(|fuzzy| Finding {
			id: Uuid::new_v4(),
			source: fuzzy.source.clone(),
			snippet: fuzzy.matched_text.clone(),
			context: None,
			justification: format!(
				"Near-verbatim overlap with {} at similarity {}.",
				fuzzy.source, fuzzy.similarity
			),
			confidence: fuzzy.similarity as f32 / 100.,
			implicit: false,
			start_offset: None,
			end_offset: None,
			grounding_confidence: None,
			method: DetectionMethod::FuzzyIndex,
		})
		.collect()
}

fn cached_findings(raw: &str) -> Vec<Finding> {
	match crate::scan::parse_model_response(raw) {
		Ok(ModelParse::Value(value)) => findings_from_value(&value),
		Ok(ModelParse::Truncated) | Err(_) => {
			tracing::warn!("Cached response no longer parses; ignoring it.");

			Vec::new()
		},
	}
}
