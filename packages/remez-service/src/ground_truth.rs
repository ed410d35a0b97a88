use remez_domain::{
	finding::{DetectionMethod, Finding},
	hebrew,
};
use remez_store::models::{ConfidenceTier, CorrectionAction, GroundTruthRecord};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Service, ServiceError, ServiceResult};

/// Payload key carrying the serialized record; the reviewer is duplicated at
/// the top level so the index can filter on it.
const RECORD_KEY: &str = "record";
const REVIEWER_KEY: &str = "reviewer";

/// A human decision about one finding, submitted for future reuse.
#[derive(Clone, Debug)]
pub struct Correction {
	pub finding: Finding,
	pub action: CorrectionAction,
	pub corrected_source: Option<String>,
	pub reason: Option<String>,
	pub reviewer: String,
}

/// Result of consulting reviewer precedent before generative processing.
#[derive(Clone, Debug, Default)]
pub struct ShortCircuit {
	pub auto_findings: Vec<Finding>,
	pub skip_generative: bool,
	pub reason: Option<String>,
}

impl Service {
	/// Persists a reviewer decision into the identity-scoped precedent
	/// namespace of the vector index.
	pub async fn record_correction(&self, correction: Correction) -> ServiceResult<GroundTruthRecord> {
		if correction.reviewer.trim().is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "A correction requires a reviewer identity.".to_string(),
			});
		}
		if correction.action == CorrectionAction::Correct && correction.corrected_source.is_none() {
			return Err(ServiceError::InvalidRequest {
				message: "A corrective action requires the corrected source.".to_string(),
			});
		}

		let record = GroundTruthRecord {
			id: Uuid::new_v4(),
			reviewer: correction.reviewer.clone(),
			action: correction.action,
			phrase: correction.finding.snippet.clone(),
			snippet: correction.finding.snippet.clone(),
			source: correction.finding.source.clone(),
			corrected_source: correction.corrected_source,
			reason: correction.reason,
			confidence_tier: tier_for(&correction.finding),
			created_at: OffsetDateTime::now_utc(),
		};
		let vector = self.retrieval.embed_query(&record.phrase).await?;
		let mut metadata = Map::new();

		metadata.insert(REVIEWER_KEY.to_string(), Value::String(record.reviewer.clone()));
		metadata.insert(
			RECORD_KEY.to_string(),
			serde_json::to_value(&record).map_err(|err| ServiceError::InvalidRequest {
				message: format!("Ground-truth record is not serializable: {err}"),
			})?,
		);
		self.retrieval
			.index()
			.upsert(
				&self.cfg.ground_truth.namespace,
				&record.id.to_string(),
				vector,
				&record.phrase,
				metadata,
			)
			.await?;

		Ok(record)
	}

	/// Precedents semantically close to the chunk, restricted to the given
	/// reviewer identity. Other identities' decisions are never visible here.
	pub(crate) async fn relevant_ground_truth(
		&self,
		chunk_text: &str,
		identity: &str,
	) -> Vec<(GroundTruthRecord, f32)> {
		let vector = match self.retrieval.embed_query(chunk_text).await {
			Ok(vector) => vector,
			Err(err) => {
				tracing::warn!(error = %err, "Precedent retrieval failed; continuing without it.");

				return Vec::new();
			},
		};
		let filters = [(REVIEWER_KEY, identity.to_string())];
		let matches = match self
			.retrieval
			.index()
			.query(
				&self.cfg.ground_truth.namespace,
				vector,
				self.cfg.ground_truth.relevant_k,
				&filters,
			)
			.await
		{
			Ok(matches) => matches,
			Err(err) => {
				tracing::warn!(error = %err, "Precedent query failed; continuing without it.");

				return Vec::new();
			},
		};

		matches
			.into_iter()
			.filter_map(|entry| {
				let record = entry.payload.get(RECORD_KEY)?;
				let record: GroundTruthRecord = serde_json::from_value(record.clone()).ok()?;

				Some((record, entry.score))
			})
			.collect()
	}

	/// Applies strong precedents before any generative call. An approved
	/// phrase that is verifiably present in the chunk becomes a finding
	/// outright and settles the chunk; a rejected one suppresses generative
	/// processing without emitting anything.
	pub(crate) fn apply_precedents(
		&self,
		chunk_text: &str,
		precedents: &[(GroundTruthRecord, f32)],
	) -> ShortCircuit {
		let gt = &self.cfg.ground_truth;
		let normalized_chunk = hebrew::normalize(chunk_text);
		let mut outcome = ShortCircuit::default();

		for (record, score) in precedents {
			// The phrase must actually occur in the chunk; precedent alone
			// never manufactures a finding for text that is not there.
			let phrase = hebrew::normalize(&record.phrase);

			if phrase.is_empty() || !normalized_chunk.contains(&phrase) {
				continue;
			}

			match record.action {
				CorrectionAction::Approve | CorrectionAction::Correct
					if *score >= gt.auto_approve_floor =>
				{
					let source = record
						.corrected_source
						.clone()
						.unwrap_or_else(|| record.source.clone());

					outcome.auto_findings.push(Finding {
						id: Uuid::new_v4(),
						source,
						snippet: record.phrase.clone(),
						context: None,
						justification: format!(
							"Previously confirmed by {} as a citation.",
							record.reviewer
						),
						confidence: *score,
						implicit: false,
						start_offset: None,
						end_offset: None,
						grounding_confidence: None,
						method: DetectionMethod::GroundTruth,
					});

					outcome.skip_generative = true;
					outcome
						.reason
						.get_or_insert_with(|| format!("Previously approved by {}.", record.reviewer));
				},
				CorrectionAction::Reject if *score >= gt.auto_reject_floor => {
					outcome.skip_generative = true;
					outcome.reason = Some(format!(
						"Previously rejected by {}: {}",
						record.reviewer,
						record.reason.as_deref().unwrap_or("no reason recorded")
					));
				},
				_ => {},
			}
		}

		outcome
	}
}

fn tier_for(finding: &Finding) -> ConfidenceTier {
	if finding.grounding_confidence == Some(1.) || finding.confidence >= 0.9 {
		ConfidenceTier::Exact
	} else if finding.confidence >= 0.75 {
		ConfidenceTier::High
	} else {
		ConfidenceTier::Medium
	}
}
