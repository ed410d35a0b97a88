use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionAction {
	Approve,
	Reject,
	Correct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
	Exact,
	High,
	Medium,
}

/// A persisted human decision about a past finding. Retrieved by semantic
/// relevance and always filtered by the reviewer identity that recorded it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroundTruthRecord {
	pub id: Uuid,
	pub reviewer: String,
	pub action: CorrectionAction,
	/// The phrase the reviewer judged, in corpus orthography.
	pub phrase: String,
	pub snippet: String,
	pub source: String,
	pub corrected_source: Option<String>,
	pub reason: Option<String>,
	pub confidence_tier: ConfidenceTier,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}

/// A finding as the caller persists it through the sync queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FindingRecord {
	pub id: Uuid,
	pub document_id: String,
	pub source: String,
	pub snippet: String,
	pub justification: String,
	pub confidence: f32,
	pub implicit: bool,
	pub start_offset: Option<usize>,
	pub end_offset: Option<usize>,
	pub method: String,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
