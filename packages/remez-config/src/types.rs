use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub storage: Storage,
	pub providers: Providers,
	pub analysis: Analysis,
	pub prefilter: PrefilterConfig,
	pub retrieval: Retrieval,
	pub ground_truth: GroundTruth,
	pub cache: Cache,
	pub limits: Limits,
	pub sync: SyncPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generative: GenerativeProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerativeProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_output_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Analysis {
	/// Character budget per chunk; boundaries are snapped to grapheme breaks.
	pub chunk_chars: usize,
	/// Floor for recursive splitting on truncated model output.
	pub min_chunk_chars: usize,
	pub inter_chunk_delay_ms: u64,
	pub two_pass: bool,
	pub max_suspects_per_chunk: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrefilterConfig {
	/// Fuzzy acceptance threshold on the normalized 0-100 similarity scale.
	pub fuzzy_threshold: u32,
	pub min_window_tokens: usize,
	pub max_window_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	pub namespaces: Vec<String>,
	pub top_k: usize,
	pub candidates_per_suspect: usize,
	pub semantic_floor: f32,
	pub keyword_boost: f32,
	pub keyword_slop: usize,
	pub keyword_path_filter: String,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroundTruth {
	pub namespace: String,
	pub relevant_k: usize,
	pub auto_approve_floor: f32,
	pub auto_reject_floor: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
	pub enabled: bool,
	pub similarity_threshold: f32,
	pub retention_days: i64,
	pub min_hits: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
	/// Requests per minute; zero disables pacing for that provider.
	pub generative_rpm: u32,
	pub embedding_rpm: u32,
	pub max_retries: u32,
	pub backoff_base_ms: u64,
	pub backoff_factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncPolicy {
	pub max_retries: u32,
	pub backoff_base_ms: u64,
	pub backoff_factor: f64,
	pub quiet_period_ms: u64,
}
