pub mod analyze;
pub mod cache;
pub mod events;
pub mod ground_truth;
pub mod rate_limit;
pub mod retrieval;
pub mod scan;
pub mod sync_queue;
pub mod verify;

pub(crate) mod prompts;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::{Map, Value};

pub use analyze::{AnalyzeOptions, AnalyzeRequest, CostEstimate};
pub use cache::ResponseCache;
pub use events::{AnalysisPhase, AnalysisProgress, EventBus};
pub use ground_truth::Correction;
pub use rate_limit::RateLimiter;
use remez_config::{Config, EmbeddingProviderConfig, GenerativeProviderConfig};
use remez_providers::{embedding, generative};
use remez_store::qdrant::{IndexMatch, QdrantIndex};
pub use retrieval::{Provenance, RetrievalCandidate, RetrievalLayer};
pub use scan::Suspect;
pub use sync_queue::{QueueStatus, QueuedWrite, SyncQueue, WriteOp};

pub type ServiceResult<T> = Result<T, ServiceError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, remez_providers::Result<Vec<Vec<f32>>>>;
}

pub trait GenerativeProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerativeProviderConfig,
		system_prompt: &'a str,
		messages: &'a [Value],
		schema: Option<&'a Value>,
	) -> BoxFuture<'a, remez_providers::Result<String>>;
}

/// Dense + lexical index access behind one seam so tests can swap in an
/// in-memory index.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn upsert<'a>(
		&'a self,
		namespace: &'a str,
		id: &'a str,
		vector: Vec<f32>,
		text: &'a str,
		metadata: Map<String, Value>,
	) -> BoxFuture<'a, remez_store::Result<()>>;

	fn query<'a>(
		&'a self,
		namespace: &'a str,
		vector: Vec<f32>,
		top_k: usize,
		field_filters: &'a [(&'a str, String)],
	) -> BoxFuture<'a, remez_store::Result<Vec<IndexMatch>>>;

	fn search_text<'a>(
		&'a self,
		namespace: &'a str,
		phrase: &'a str,
		top_k: usize,
		field_filters: &'a [(&'a str, String)],
	) -> BoxFuture<'a, remez_store::Result<Vec<IndexMatch>>>;

	fn delete<'a>(&'a self, namespace: &'a str, id: &'a str)
	-> BoxFuture<'a, remez_store::Result<()>>;
}

/// Document persistence seam the sync queue drains into.
pub trait DocumentStore
where
	Self: Send + Sync,
{
	fn get<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, remez_store::Result<Option<Value>>>;

	fn set<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		data: &'a Value,
	) -> BoxFuture<'a, remez_store::Result<()>>;

	fn update<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		data: &'a Value,
	) -> BoxFuture<'a, remez_store::Result<()>>;

	fn delete<'a>(&'a self, collection: &'a str, id: &'a str)
	-> BoxFuture<'a, remez_store::Result<()>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	/// Every retry budget was spent on retryable provider failures.
	#[error("Provider unavailable after retries: {message}")]
	ProviderExhausted { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}

impl From<remez_providers::Error> for ServiceError {
	fn from(err: remez_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<remez_store::Error> for ServiceError {
	fn from(err: remez_store::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generative: Arc<dyn GenerativeProvider>,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, remez_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl GenerativeProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerativeProviderConfig,
		system_prompt: &'a str,
		messages: &'a [Value],
		schema: Option<&'a Value>,
	) -> BoxFuture<'a, remez_providers::Result<String>> {
		Box::pin(generative::generate(cfg, system_prompt, messages, schema))
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, generative: Arc<dyn GenerativeProvider>) -> Self {
		Self { embedding, generative }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);
		Self { embedding: provider.clone(), generative: provider }
	}
}

impl VectorIndex for QdrantIndex {
	fn upsert<'a>(
		&'a self,
		namespace: &'a str,
		id: &'a str,
		vector: Vec<f32>,
		text: &'a str,
		metadata: Map<String, Value>,
	) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(self.upsert(namespace, id, vector, text, metadata))
	}

	fn query<'a>(
		&'a self,
		namespace: &'a str,
		vector: Vec<f32>,
		top_k: usize,
		field_filters: &'a [(&'a str, String)],
	) -> BoxFuture<'a, remez_store::Result<Vec<IndexMatch>>> {
		Box::pin(self.query(namespace, vector, top_k, field_filters))
	}

	fn search_text<'a>(
		&'a self,
		namespace: &'a str,
		phrase: &'a str,
		top_k: usize,
		field_filters: &'a [(&'a str, String)],
	) -> BoxFuture<'a, remez_store::Result<Vec<IndexMatch>>> {
		Box::pin(self.search_text(namespace, phrase, top_k, field_filters))
	}

	fn delete<'a>(
		&'a self,
		namespace: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(self.delete(namespace, id))
	}
}

impl DocumentStore for remez_store::docs::PgDocStore {
	fn get<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, remez_store::Result<Option<Value>>> {
		Box::pin(self.get(collection, id))
	}

	fn set<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		data: &'a Value,
	) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(self.set(collection, id, data))
	}

	fn update<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		data: &'a Value,
	) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(self.update(collection, id, data))
	}

	fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(self.delete(collection, id))
	}
}

pub struct Service {
	pub cfg: Config,
	pub retrieval: RetrievalLayer,
	pub providers: Providers,
	pub(crate) prefilter: remez_domain::prefilter::Prefilter,
	pub(crate) cache: ResponseCache,
	pub(crate) generative_limiter: RateLimiter,
	pub(crate) events: EventBus<AnalysisProgress>,
}

impl Service {
	pub fn new(cfg: Config, index: Arc<dyn VectorIndex>) -> Self {
		Self::with_providers(cfg, index, Providers::default())
	}

	pub fn with_providers(cfg: Config, index: Arc<dyn VectorIndex>, providers: Providers) -> Self {
		let prefilter = remez_domain::prefilter::Prefilter::new(
			&cfg.prefilter,
			remez_domain::corpus::builtin_passages(),
		);
		let cache = ResponseCache::new(cfg.cache.clone());
		let generative_limiter = RateLimiter::from_rpm(cfg.limits.generative_rpm);
		let retrieval = RetrievalLayer::new(&cfg, index, providers.embedding.clone());

		Self { cfg, retrieval, providers, prefilter, cache, generative_limiter, events: EventBus::new() }
	}

	pub fn events(&self) -> &EventBus<AnalysisProgress> {
		&self.events
	}

	pub fn cache(&self) -> &ResponseCache {
		&self.cache
	}

	/// One generative call with rate limiting and bounded retry on retryable
	/// provider failures.
	pub(crate) async fn generate_with_retry(
		&self,
		system_prompt: &str,
		messages: &[Value],
		schema: Option<&Value>,
	) -> ServiceResult<String> {
		let limits = &self.cfg.limits;
		let mut attempt = 0;

		loop {
			self.generative_limiter.wait_for_slot().await;

			match self
				.providers
				.generative
				.generate(&self.cfg.providers.generative, system_prompt, messages, schema)
				.await
			{
				Ok(text) => return Ok(text),
				Err(err) if err.is_retryable() && attempt < limits.max_retries => {
					let delay = backoff_for_attempt(
						limits.backoff_base_ms,
						limits.backoff_factor,
						attempt,
					);

					tracing::warn!(
						error = %err,
						attempt,
						delay_ms = delay.as_millis() as u64,
						"Generative call failed; backing off before retry."
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

/// Exponential backoff delay for the zero-based retry attempt.
pub(crate) fn backoff_for_attempt(base_ms: u64, factor: f64, attempt: u32) -> Duration {
	let scaled = base_ms as f64 * factor.powi(attempt as i32);

	Duration::from_millis(scaled as u64)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_grows_exponentially() {
		assert_eq!(backoff_for_attempt(1_000, 2., 0), Duration::from_millis(1_000));
		assert_eq!(backoff_for_attempt(1_000, 2., 1), Duration::from_millis(2_000));
		assert_eq!(backoff_for_attempt(1_000, 2., 2), Duration::from_millis(4_000));
	}
}
