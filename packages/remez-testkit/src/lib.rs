//! In-memory fakes for exercising the pipeline without external services.
//! Embeddings are deterministic token-bag vectors, so texts sharing words
//! score high under cosine the way real embeddings would for paraphrases.

use std::{
	collections::VecDeque,
	sync::{
		Mutex,
		atomic::{AtomicU32, Ordering},
	},
};

use remez_config::{Config, EmbeddingProviderConfig, GenerativeProviderConfig};
use remez_domain::hebrew;
use remez_service::{BoxFuture, DocumentStore, EmbeddingProvider, GenerativeProvider, Providers, VectorIndex};
use remez_store::qdrant::IndexMatch;
use serde_json::{Map, Value};

const EMBED_DIMS: usize = 64;

/// A configuration with small, deterministic values for hermetic tests.
pub fn test_config() -> Config {
	Config {
		storage: remez_config::Storage {
			postgres: remez_config::Postgres {
				dsn: "postgres://localhost/remez_test".to_string(),
				pool_max_conns: 1,
			},
			qdrant: remez_config::Qdrant {
				url: "http://localhost:6334".to_string(),
				collection: "remez_test".to_string(),
				vector_dim: EMBED_DIMS as u32,
			},
		},
		providers: remez_config::Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: "test".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "fake-embedding".to_string(),
				dimensions: EMBED_DIMS as u32,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			generative: GenerativeProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: "test".to_string(),
				path: "/v1/chat/completions".to_string(),
				model: "fake-generative".to_string(),
				temperature: 0.,
				max_output_tokens: 4_096,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		analysis: remez_config::Analysis {
			chunk_chars: 4_000,
			min_chunk_chars: 500,
			inter_chunk_delay_ms: 0,
			two_pass: true,
			max_suspects_per_chunk: 10,
		},
		prefilter: remez_config::PrefilterConfig {
			fuzzy_threshold: 85,
			min_window_tokens: 5,
			max_window_tokens: 15,
		},
		retrieval: remez_config::Retrieval {
			namespaces: vec!["talmud".to_string(), "mishnah".to_string()],
			top_k: 10,
			candidates_per_suspect: 5,
			semantic_floor: 0.65,
			keyword_boost: 0.25,
			keyword_slop: 2,
			keyword_path_filter: String::new(),
			timeout_ms: 10_000,
		},
		ground_truth: remez_config::GroundTruth {
			namespace: "ground_truth".to_string(),
			relevant_k: 5,
			auto_approve_floor: 0.9,
			auto_reject_floor: 0.9,
		},
		cache: remez_config::Cache {
			enabled: true,
			similarity_threshold: 0.92,
			retention_days: 30,
			min_hits: 2,
		},
		limits: remez_config::Limits {
			generative_rpm: 0,
			embedding_rpm: 0,
			max_retries: 3,
			backoff_base_ms: 10,
			backoff_factor: 2.,
		},
		sync: remez_config::SyncPolicy {
			max_retries: 3,
			backoff_base_ms: 10,
			backoff_factor: 2.,
			quiet_period_ms: 50,
		},
	}
}

/// Providers backed by the default fakes, for tests that never reach them.
pub fn fake_providers() -> Providers {
	Providers::new(
		std::sync::Arc::new(FakeEmbedding::default()),
		std::sync::Arc::new(ScriptedGenerative::default()),
	)
}

/// Deterministic token-bag embedding: each normalized token adds weight to a
/// hashed dimension, then the vector is L2-normalized.
pub fn embed_text(text: &str) -> Vec<f32> {
	let normalized = hebrew::normalize(text);
	let lowered = normalized.to_lowercase();
	let mut vector = vec![0_f32; EMBED_DIMS];

	for token in lowered.split_whitespace() {
		let digest = blake3::hash(token.as_bytes());
		let slot = digest.as_bytes()[0] as usize % EMBED_DIMS;

		vector[slot] += 1.;
	}

	let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();

	if magnitude > 0. {
		for value in &mut vector {
			*value /= magnitude;
		}
	}

	vector
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn injected_store_error() -> remez_store::Error {
	remez_store::Error::InvalidArgument("injected failure".to_string())
}

#[derive(Default)]
pub struct FakeEmbedding {
	/// How many leading calls fail with a transient error.
	pub fail_first: AtomicU32,
	pub calls: AtomicU32,
}

impl EmbeddingProvider for FakeEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, remez_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);

			if call < self.fail_first.load(Ordering::SeqCst) {
				return Err(remez_providers::Error::Transient { status: 503 });
			}

			Ok(texts.iter().map(|text| embed_text(text)).collect())
		})
	}
}

/// One scripted reply of the fake generative provider.
pub enum ScriptedResponse {
	Ok(String),
	Quota,
	Transient(u16),
	Malformed(String),
}

/// Generative provider that replays a script. An exhausted script answers
/// with an empty findings object, which also satisfies the scan schema.
#[derive(Default)]
pub struct ScriptedGenerative {
	script: Mutex<VecDeque<ScriptedResponse>>,
	/// User message content of every call, in order.
	pub requests: Mutex<Vec<String>>,
	pub calls: AtomicU32,
}

impl ScriptedGenerative {
	pub fn push(&self, response: ScriptedResponse) {
		if let Ok(mut script) = self.script.lock() {
			script.push_back(response);
		}
	}

	pub fn push_ok(&self, body: &str) {
		self.push(ScriptedResponse::Ok(body.to_string()));
	}

	pub fn call_count(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}
}

impl GenerativeProvider for ScriptedGenerative {
	fn generate<'a>(
		&'a self,
		_cfg: &'a GenerativeProviderConfig,
		_system_prompt: &'a str,
		messages: &'a [Value],
		_schema: Option<&'a Value>,
	) -> BoxFuture<'a, remez_providers::Result<String>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if let Ok(mut requests) = self.requests.lock() {
				let content = messages
					.iter()
					.filter_map(|message| message.get("content").and_then(Value::as_str))
					.collect::<Vec<_>>()
					.join("\n");

				requests.push(content);
			}

			let scripted = self.script.lock().ok().and_then(|mut script| script.pop_front());

			match scripted {
				Some(ScriptedResponse::Ok(body)) => Ok(body),
				Some(ScriptedResponse::Quota) => Err(remez_providers::Error::Quota),
				Some(ScriptedResponse::Transient(status)) =>
					Err(remez_providers::Error::Transient { status }),
				Some(ScriptedResponse::Malformed(message)) =>
					Err(remez_providers::Error::Malformed { message }),
				None => Ok(r#"{"findings": []}"#.to_string()),
			}
		})
	}
}

struct StoredPoint {
	namespace: String,
	id: String,
	vector: Vec<f32>,
	text: String,
	payload: Map<String, Value>,
}

/// Vector index over plain memory with cosine scoring and a lexical fallback
/// for the BM25 leg.
#[derive(Default)]
pub struct InMemoryIndex {
	points: Mutex<Vec<StoredPoint>>,
	/// How many upcoming queries fail, for degradation tests.
	pub fail_queries: AtomicU32,
}

impl InMemoryIndex {
	/// Seeds one canonical passage, embedding its text with [`embed_text`].
	pub fn seed(&self, namespace: &str, id: &str, text: &str) {
		self.insert(namespace, id, embed_text(text), text, Map::new());
	}

	pub fn point_count(&self) -> usize {
		self.points.lock().map(|points| points.len()).unwrap_or(0)
	}

	fn insert(&self, namespace: &str, id: &str, vector: Vec<f32>, text: &str, payload: Map<String, Value>) {
		let Ok(mut points) = self.points.lock() else {
			return;
		};

		points.retain(|point| !(point.namespace == namespace && point.id == id));
		points.push(StoredPoint {
			namespace: namespace.to_string(),
			id: id.to_string(),
			vector,
			text: text.to_string(),
			payload,
		});
	}

	fn take_injected_failure(&self) -> bool {
		self.fail_queries
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
				(remaining > 0).then(|| remaining - 1)
			})
			.is_ok()
	}

	fn matching<'a>(
		point: &'a StoredPoint,
		namespace: &str,
		field_filters: &[(&str, String)],
	) -> Option<&'a StoredPoint> {
		if point.namespace != namespace {
			return None;
		}

		let matches_filters = field_filters.iter().all(|(field, value)| {
			point.payload.get(*field).and_then(Value::as_str) == Some(value.as_str())
		});

		matches_filters.then_some(point)
	}
}

impl VectorIndex for InMemoryIndex {
	fn upsert<'a>(
		&'a self,
		namespace: &'a str,
		id: &'a str,
		vector: Vec<f32>,
		text: &'a str,
		metadata: Map<String, Value>,
	) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(async move {
			self.insert(namespace, id, vector, text, metadata);

			Ok(())
		})
	}

	fn query<'a>(
		&'a self,
		namespace: &'a str,
		vector: Vec<f32>,
		top_k: usize,
		field_filters: &'a [(&'a str, String)],
	) -> BoxFuture<'a, remez_store::Result<Vec<IndexMatch>>> {
		Box::pin(async move {
			if self.take_injected_failure() {
				return Err(injected_store_error());
			}

			let points = self.points.lock().map_err(|_| injected_store_error())?;
			let mut matches: Vec<IndexMatch> = points
				.iter()
				.filter_map(|point| Self::matching(point, namespace, field_filters))
				.map(|point| IndexMatch {
					id: point.id.clone(),
					score: cosine(&vector, &point.vector),
					text: point.text.clone(),
					payload: point.payload.clone(),
				})
				.collect();

			matches.sort_by(|a, b| b.score.total_cmp(&a.score));
			matches.truncate(top_k);

			Ok(matches)
		})
	}

	fn search_text<'a>(
		&'a self,
		namespace: &'a str,
		phrase: &'a str,
		top_k: usize,
		field_filters: &'a [(&'a str, String)],
	) -> BoxFuture<'a, remez_store::Result<Vec<IndexMatch>>> {
		Box::pin(async move {
			if self.take_injected_failure() {
				return Err(injected_store_error());
			}

			let phrase_tokens: Vec<String> = hebrew::normalize(phrase)
				.split_whitespace()
				.map(str::to_string)
				.collect();
			let points = self.points.lock().map_err(|_| injected_store_error())?;
			let mut matches: Vec<IndexMatch> = points
				.iter()
				.filter_map(|point| Self::matching(point, namespace, field_filters))
				.filter_map(|point| {
					let normalized = hebrew::normalize(&point.text);
					let hits = phrase_tokens
						.iter()
						.filter(|token| normalized.contains(token.as_str()))
						.count();

					(hits > 0).then(|| IndexMatch {
						id: point.id.clone(),
						score: hits as f32 / phrase_tokens.len().max(1) as f32,
						text: point.text.clone(),
						payload: point.payload.clone(),
					})
				})
				.collect();

			matches.sort_by(|a, b| b.score.total_cmp(&a.score));
			matches.truncate(top_k);

			Ok(matches)
		})
	}

	fn delete<'a>(
		&'a self,
		namespace: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(async move {
			if let Ok(mut points) = self.points.lock() {
				points.retain(|point| !(point.namespace == namespace && point.id == id));
			}

			Ok(())
		})
	}
}

/// Document store over plain memory with write-failure injection.
#[derive(Default)]
pub struct InMemoryDocStore {
	docs: Mutex<ahash::AHashMap<(String, String), Value>>,
	/// How many leading write calls fail.
	pub fail_first: AtomicU32,
	pub write_calls: AtomicU32,
}

impl InMemoryDocStore {
	pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
		self.docs
			.lock()
			.ok()?
			.get(&(collection.to_string(), id.to_string()))
			.cloned()
	}

	fn next_write(&self) -> remez_store::Result<()> {
		let call = self.write_calls.fetch_add(1, Ordering::SeqCst);

		if call < self.fail_first.load(Ordering::SeqCst) {
			return Err(injected_store_error());
		}

		Ok(())
	}
}

impl DocumentStore for InMemoryDocStore {
	fn get<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, remez_store::Result<Option<Value>>> {
		Box::pin(async move { Ok(self.document(collection, id)) })
	}

	fn set<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		data: &'a Value,
	) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(async move {
			self.next_write()?;

			if let Ok(mut docs) = self.docs.lock() {
				docs.insert((collection.to_string(), id.to_string()), data.clone());
			}

			Ok(())
		})
	}

	fn update<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		data: &'a Value,
	) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(async move {
			self.next_write()?;

			let mut docs = self.docs.lock().map_err(|_| injected_store_error())?;
			let key = (collection.to_string(), id.to_string());
			let Some(existing) = docs.get_mut(&key) else {
				return Err(remez_store::Error::NotFound(format!("{collection}/{id}")));
			};

			if let (Value::Object(target), Value::Object(incoming)) = (existing, data) {
				for (field, value) in incoming {
					target.insert(field.clone(), value.clone());
				}
			}

			Ok(())
		})
	}

	fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, remez_store::Result<()>> {
		Box::pin(async move {
			self.next_write()?;

			if let Ok(mut docs) = self.docs.lock() {
				docs.remove(&(collection.to_string(), id.to_string()));
			}

			Ok(())
		})
	}
}
