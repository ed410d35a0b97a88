use std::sync::{Arc, Mutex};

use ahash::{AHashMap, AHashSet};
use time::{Duration, OffsetDateTime};

/// In-process response cache keyed by a hash of the normalized query, with a
/// similarity fallback so near-identical chunks reuse one generative answer.
#[derive(Clone)]
pub struct ResponseCache {
	cfg: remez_config::Cache,
	entries: Arc<Mutex<AHashMap<String, CacheEntry>>>,
}

struct CacheEntry {
	tokens: AHashSet<String>,
	response: String,
	created_at: OffsetDateTime,
	hits: u32,
}

impl ResponseCache {
	pub fn new(cfg: remez_config::Cache) -> Self {
		Self { cfg, entries: Arc::new(Mutex::new(AHashMap::new())) }
	}

	/// Returns the cached response for an exact or near-duplicate query. The
	/// hit counter is bumped off the caller's path.
	pub fn check(&self, query: &str) -> Option<String> {
		if !self.cfg.enabled {
			return None;
		}

		let normalized = normalize_query(query);
		let key = cache_key(&normalized);
		let tokens = token_set(&normalized);
		let (hit_key, response) = {
			let entries = self.entries.lock().ok()?;

			if let Some(entry) = entries.get(&key) {
				(key, entry.response.clone())
			} else {
				let (best_key, _) = entries
					.iter()
					.map(|(entry_key, entry)| (entry_key, jaccard(&tokens, &entry.tokens)))
					.filter(|(_, similarity)| *similarity >= self.cfg.similarity_threshold)
					.max_by(|(_, a), (_, b)| a.total_cmp(b))?;

				(best_key.clone(), entries[best_key].response.clone())
			}
		};
		let entries = self.entries.clone();

		tokio::spawn(async move {
			if let Ok(mut entries) = entries.lock()
				&& let Some(entry) = entries.get_mut(&hit_key)
			{
				entry.hits += 1;
			}
		});

		Some(response)
	}

	pub fn store(&self, query: &str, response: &str) {
		if !self.cfg.enabled {
			return;
		}

		let normalized = normalize_query(query);
		let entry = CacheEntry {
			tokens: token_set(&normalized),
			response: response.to_string(),
			created_at: OffsetDateTime::now_utc(),
			hits: 0,
		};

		if let Ok(mut entries) = self.entries.lock() {
			entries.insert(cache_key(&normalized), entry);
		}
	}

	/// Evicts entries past retention that never earned the minimum hit count.
	/// Returns how many entries were dropped.
	pub fn prune(&self) -> usize {
		let cutoff = OffsetDateTime::now_utc() - Duration::days(self.cfg.retention_days);
		let Ok(mut entries) = self.entries.lock() else {
			return 0;
		};
		let before = entries.len();

		entries.retain(|_, entry| entry.created_at >= cutoff || entry.hits >= self.cfg.min_hits);

		before - entries.len()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn normalize_query(query: &str) -> String {
	query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn cache_key(normalized: &str) -> String {
	blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

fn token_set(normalized: &str) -> AHashSet<String> {
	normalized.split(' ').filter(|token| !token.is_empty()).map(str::to_string).collect()
}

fn jaccard(a: &AHashSet<String>, b: &AHashSet<String>) -> f32 {
	let union = a.union(b).count();

	if union == 0 {
		return 1.;
	}

	a.intersection(b).count() as f32 / union as f32
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cache(threshold: f32) -> ResponseCache {
		ResponseCache::new(remez_config::Cache {
			enabled: true,
			similarity_threshold: threshold,
			retention_days: 30,
			min_hits: 2,
		})
	}

	#[tokio::test]
	async fn exact_repeat_hits() {
		let cache = cache(0.92);

		cache.store("chunk text one", "{\"findings\":[]}");

		assert_eq!(cache.check("chunk  text   one").as_deref(), Some("{\"findings\":[]}"));
	}

	#[tokio::test]
	async fn near_duplicate_hits_above_threshold() {
		let cache = cache(0.9);
		let base: Vec<String> = (0..20).map(|i| format!("tok{i}")).collect();

		cache.store(&base.join(" "), "cached");

		// 19 of 20 shared tokens, one extra: jaccard 19/21 ≈ 0.905.
		let mut near = base[..19].to_vec();
		near.push("novel".to_string());

		assert_eq!(cache.check(&near.join(" ")).as_deref(), Some("cached"));
	}

	#[tokio::test]
	async fn dissimilar_query_misses() {
		let cache = cache(0.92);

		cache.store("the first chunk about one topic entirely", "cached");

		assert!(cache.check("something else altogether different here now").is_none());
	}

	#[tokio::test]
	async fn disabled_cache_never_hits() {
		let cache = ResponseCache::new(remez_config::Cache {
			enabled: false,
			similarity_threshold: 0.92,
			retention_days: 30,
			min_hits: 2,
		});

		cache.store("query", "response");

		assert!(cache.check("query").is_none());
	}

	#[tokio::test]
	async fn prune_keeps_fresh_entries() {
		let cache = cache(0.92);

		cache.store("query", "response");

		assert_eq!(cache.prune(), 0);
		assert_eq!(cache.len(), 1);
	}
}
