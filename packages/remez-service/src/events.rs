use std::sync::{
	Mutex,
	atomic::{AtomicU64, Ordering},
};

type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Synchronous fan-out of progress events to registered listeners. Listener
/// panics are not caught; listeners are expected to be cheap and infallible.
pub struct EventBus<T> {
	listeners: Mutex<Vec<(u64, Listener<T>)>>,
	next_id: AtomicU64,
}

impl<T> EventBus<T> {
	pub fn new() -> Self {
		Self { listeners: Mutex::new(Vec::new()), next_id: AtomicU64::new(0) }
	}

	/// Registers a listener and returns the token that removes it again.
	pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> u64 {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);

		if let Ok(mut listeners) = self.listeners.lock() {
			listeners.push((id, Box::new(listener)));
		}

		id
	}

	pub fn unsubscribe(&self, id: u64) {
		if let Ok(mut listeners) = self.listeners.lock() {
			listeners.retain(|(listener_id, _)| *listener_id != id);
		}
	}

	pub fn emit(&self, event: &T) {
		if let Ok(listeners) = self.listeners.lock() {
			for (_, listener) in listeners.iter() {
				listener(event);
			}
		}
	}
}

impl<T> Default for EventBus<T> {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisPhase {
	Prefilter,
	GroundTruth,
	CacheHit,
	Scanning,
	SinglePass,
	Skipped,
	Done,
}

#[derive(Clone, Debug)]
pub struct AnalysisProgress {
	pub chunk_index: usize,
	pub chunk_count: usize,
	/// Characters of the document covered once this chunk completes.
	pub chars_processed: usize,
	pub phase: AnalysisPhase,
}
