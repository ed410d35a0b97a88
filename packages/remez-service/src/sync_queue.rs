use std::{collections::VecDeque, sync::Arc};

use remez_config::SyncPolicy;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::{DocumentStore, backoff_for_attempt};

#[derive(Clone, Debug)]
pub enum WriteOp {
	Set(Value),
	Update(Value),
	Delete,
}

/// One pending persistence operation, labeled for status reporting.
#[derive(Clone, Debug)]
pub struct QueuedWrite {
	pub name: String,
	pub collection: String,
	pub id: String,
	pub op: WriteOp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueStatus {
	Idle,
	Saving { name: String },
	Success,
	Error { name: String, message: String },
}

enum Command {
	Write(QueuedWrite),
	ClearError,
}

/// Strictly ordered write queue. Operations drain one at a time; a write that
/// exhausts its retries halts draining until the error is dismissed, while new
/// writes keep buffering behind it.
pub struct SyncQueue {
	tx: mpsc::UnboundedSender<Command>,
	status: watch::Receiver<QueueStatus>,
}

impl SyncQueue {
	pub fn new(store: Arc<dyn DocumentStore>, policy: SyncPolicy) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let (status_tx, status_rx) = watch::channel(QueueStatus::Idle);

		tokio::spawn(run_worker(store, policy, rx, status_tx));

		Self { tx, status: status_rx }
	}

	/// Enqueues a write. Fields the persistence layer cannot represent (JSON
	/// nulls inside objects) are stripped before the write is queued.
	pub fn enqueue(&self, mut write: QueuedWrite) {
		if let WriteOp::Set(data) | WriteOp::Update(data) = &mut write.op {
			strip_nulls(data);
		}

		let _ = self.tx.send(Command::Write(write));
	}

	pub fn enqueue_set(&self, name: &str, collection: &str, id: &str, data: Value) {
		self.enqueue(QueuedWrite {
			name: name.to_string(),
			collection: collection.to_string(),
			id: id.to_string(),
			op: WriteOp::Set(data),
		});
	}

	pub fn enqueue_update(&self, name: &str, collection: &str, id: &str, data: Value) {
		self.enqueue(QueuedWrite {
			name: name.to_string(),
			collection: collection.to_string(),
			id: id.to_string(),
			op: WriteOp::Update(data),
		});
	}

	pub fn enqueue_delete(&self, name: &str, collection: &str, id: &str) {
		self.enqueue(QueuedWrite {
			name: name.to_string(),
			collection: collection.to_string(),
			id: id.to_string(),
			op: WriteOp::Delete,
		});
	}

	/// Dismisses a terminal error so buffered writes resume draining.
	pub fn clear_error(&self) {
		let _ = self.tx.send(Command::ClearError);
	}

	pub fn status(&self) -> QueueStatus {
		self.status.borrow().clone()
	}

	/// Watch handle over status transitions; dropping it unsubscribes.
	pub fn subscribe(&self) -> watch::Receiver<QueueStatus> {
		self.status.clone()
	}
}

async fn run_worker(
	store: Arc<dyn DocumentStore>,
	policy: SyncPolicy,
	mut rx: mpsc::UnboundedReceiver<Command>,
	status_tx: watch::Sender<QueueStatus>,
) {
	let mut pending: VecDeque<QueuedWrite> = VecDeque::new();
	let mut halted = false;
	let quiet_period = std::time::Duration::from_millis(policy.quiet_period_ms);

	loop {
		if halted {
			match rx.recv().await {
				Some(Command::Write(write)) => pending.push_back(write),
				Some(Command::ClearError) => {
					halted = false;

					if pending.is_empty() {
						status_tx.send_replace(QueueStatus::Idle);
					}
				},
				None => break,
			}

			continue;
		}

		if let Some(write) = pending.pop_front() {
			let last_queued = pending.is_empty() && rx.is_empty();

			halted = !drain_one(&*store, &policy, &status_tx, write, last_queued).await;

			continue;
		}

		tokio::select! {
			command = rx.recv() => match command {
				Some(Command::Write(write)) => pending.push_back(write),
				Some(Command::ClearError) => {},
				None => break,
			},
			_ = tokio::time::sleep(quiet_period) => {
				// Success decays to Idle after a quiet period with nothing queued.
				if *status_tx.borrow() == QueueStatus::Success {
					status_tx.send_replace(QueueStatus::Idle);
				}
			},
		}
	}
}

/// Applies one write with bounded retry. Returns false when the write failed
/// terminally and the queue must halt.
async fn drain_one(
	store: &dyn DocumentStore,
	policy: &SyncPolicy,
	status_tx: &watch::Sender<QueueStatus>,
	write: QueuedWrite,
	queue_now_empty: bool,
) -> bool {
	status_tx.send_replace(QueueStatus::Saving { name: write.name.clone() });

	let mut attempt = 0_u32;

	loop {
		match apply(store, &write).await {
			Ok(()) => {
				if queue_now_empty {
					status_tx.send_replace(QueueStatus::Success);
				}

				return true;
			},
			Err(err) if attempt < policy.max_retries => {
				let delay =
					backoff_for_attempt(policy.backoff_base_ms, policy.backoff_factor, attempt);

				tracing::warn!(
					error = %err,
					name = %write.name,
					attempt,
					"Queued write failed; backing off before retry."
				);
				tokio::time::sleep(delay).await;

				attempt += 1;
			},
			Err(err) => {
				tracing::error!(
					error = %err,
					name = %write.name,
					"Queued write failed terminally; halting the queue."
				);
				status_tx.send_replace(QueueStatus::Error {
					name: write.name,
					message: sanitize_error(&err.to_string()),
				});

				return false;
			},
		}
	}
}

async fn apply(store: &dyn DocumentStore, write: &QueuedWrite) -> remez_store::Result<()> {
	match &write.op {
		WriteOp::Set(data) => store.set(&write.collection, &write.id, data).await,
		WriteOp::Update(data) => store.update(&write.collection, &write.id, data).await,
		WriteOp::Delete => store.delete(&write.collection, &write.id).await,
	}
}

/// Removes null-valued object fields recursively.
fn strip_nulls(value: &mut Value) {
	match value {
		Value::Object(map) => {
			map.retain(|_, entry| !entry.is_null());

			for entry in map.values_mut() {
				strip_nulls(entry);
			}
		},
		Value::Array(items) =>
			for item in items {
				strip_nulls(item);
			},
		_ => {},
	}
}

/// One line, bounded length; raw store errors can embed payload fragments.
fn sanitize_error(message: &str) -> String {
	let first_line = message.lines().next().unwrap_or_default();

	first_line.chars().take(300).collect()
}
