use std::sync::{Arc, atomic::Ordering};

use remez_service::{QueueStatus, SyncQueue};
use remez_testkit::InMemoryDocStore;
use serde_json::json;

async fn wait_for(queue: &SyncQueue, wanted: impl Fn(&QueueStatus) -> bool) {
	let mut status = queue.subscribe();

	loop {
		if wanted(&status.borrow_and_update().clone()) {
			return;
		}

		status.changed().await.expect("queue worker stopped");
	}
}

#[tokio::test]
async fn findings_persist_through_the_queue() {
	let cfg = remez_testkit::test_config();
	let store = Arc::new(InMemoryDocStore::default());
	let queue = SyncQueue::new(store.clone(), cfg.sync);

	queue.enqueue_set(
		"save finding",
		"findings",
		"finding-1",
		json!({
			"source": "Sanhedrin 37a",
			"snippet": "כל המקיים נפש אחת מישראל",
			"confidence": 0.85,
			"end_offset": null,
		}),
	);
	wait_for(&queue, |status| *status == QueueStatus::Success).await;

	let stored = store.document("findings", "finding-1").expect("document missing");

	assert_eq!(stored["source"], "Sanhedrin 37a");
	// Fields the persistence layer cannot represent were stripped.
	assert!(stored.get("end_offset").is_none());
}

#[tokio::test]
async fn a_halted_queue_resumes_after_the_error_is_dismissed() {
	let cfg = remez_testkit::test_config();
	let store = Arc::new(InMemoryDocStore::default());

	// First write exhausts its whole retry budget; the one behind it is fine.
	store.fail_first.store(cfg.sync.max_retries + 1, Ordering::SeqCst);

	let queue = SyncQueue::new(store.clone(), cfg.sync);

	queue.enqueue_set("doomed", "findings", "a", json!({"n": 1}));
	queue.enqueue_set("buffered", "findings", "b", json!({"n": 2}));
	wait_for(&queue, |status| matches!(status, QueueStatus::Error { .. })).await;

	assert!(store.document("findings", "b").is_none());

	queue.clear_error();
	wait_for(&queue, |status| *status == QueueStatus::Success).await;

	assert!(store.document("findings", "a").is_none());
	assert_eq!(store.document("findings", "b").expect("document missing")["n"], 2);
}
