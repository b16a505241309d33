//! Scheduling behavior across the full stack: priority demotion when the
//! last observer leaves, lifecycle notifications, and diagnostics surfaces.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{eventually, test_manager, StubTransport, TestDescriptor};
use courier_core::{
    CourierError, Fingerprint, LifecycleEventKind, QueueDef, RequestLifecycle,
};

struct Screen;

/// Cancelling the last observer demotes the still-parked refresh task: work
/// enqueued later at normal priority overtakes it.
#[tokio::test]
async fn cancelling_the_last_observer_demotes_the_parked_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let transport =
        StubTransport::returning(b"{\"ok\":true}").with_delay(Duration::from_millis(250));
    let manager = test_manager(dir.path(), transport.clone());
    let queue = QueueDef::serial("demote.queue");

    // Occupy the serial queue's only slot.
    manager
        .request_with(
            TestDescriptor::plain("blocker").on_queue(queue.clone()),
            (),
            None,
            false,
            |_| {},
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Park a refresh behind the blocker by observing a cold entry.
    let target = Arc::new(Screen);
    let mut token = None;
    manager
        .observe(
            &target,
            TestDescriptor::cacheable("observed", 60).on_queue(queue.clone()),
            (),
            &mut token,
            |_| {},
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Last observer gone: the parked refresh drops to very-low priority.
    token.unwrap().cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Normal-priority work enqueued afterwards should overtake it.
    manager
        .request_with(
            TestDescriptor::plain("later").on_queue(queue.clone()),
            (),
            None,
            false,
            |_| {},
        )
        .await;

    eventually(|| transport.call_count() == 3).await;
    assert_eq!(
        transport.calls(),
        vec!["/ping/blocker", "/ping/later", "/ping/observed"]
    );
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RequestLifecycle for RecordingListener {
    fn request_started(&self, _id: &Fingerprint) {
        self.events.lock().unwrap().push("started".into());
    }

    fn request_completed(&self, _id: &Fingerprint) {
        self.events.lock().unwrap().push("completed".into());
    }

    fn request_failed(&self, _id: &Fingerprint, _error: &CourierError) {
        self.events.lock().unwrap().push("failed".into());
    }
}

/// Per-request delegates hear started then completed, in order, on the main
/// dispatcher.
#[tokio::test]
async fn delegates_hear_started_then_completed() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":true}");
    let manager = test_manager(dir.path(), transport);

    let listener = Arc::new(RecordingListener::default());
    let delegate: Arc<dyn RequestLifecycle> = listener.clone();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    manager
        .request_with(
            TestDescriptor::plain("listened"),
            (),
            Some(delegate),
            false,
            move |result| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(result.map(|_| ()));
                }
            },
        )
        .await;
    rx.await.unwrap().unwrap();

    eventually(|| listener.events.lock().unwrap().len() == 2).await;
    assert_eq!(
        *listener.events.lock().unwrap(),
        vec!["started", "completed"]
    );
}

/// Failed requests notify delegates with `request_failed`.
#[tokio::test]
async fn delegates_hear_failures() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::failing();
    let manager = test_manager(dir.path(), transport);

    let listener = Arc::new(RecordingListener::default());
    let delegate: Arc<dyn RequestLifecycle> = listener.clone();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    manager
        .request_with(
            TestDescriptor::plain("broken"),
            (),
            Some(delegate),
            false,
            move |result| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(result.map(|_| ()));
                }
            },
        )
        .await;
    assert!(rx.await.unwrap().is_err());

    eventually(|| listener.events.lock().unwrap().len() == 2).await;
    assert_eq!(*listener.events.lock().unwrap(), vec!["started", "failed"]);
}

/// The broadcast publisher mirrors the request lifecycle for any subscriber.
#[tokio::test]
async fn lifecycle_events_are_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":true}");
    let manager = test_manager(dir.path(), transport);
    let mut events = manager.subscribe_lifecycle();

    manager
        .request(TestDescriptor::plain("published"), ())
        .await
        .unwrap();

    let started = events.recv().await.unwrap();
    assert_eq!(started.kind, LifecycleEventKind::Started);
    assert_eq!(started.name, "request.started");
    let completed = events.recv().await.unwrap();
    assert_eq!(completed.kind, LifecycleEventKind::Completed);
    assert!(completed.error.is_none());
}

/// Diagnostics: queue snapshots and cache statistics reflect activity.
#[tokio::test]
async fn diagnostics_reflect_activity() {
    let dir = tempfile::tempdir().unwrap();
    let transport = StubTransport::returning(b"{\"ok\":true}");
    let manager = test_manager(dir.path(), transport);

    manager
        .request(TestDescriptor::cacheable("diag", 60), ())
        .await
        .unwrap();
    manager
        .request(TestDescriptor::cacheable("diag", 60), ())
        .await
        .unwrap();

    let stats = manager.cache_stats();
    assert_eq!(stats.writes, 1);
    assert!(stats.memory_hits >= 1);

    let snapshots = manager.queue_snapshots().await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].queue, "network.default");
    assert_eq!(snapshots[0].in_flight, 0);
    assert_eq!(snapshots[0].pending, 0);
}
