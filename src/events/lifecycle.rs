//! Request lifecycle events.
//!
//! Two delivery paths exist side by side: per-task listener delegates
//! (`RequestLifecycle` through a [`super::Multicast`]) for callers that
//! attach to a specific request, and a process-wide broadcast publisher for
//! components observing all traffic.

use tokio::sync::broadcast;

use crate::constants::{events, EVENT_CHANNEL_CAPACITY};
use crate::error::CourierError;
use crate::fingerprint::Fingerprint;

/// Listener attached to individual requests.
///
/// All hooks default to no-ops; implementors override what they care about.
/// Callbacks arrive on the main dispatcher.
pub trait RequestLifecycle: Send + Sync {
    fn request_started(&self, _id: &Fingerprint) {}
    fn request_completed(&self, _id: &Fingerprint) {}
    fn request_failed(&self, _id: &Fingerprint, _error: &CourierError) {}
}

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEventKind {
    Started,
    Completed,
    Failed,
}

/// Event that has been published to the process-wide channel.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub name: &'static str,
    pub kind: LifecycleEventKind,
    pub fingerprint: Fingerprint,
    /// Present on `Failed` events.
    pub error: Option<String>,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// High-throughput publisher for request lifecycle events.
#[derive(Debug, Clone)]
pub struct LifecyclePublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl Default for LifecyclePublisher {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl LifecyclePublisher {
    /// Create a publisher with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub(crate) fn started(&self, fingerprint: &Fingerprint) {
        self.publish(
            events::REQUEST_STARTED,
            LifecycleEventKind::Started,
            fingerprint,
            None,
        );
    }

    pub(crate) fn completed(&self, fingerprint: &Fingerprint) {
        self.publish(
            events::REQUEST_COMPLETED,
            LifecycleEventKind::Completed,
            fingerprint,
            None,
        );
    }

    pub(crate) fn failed(&self, fingerprint: &Fingerprint, error: &CourierError) {
        self.publish(
            events::REQUEST_FAILED,
            LifecycleEventKind::Failed,
            fingerprint,
            Some(error.to_string()),
        );
    }

    fn publish(
        &self,
        name: &'static str,
        kind: LifecycleEventKind,
        fingerprint: &Fingerprint,
        error: Option<String>,
    ) {
        let event = LifecycleEvent {
            name,
            kind,
            fingerprint: fingerprint.clone(),
            error,
            published_at: chrono::Utc::now(),
        };
        // No subscribers is acceptable; events are published regardless of
        // whether anyone is listening.
        let _ = self.sender.send(event);
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
