//! # Named Queues
//!
//! One concurrency-bounded runner per queue definition. All queue state is
//! confined to the runner's message loop: enqueueing, coalescing, priority
//! updates, and completion bookkeeping arrive as messages and are handled
//! strictly serially. Admission is priority-preemptive; once admitted, an
//! operation runs to completion.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::constants::DEFAULT_QUEUE_NAME;
use crate::fingerprint::Fingerprint;
use crate::scheduling::priority::{PendingQueue, Priority};
use crate::scheduling::task::{ScheduledTask, TaskOp};

/// Concurrency policy of a queue definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// The configured process-wide default.
    Default,
    /// One operation at a time.
    Serial,
    /// No admission bound.
    Unlimited,
    /// At most `n` concurrent operations.
    Limit(usize),
}

/// Identity of a named queue. Used as a map key by the queue manager; two
/// definitions with equal fields share one runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueDef {
    pub name: String,
    /// Quality-of-service ordinal, carried for diagnostics and ordering
    /// between queues.
    pub qos: i8,
    pub concurrency: Concurrency,
}

impl QueueDef {
    pub fn new(name: impl Into<String>, concurrency: Concurrency) -> Self {
        Self {
            name: name.into(),
            qos: 0,
            concurrency,
        }
    }

    /// The queue descriptors run on unless they declare their own.
    pub fn network_default() -> Self {
        Self::new(DEFAULT_QUEUE_NAME, Concurrency::Default)
    }

    pub fn serial(name: impl Into<String>) -> Self {
        Self::new(name, Concurrency::Serial)
    }

    pub fn limited(name: impl Into<String>, limit: usize) -> Self {
        Self::new(name, Concurrency::Limit(limit))
    }

    /// Effective admission cap.
    pub(crate) fn cap(&self, default_concurrency: usize) -> usize {
        match self.concurrency {
            Concurrency::Default => default_concurrency.max(1),
            Concurrency::Serial => 1,
            Concurrency::Unlimited => usize::MAX,
            Concurrency::Limit(n) => n.max(1),
        }
    }
}

/// Diagnostic view of one named queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: String,
    pub pending: usize,
    pub in_flight: usize,
    pub cap: usize,
}

pub(crate) enum QueueMsg {
    Enqueue(Arc<dyn ScheduledTask>),
    SetPriority(Fingerprint, Priority),
    Snapshot(oneshot::Sender<QueueSnapshot>),
}

/// Handle to one queue runner.
#[derive(Clone)]
pub(crate) struct NamedQueue {
    tx: mpsc::UnboundedSender<QueueMsg>,
}

impl NamedQueue {
    /// Spawn the runner for `def`.
    pub fn spawn(def: QueueDef, default_concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cap = def.cap(default_concurrency);
        tokio::spawn(run(def, cap, rx));
        Self { tx }
    }

    pub fn enqueue(&self, task: Arc<dyn ScheduledTask>) {
        let _ = self.tx.send(QueueMsg::Enqueue(task));
    }

    pub fn set_priority(&self, id: Fingerprint, priority: Priority) {
        let _ = self.tx.send(QueueMsg::SetPriority(id, priority));
    }

    pub async fn snapshot(&self) -> Option<QueueSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(QueueMsg::Snapshot(tx)).ok()?;
        rx.await.ok()
    }
}

struct QueueState {
    def: QueueDef,
    cap: usize,
    in_flight: usize,
    pending: PendingQueue<Arc<TaskOp>>,
    live: Vec<Weak<TaskOp>>,
    completions: mpsc::UnboundedSender<Fingerprint>,
}

async fn run(def: QueueDef, cap: usize, mut messages: mpsc::UnboundedReceiver<QueueMsg>) {
    let (completions_tx, mut completions_rx) = mpsc::unbounded_channel();
    let mut state = QueueState {
        def,
        cap,
        in_flight: 0,
        pending: PendingQueue::new(),
        live: Vec::new(),
        completions: completions_tx,
    };

    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Some(QueueMsg::Enqueue(task)) => state.handle_enqueue(task),
                Some(QueueMsg::SetPriority(id, priority)) => state.handle_set_priority(&id, priority),
                Some(QueueMsg::Snapshot(reply)) => {
                    let _ = reply.send(state.snapshot());
                }
                // Every handle dropped: drain remaining completions and stop.
                None => break,
            },
            completed = completions_rx.recv() => {
                if let Some(id) = completed {
                    state.handle_completion(&id);
                }
            }
        }
    }
}

impl QueueState {
    /// Serialized enqueue: coalescing first, then admission or parking.
    fn handle_enqueue(&mut self, task: Arc<dyn ScheduledTask>) {
        if task.merge_allowed() {
            if let Some(existing) = self.find_live(task.id()) {
                match existing.task().merge_from(task.as_ref()) {
                    Ok(()) => {
                        let promoted = existing.task().priority().promoted();
                        existing.task().set_priority(promoted);
                        self.pending.update_priority(task.id(), promoted);
                        debug!(
                            queue = %self.def.name,
                            fingerprint = %task.id(),
                            priority = %promoted,
                            "coalesced into in-flight task"
                        );
                        return;
                    }
                    Err(error) => {
                        warn!(
                            queue = %self.def.name,
                            fingerprint = %task.id(),
                            %error,
                            "coalescing failed, admitting task separately"
                        );
                    }
                }
            }
        }
        self.admit(task);
    }

    fn admit(&mut self, task: Arc<dyn ScheduledTask>) {
        let op = TaskOp::new(task);
        self.prune_live();
        self.live.push(Arc::downgrade(&op));

        if self.in_flight < self.cap && op.start(self.completions.clone()) {
            self.in_flight += 1;
        } else {
            let (id, priority) = (op.id().clone(), op.task().priority());
            self.pending.enqueue(id, priority, op);
        }
    }

    fn handle_completion(&mut self, _id: &Fingerprint) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.prune_live();
        while self.in_flight < self.cap {
            let Some(op) = self.pending.dequeue() else {
                break;
            };
            // Cancelled ops refuse to start; skip them without burning a slot.
            if op.start(self.completions.clone()) {
                self.in_flight += 1;
            }
        }
    }

    fn handle_set_priority(&mut self, id: &Fingerprint, priority: Priority) {
        if let Some(op) = self.find_live(id) {
            op.task().set_priority(priority);
        }
        // If the op is parked, re-rank it; a running op keeps its slot and the
        // new priority only matters for future tie-breaks.
        self.pending.update_priority(id, priority);
    }

    /// First live (non-terminal) op with the given fingerprint, in admission
    /// order.
    fn find_live(&self, id: &Fingerprint) -> Option<Arc<TaskOp>> {
        self.live
            .iter()
            .filter_map(Weak::upgrade)
            .find(|op| !op.state().is_terminal() && op.id() == id)
    }

    fn prune_live(&mut self) {
        self.live
            .retain(|op| op.upgrade().is_some_and(|op| !op.state().is_terminal()));
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue: self.def.name.clone(),
            pending: self.pending.len(),
            in_flight: self.in_flight,
            cap: self.cap,
        }
    }
}
