//! Scheduler-facing task abstraction and the operation state machine.

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{CourierError, Result};
use crate::fingerprint::Fingerprint;
use crate::scheduling::queue::QueueDef;
use crate::scheduling::priority::Priority;

/// Unit of work the queues schedule.
///
/// The scheduler needs identity, queue routing, a mutable priority, merge
/// hooks, and the two-phase async lifecycle; everything else is the task's
/// business. The network task is the one production implementation.
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    /// Fingerprint identity, unique across queues.
    fn id(&self) -> &Fingerprint;

    /// Queue this task wants to run on.
    fn queue(&self) -> &QueueDef;

    fn priority(&self) -> Priority;

    fn set_priority(&self, priority: Priority);

    /// Whether this task's merge policy allowed coalescing. Evaluated once,
    /// at enqueue time.
    fn merge_allowed(&self) -> bool {
        false
    }

    /// Absorb `other`'s callbacks and listeners into this task.
    ///
    /// Must not suspend. Implementations reject incompatible concrete types
    /// with [`CourierError::MergeIncompatible`]; the rejected task is then
    /// admitted as its own operation.
    fn merge_from(&self, _other: &dyn ScheduledTask) -> Result<()> {
        Err(CourierError::merge_incompatible("task does not coalesce"))
    }

    /// Concrete-type access for merge compatibility checks.
    fn as_any(&self) -> &dyn Any;

    /// Pre-flight hook, awaited before [`Self::process`].
    async fn pre_process(&self) {}

    /// Execute the task to completion.
    async fn process(&self);
}

/// Lifecycle states of a scheduled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Parked or not yet started.
    Pending,
    /// `start()` was called; the task is processing.
    Running,
    /// Ran to completion.
    Finished,
    /// Terminally cancelled.
    Cancelled,
}

impl TaskState {
    /// No further transitions allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

const STATE_PENDING: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_FINISHED: u8 = 2;
const STATE_CANCELLED: u8 = 3;

/// A task wrapped as an asynchronous operation with observable state.
///
/// `is_executing` and `is_finished` are mutually exclusive, both false while
/// pending. Transitions are atomic; `start()` is reserved for the named
/// queue that owns the operation.
pub struct TaskOp {
    task: Arc<dyn ScheduledTask>,
    state: AtomicU8,
}

impl TaskOp {
    pub(crate) fn new(task: Arc<dyn ScheduledTask>) -> Arc<Self> {
        Arc::new(Self {
            task,
            state: AtomicU8::new(STATE_PENDING),
        })
    }

    pub fn task(&self) -> &Arc<dyn ScheduledTask> {
        &self.task
    }

    pub fn id(&self) -> &Fingerprint {
        self.task.id()
    }

    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::SeqCst) {
            STATE_PENDING => TaskState::Pending,
            STATE_RUNNING => TaskState::Running,
            STATE_FINISHED => TaskState::Finished,
            _ => TaskState::Cancelled,
        }
    }

    pub fn is_executing(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    /// Begin execution. Returns false if the op already left `Pending`.
    ///
    /// The spawned future runs `pre_process` then `process`, marks the op
    /// finished, and reports completion so the owning queue can refill its
    /// concurrency slot.
    pub(crate) fn start(
        self: &Arc<Self>,
        completions: mpsc::UnboundedSender<Fingerprint>,
    ) -> bool {
        if self
            .state
            .compare_exchange(
                STATE_PENDING,
                STATE_RUNNING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return false;
        }

        let op = self.clone();
        tokio::spawn(async move {
            op.task.pre_process().await;
            op.task.process().await;
            // A concurrent cancel is terminal; do not overwrite it.
            let _ = op.state.compare_exchange(
                STATE_RUNNING,
                STATE_FINISHED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            // The slot must be refilled regardless of the final state.
            let _ = completions.send(op.task.id().clone());
        });
        true
    }

    /// Mark the op cancelled. In-flight work is never preempted; the state
    /// becomes terminal and coalescing stops considering the op.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_PENDING,
                STATE_CANCELLED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .or_else(|_| {
                self.state.compare_exchange(
                    STATE_RUNNING,
                    STATE_CANCELLED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
            })
            .is_ok()
    }
}
