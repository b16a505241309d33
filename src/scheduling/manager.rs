//! Queue manager: demultiplexes tasks to their declared queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::scheduling::priority::Priority;
use crate::scheduling::queue::{NamedQueue, QueueDef, QueueSnapshot};
use crate::scheduling::task::ScheduledTask;

/// Routes tasks to named queues, creating each runner on first use.
///
/// The process-wide lock covers only the queue-map itself; everything else
/// happens inside the per-queue runners.
#[derive(Clone)]
pub struct QueueManager {
    queues: Arc<Mutex<HashMap<QueueDef, NamedQueue>>>,
    default_concurrency: usize,
}

impl QueueManager {
    pub(crate) fn new(default_concurrency: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            default_concurrency,
        }
    }

    /// Hand a task to the runner of its declared queue.
    pub(crate) fn enqueue(&self, task: Arc<dyn ScheduledTask>) {
        let queue = self.queue_for(task.queue());
        queue.enqueue(task);
    }

    /// Propagate a priority change to every queue. Fingerprints are unique
    /// across queues, so at most one runner will match.
    pub(crate) fn set_priority(&self, id: &Fingerprint, priority: Priority) {
        let queues: Vec<NamedQueue> = self.queues.lock().unwrap().values().cloned().collect();
        for queue in queues {
            queue.set_priority(id.clone(), priority);
        }
    }

    /// Diagnostic snapshots of every live queue.
    pub async fn snapshots(&self) -> Vec<QueueSnapshot> {
        let queues: Vec<NamedQueue> = self.queues.lock().unwrap().values().cloned().collect();
        let mut snapshots = Vec::with_capacity(queues.len());
        for queue in queues {
            if let Some(snapshot) = queue.snapshot().await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    fn queue_for(&self, def: &QueueDef) -> NamedQueue {
        let mut queues = self.queues.lock().unwrap();
        if let Some(queue) = queues.get(def) {
            return queue.clone();
        }
        debug!(queue = %def.name, "creating named queue");
        let queue = NamedQueue::spawn(def.clone(), self.default_concurrency);
        queues.insert(def.clone(), queue.clone());
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::scheduling::queue::Concurrency;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::oneshot;

    struct PingTask {
        id: Fingerprint,
        queue: QueueDef,
        priority: AtomicI64,
        done: Mutex<Option<oneshot::Sender<()>>>,
        hold: std::time::Duration,
    }

    impl PingTask {
        fn new(url: &str, queue: QueueDef, hold: std::time::Duration) -> (Arc<Self>, oneshot::Receiver<()>) {
            let (done_tx, done_rx) = oneshot::channel();
            let task = Arc::new(Self {
                id: Fingerprint::compute(Method::Get, url, &()),
                queue,
                priority: AtomicI64::new(Priority::NORMAL.ordinal()),
                done: Mutex::new(Some(done_tx)),
                hold,
            });
            (task, done_rx)
        }
    }

    #[async_trait]
    impl ScheduledTask for PingTask {
        fn id(&self) -> &Fingerprint {
            &self.id
        }

        fn queue(&self) -> &QueueDef {
            &self.queue
        }

        fn priority(&self) -> Priority {
            Priority::from_ordinal(self.priority.load(Ordering::SeqCst))
        }

        fn set_priority(&self, priority: Priority) {
            self.priority.store(priority.ordinal(), Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        async fn process(&self) {
            tokio::time::sleep(self.hold).await;
            if let Some(done) = self.done.lock().unwrap().take() {
                let _ = done.send(());
            }
        }
    }

    #[tokio::test]
    async fn routes_to_declared_queue_and_creates_it_on_first_use() {
        let manager = QueueManager::new(4);
        let (task, done) = PingTask::new(
            "https://t/route",
            QueueDef::new("custom.queue", Concurrency::Limit(2)),
            std::time::Duration::ZERO,
        );

        manager.enqueue(task);
        done.await.unwrap();

        let snapshots = manager.snapshots().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].queue, "custom.queue");
        assert_eq!(snapshots[0].cap, 2);
    }

    #[tokio::test]
    async fn priority_broadcast_reaches_a_running_task() {
        let manager = QueueManager::new(4);
        let (task, done) = PingTask::new(
            "https://t/prio",
            QueueDef::network_default(),
            std::time::Duration::from_millis(300),
        );
        let id = task.id().clone();
        let handle = task.clone();

        manager.enqueue(task);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        manager.set_priority(&id, Priority::VERY_LOW);

        // The broadcast is asynchronous; the runner applies it to the task
        // while it is still holding its slot.
        tokio::time::timeout(std::time::Duration::from_millis(200), async {
            loop {
                if handle.priority() == Priority::VERY_LOW {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        done.await.unwrap();
    }
}
