//! # Main Dispatcher
//!
//! The single serial executor every user-visible callback runs on. Jobs are
//! boxed closures pushed onto an unbounded channel and drained strictly in
//! order by one consumer: by default a dedicated spawned task, optionally a
//! loop the host application pumps on its own UI thread.

use std::fmt;

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle for posting work onto the serial callback executor.
#[derive(Clone)]
pub struct MainDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl MainDispatcher {
    /// Dispatcher drained by a dedicated background task. The default.
    pub fn spawn() -> Self {
        let (dispatcher, mut queue) = Self::channel();
        tokio::spawn(async move {
            queue.run().await;
        });
        dispatcher
    }

    /// Dispatcher whose queue the host drains itself, for embedding the
    /// callback executor into an existing UI loop.
    pub fn channel() -> (Self, MainDispatcherQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, MainDispatcherQueue { rx })
    }

    /// Enqueue a job. Jobs run in post order; posting never blocks.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        // A dropped queue means shutdown; posted jobs are silently discarded.
        let _ = self.tx.send(Box::new(job));
    }
}

impl fmt::Debug for MainDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainDispatcher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Consumer half of a [`MainDispatcher::channel`] pair.
pub struct MainDispatcherQueue {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl MainDispatcherQueue {
    /// Drain jobs until every dispatcher handle is dropped.
    pub async fn run(&mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Run every job currently queued, without waiting for more. Returns how
    /// many ran. For host-pumped loops.
    pub fn drain_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}
