//! # Network Task
//!
//! One HTTP execution per fingerprint. A network task owns everything needed
//! to run its request (composed URL, parameters, transport handle, optional
//! cache policy) plus the callbacks and lifecycle listeners accumulated by
//! coalescing. Completion fans out on the main dispatcher: result callbacks,
//! then `request_completed`, then data callbacks, in that order.

use std::any::Any;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::TieredCache;
use crate::dispatch::MainDispatcher;
use crate::error::{CourierError, Result};
use crate::events::{LifecyclePublisher, Multicast, RequestLifecycle};
use crate::fingerprint::Fingerprint;
use crate::http::descriptor::{RequestParams, Requestable};
use crate::http::transport::{Transport, TransportRequest};
use crate::scheduling::{Priority, QueueDef, ScheduledTask};

/// Callback receiving the task outcome.
pub type ResultCallback<R> = Box<dyn FnOnce(Result<Arc<R>>) + Send + 'static>;

/// Callback receiving the decoded value on success only.
pub type DataCallback<R> = Box<dyn FnOnce(Arc<R>) + Send + 'static>;

struct Callbacks<R> {
    results: Vec<ResultCallback<R>>,
    data: Vec<DataCallback<R>>,
    /// Set once the task has fanned out; later merges are rejected.
    drained: bool,
}

impl<R> Default for Callbacks<R> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            data: Vec::new(),
            drained: false,
        }
    }
}

/// Concrete task executing one HTTP request for descriptor type `D`.
pub struct NetworkTask<D: Requestable> {
    descriptor: Arc<D>,
    params: D::Params,
    id: Fingerprint,
    base_url: reqwest::Url,
    queue: QueueDef,
    priority: AtomicI64,
    merge_allowed: bool,
    callbacks: Mutex<Callbacks<D::Response>>,
    listeners: Arc<Multicast<dyn RequestLifecycle>>,
    cache: TieredCache,
    transport: Arc<dyn Transport>,
    main: MainDispatcher,
    publisher: LifecyclePublisher,
    timeout: Duration,
}

impl<D: Requestable> NetworkTask<D> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        descriptor: Arc<D>,
        params: D::Params,
        id: Fingerprint,
        base_url: reqwest::Url,
        cache: TieredCache,
        transport: Arc<dyn Transport>,
        main: MainDispatcher,
        publisher: LifecyclePublisher,
        timeout: Duration,
    ) -> Self {
        // The merge policy is evaluated exactly once, here, at enqueue time.
        let merge_allowed = descriptor.merge_policy().allows();
        Self {
            queue: descriptor.queue(),
            merge_allowed,
            descriptor,
            params,
            id,
            base_url,
            priority: AtomicI64::new(Priority::NORMAL.ordinal()),
            callbacks: Mutex::new(Callbacks::default()),
            listeners: Arc::new(Multicast::new()),
            cache,
            transport,
            main,
            publisher,
            timeout,
        }
    }

    /// Attach a result callback. Called before enqueue and by merges.
    pub(crate) fn push_result_callback(&self, callback: ResultCallback<D::Response>) {
        self.callbacks.lock().unwrap().results.push(callback);
    }

    /// Attach a data callback.
    pub(crate) fn push_data_callback(&self, callback: DataCallback<D::Response>) {
        self.callbacks.lock().unwrap().data.push(callback);
    }

    /// Attach a lifecycle listener (held weakly).
    pub(crate) fn add_listener(&self, listener: &Arc<dyn RequestLifecycle>) {
        self.listeners.add(listener);
    }

    async fn execute(&self) -> Result<Arc<D::Response>> {
        let mut url = self.base_url.clone();
        if let Some(query) = self.params.as_query() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        let request = TransportRequest {
            method: self.descriptor.method(),
            url,
            headers: self.descriptor.headers(&self.params).unwrap_or_default(),
            body: self.params.as_body(),
            timeout: self.timeout,
        };

        let response = self.transport.execute(request).await?;
        if let Some(error) = self.descriptor.handle(&response) {
            return Err(error);
        }

        let value = self.descriptor.decode(&response.bytes)?;

        // Raw bytes, not the decoded object, go to the cache; consumers decode
        // at read time. A disk failure inside `put` is logged there and does
        // not fail the task.
        if let Some(policy) = self.descriptor.cache_policy() {
            self.cache
                .put(self.id.clone(), response.bytes, policy)
                .await;
        }

        Ok(Arc::new(value))
    }

    fn complete(&self, result: Result<Arc<D::Response>>) {
        let (results, data) = {
            let mut callbacks = self.callbacks.lock().unwrap();
            callbacks.drained = true;
            (
                std::mem::take(&mut callbacks.results),
                std::mem::take(&mut callbacks.data),
            )
        };
        let id = self.id.clone();
        let listeners = self.listeners.clone();

        match result {
            Ok(value) => {
                self.publisher.completed(&id);
                self.main.post(move || {
                    for callback in results {
                        callback(Ok(value.clone()));
                    }
                    listeners.invoke(|listener| listener.request_completed(&id));
                    for callback in data {
                        callback(value.clone());
                    }
                });
            }
            Err(error) => {
                self.publisher.failed(&id, &error);
                debug!(fingerprint = %id, %error, "network task failed");
                self.main.post(move || {
                    for callback in results {
                        callback(Err(error.clone()));
                    }
                    listeners.invoke(|listener| listener.request_failed(&id, &error));
                });
            }
        }
    }
}

#[async_trait]
impl<D: Requestable> ScheduledTask for NetworkTask<D> {
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

    fn merge_allowed(&self) -> bool {
        self.merge_allowed
    }

    /// Absorb `other`'s callbacks and listeners. Fails when the concrete
    /// descriptor types differ (equal fingerprints across descriptor types
    /// are possible in principle) or when this task already completed.
    fn merge_from(&self, other: &dyn ScheduledTask) -> Result<()> {
        let Some(other) = other.as_any().downcast_ref::<NetworkTask<D>>() else {
            return Err(CourierError::merge_incompatible(
                "descriptor types differ for equal fingerprints",
            ));
        };

        let mut ours = self.callbacks.lock().unwrap();
        if ours.drained {
            return Err(CourierError::merge_incompatible("task already completed"));
        }
        let mut theirs = other.callbacks.lock().unwrap();
        ours.results.append(&mut theirs.results);
        ours.data.append(&mut theirs.data);
        theirs.drained = true;
        drop(theirs);
        drop(ours);

        self.listeners.merge_from(&other.listeners);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn process(&self) {
        self.publisher.started(&self.id);
        let id = self.id.clone();
        let listeners = self.listeners.clone();
        self.main
            .post(move || listeners.invoke(|listener| listener.request_started(&id)));

        let result = self.execute().await;
        if let Err(error) = &result {
            if matches!(error, CourierError::InvalidUrl(_)) {
                warn!(fingerprint = %self.id, %error, "request URL composition failed");
            }
        }
        self.complete(result);
    }
}
