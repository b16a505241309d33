//! # Courier Manager
//!
//! The public façade wiring every component together: cache, queue manager,
//! observer registry, transport, main dispatcher, and the lifecycle
//! publisher. Constructed once from a [`CourierConfig`] and cloned freely.
//! It is an explicit handle, not a process-wide singleton, so tests can run any
//! number of isolated managers with stub transports.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::{CacheStatsSnapshot, TieredCache};
use crate::config::CourierConfig;
use crate::dispatch::MainDispatcher;
use crate::error::{CourierError, Result};
use crate::events::{LifecycleEvent, LifecyclePublisher, RequestLifecycle};
use crate::fingerprint::Fingerprint;
use crate::http::descriptor::{compose_base_url, Requestable};
use crate::http::transport::{HttpTransport, Transport};
use crate::http::NetworkTask;
use crate::observer::{ObserverRegistry, ObserverToken};
use crate::scheduling::{QueueManager, QueueSnapshot};

/// Handle to one courier core instance.
#[derive(Clone)]
pub struct CourierManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: CourierConfig,
    cache: TieredCache,
    queues: QueueManager,
    registry: ObserverRegistry,
    transport: Arc<dyn Transport>,
    main: MainDispatcher,
    publisher: LifecyclePublisher,
}

/// Builder for a [`CourierManager`], for injecting a transport or an
/// externally pumped main dispatcher.
pub struct CourierManagerBuilder {
    config: CourierConfig,
    transport: Option<Arc<dyn Transport>>,
    main: Option<MainDispatcher>,
}

impl CourierManagerBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn main_dispatcher(mut self, main: MainDispatcher) -> Self {
        self.main = Some(main);
        self
    }

    /// Validate the configuration and wire the components. Must run inside a
    /// tokio runtime: the cache-event bridge, registry, and dispatcher loops
    /// are spawned here.
    pub fn build(self) -> Result<CourierManager> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.request_timeout)?),
        };
        let main = self.main.unwrap_or_else(MainDispatcher::spawn);
        let cache = TieredCache::new(&self.config);
        let queues = QueueManager::new(self.config.effective_default_concurrency());
        let registry = ObserverRegistry::spawn(cache.clone(), queues.clone(), main.clone());

        info!(
            memory_count_limit = self.config.memory_count_limit,
            disk_byte_limit = self.config.disk_byte_limit,
            "courier manager initialized"
        );

        Ok(CourierManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                cache,
                queues,
                registry,
                transport,
                main,
                publisher: LifecyclePublisher::default(),
            }),
        })
    }
}

impl CourierManager {
    /// Manager with the production transport and a spawned main dispatcher.
    pub fn new(config: CourierConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: CourierConfig) -> CourierManagerBuilder {
        CourierManagerBuilder {
            config,
            transport: None,
            main: None,
        }
    }

    /// Issue a request, delivering the outcome through `on_result` on the
    /// main dispatcher.
    ///
    /// Cache-first: when the descriptor is cacheable, `force` is false, and a
    /// fresh decodable entry exists, the cached value is delivered without
    /// touching the network. Otherwise a network task is enqueued, and
    /// coalesced into an identical in-flight one when policy allows.
    pub async fn request_with<D: Requestable>(
        &self,
        descriptor: D,
        params: D::Params,
        delegate: Option<Arc<dyn RequestLifecycle>>,
        force: bool,
        on_result: impl FnOnce(Result<Arc<D::Response>>) + Send + 'static,
    ) {
        let (id, url) = match self.prepare(&descriptor, &params) {
            Ok(prepared) => prepared,
            Err(error) => {
                self.inner.main.post(move || on_result(Err(error)));
                return;
            }
        };

        if descriptor.cache_policy().is_some() && !force {
            if let Some(value) = self.preflight(&descriptor, &id).await {
                debug!(fingerprint = %id, "request served from cache");
                self.inner.main.post(move || on_result(Ok(value)));
                return;
            }
        }

        let task = self.build_task(Arc::new(descriptor), params, id, url);
        task.push_result_callback(Box::new(on_result));
        if let Some(delegate) = delegate {
            task.add_listener(&delegate);
        }
        self.inner.queues.enqueue(Arc::new(task));
    }

    /// Issue a request and await its outcome.
    ///
    /// The awaiting caller is an observer of the shared task, not its owner:
    /// dropping this future does not cancel the underlying network task, and
    /// coalesced peers are unaffected.
    pub async fn request<D: Requestable>(
        &self,
        descriptor: D,
        params: D::Params,
    ) -> Result<Arc<D::Response>> {
        let (tx, rx) = oneshot::channel();
        self.request_with(descriptor, params, None, false, move |result| {
            let _ = tx.send(result);
        })
        .await;
        rx.await.map_err(|_| CourierError::NoResponse)?
    }

    /// Observe the cache entry of `(descriptor, params)`: `on_change` fires
    /// on the main dispatcher with the decoded value every time the entry is
    /// written, until the token is cancelled or `target` is deallocated.
    ///
    /// Passing the slot of a still-live token for the same fingerprint is a
    /// no-op (duplicate-observer suppression); a token for anything else is
    /// cancelled and replaced. If the current entry is expired (including
    /// by the shorter-policy rule) a refresh is enqueued; the stale value
    /// is still delivered immediately unless the descriptor opts out.
    pub async fn observe<D, T>(
        &self,
        target: &Arc<T>,
        descriptor: D,
        params: D::Params,
        token: &mut Option<ObserverToken>,
        on_change: impl Fn(Arc<D::Response>) + Send + Sync + 'static,
    ) where
        D: Requestable,
        T: Send + Sync + 'static,
    {
        let Some(policy) = descriptor.cache_policy() else {
            warn!("observe called on a descriptor without a cache policy; nothing to observe");
            return;
        };
        let (id, url) = match self.prepare(&descriptor, &params) {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!(%error, "observe could not compose request URL");
                return;
            }
        };

        // Duplicate-observer suppression: a live token for the same
        // fingerprint stays as it is.
        if let Some(existing) = token {
            if !existing.is_cancelled() && existing.fingerprint() == &id {
                return;
            }
        }
        if let Some(previous) = token.take() {
            previous.cancel();
        }

        let descriptor = Arc::new(descriptor);
        let on_change: Arc<dyn Fn(Arc<D::Response>) + Send + Sync> = Arc::new(on_change);
        let registered = {
            let descriptor = descriptor.clone();
            let on_change = on_change.clone();
            let cache = self.inner.cache.clone();
            let id = id.clone();
            self.inner.registry.add_observer(
                id.clone(),
                Arc::downgrade(target),
                move |bytes| match descriptor.decode(&bytes) {
                    Ok(value) => on_change(Arc::new(value)),
                    Err(error) => {
                        let failure = CourierError::cache_decode(error.to_string());
                        warn!(fingerprint = %id, %failure, "dropping undecodable entry");
                        let cache = cache.clone();
                        let id = id.clone();
                        tokio::spawn(async move { cache.remove(&id).await });
                    }
                },
            )
        };

        let now = SystemTime::now();
        let entry = self.inner.cache.entry(&id).await;
        let mut expired = match &entry {
            None => true,
            Some(entry) => entry.is_expired(now) || policy.shortens(entry.expiry, now),
        };

        if let Some(entry) = &entry {
            if !expired || descriptor.return_cached_data_if_expired() {
                match descriptor.decode(&entry.bytes) {
                    Ok(value) => {
                        let value = Arc::new(value);
                        let flag = registered.cancelled_flag();
                        let on_change = on_change.clone();
                        self.inner.main.post(move || {
                            if !flag.load(Ordering::SeqCst) {
                                on_change(value);
                            }
                        });
                    }
                    Err(error) => {
                        // Stale bytes that no longer decode: drop the entry,
                        // force the refresh, surface nothing.
                        let failure = CourierError::cache_decode(error.to_string());
                        warn!(fingerprint = %id, %failure, "forcing refresh");
                        self.inner.cache.remove(&id).await;
                        expired = true;
                    }
                }
            }
        }

        *token = Some(registered);

        if expired {
            // The refresh carries no direct callbacks: the observer hears
            // about the new value through the cache-change path.
            let task = self.build_task(descriptor, params, id, url);
            self.inner.queues.enqueue(Arc::new(task));
        }
    }

    /// The shared cache.
    pub fn cache(&self) -> &TieredCache {
        &self.inner.cache
    }

    /// Drop every cached entry and, through the registry, every observer.
    pub async fn clear_cache(&self) {
        self.inner.cache.remove_all().await;
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.inner.cache.stats()
    }

    /// Diagnostic snapshots of every named queue created so far.
    pub async fn queue_snapshots(&self) -> Vec<QueueSnapshot> {
        self.inner.queues.snapshots().await
    }

    /// Subscribe to request lifecycle events.
    pub fn subscribe_lifecycle(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent> {
        self.inner.publisher.subscribe()
    }

    fn prepare<D: Requestable>(
        &self,
        descriptor: &D,
        params: &D::Params,
    ) -> Result<(Fingerprint, reqwest::Url)> {
        let url = compose_base_url(descriptor, params)?;
        let id = Fingerprint::compute(descriptor.method(), url.as_str(), params);
        Ok((id, url))
    }

    /// Cache preflight for `request`: a fresh, decodable entry or nothing.
    /// Undecodable entries are removed so the network refresh re-fills them.
    async fn preflight<D: Requestable>(
        &self,
        descriptor: &D,
        id: &Fingerprint,
    ) -> Option<Arc<D::Response>> {
        let entry = self.inner.cache.entry(id).await?;
        if entry.is_expired(SystemTime::now()) {
            return None;
        }
        match descriptor.decode(&entry.bytes) {
            Ok(value) => Some(Arc::new(value)),
            Err(error) => {
                let failure = CourierError::cache_decode(error.to_string());
                warn!(fingerprint = %id, %failure, "dropping entry, refetching");
                self.inner.cache.remove(id).await;
                None
            }
        }
    }

    fn build_task<D: Requestable>(
        &self,
        descriptor: Arc<D>,
        params: D::Params,
        id: Fingerprint,
        url: reqwest::Url,
    ) -> NetworkTask<D> {
        NetworkTask::new(
            descriptor,
            params,
            id,
            url,
            self.inner.cache.clone(),
            self.inner.transport.clone(),
            self.inner.main.clone(),
            self.inner.publisher.clone(),
            self.inner.config.request_timeout,
        )
    }
}

impl std::fmt::Debug for CourierManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierManager")
            .field("memory_count_limit", &self.inner.config.memory_count_limit)
            .field("request_timeout", &self.inner.config.request_timeout)
            .finish()
    }
}
