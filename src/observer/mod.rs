//! # Observer Registry
//!
//! Fingerprint-keyed observers receiving raw cached bytes whenever the cache
//! entry under that fingerprint changes. The registry is an actor: every
//! mutation and every delivery runs on its single message loop, fed by a
//! bridge from the cache's change events. Callbacks themselves are posted to
//! the main dispatcher.
//!
//! Observer lifecycle: created by `add_observer`, removed when its token is
//! cancelled, its weak target dies (detected lazily on the next delivery), or
//! the cache is globally cleared. A cancelled token's callback never fires
//! after `cancel()` returns: delivery is gated on the token's flag, not on
//! the map state, so the asynchronous map update can lag safely.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheEvent, TieredCache};
use crate::dispatch::MainDispatcher;
use crate::fingerprint::Fingerprint;
use crate::scheduling::{Priority, QueueManager};

type ObserverCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;
type WeakTarget = Weak<dyn Any + Send + Sync>;

/// Cancellation handle for one registered observer.
///
/// Carries just enough identity to revoke its own entry. Dropping the token
/// does not cancel; call [`ObserverToken::cancel`] or let the target
/// deallocate.
#[derive(Clone)]
pub struct ObserverToken {
    fingerprint: Fingerprint,
    cancel_id: Uuid,
    cancelled: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<RegistryMsg>,
}

impl ObserverToken {
    /// Fingerprint this token observes.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Shared cancellation flag, for gating deliveries made outside the
    /// registry (the synchronous cached-value path).
    pub(crate) fn cancelled_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Revoke the observer. Effective immediately: once this returns, the
    /// callback will not be invoked again, even if the registry has not yet
    /// drained the removal. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(RegistryMsg::Cancel {
                fingerprint: self.fingerprint.clone(),
                cancel_id: self.cancel_id,
            });
        }
    }
}

impl std::fmt::Debug for ObserverToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverToken")
            .field("fingerprint", &self.fingerprint)
            .field("cancel_id", &self.cancel_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct ObserverEntry {
    target: WeakTarget,
    callback: ObserverCallback,
    cancel_id: Uuid,
    cancelled: Arc<AtomicBool>,
}

enum RegistryMsg {
    Add {
        fingerprint: Fingerprint,
        entry: ObserverEntry,
    },
    Cancel {
        fingerprint: Fingerprint,
        cancel_id: Uuid,
    },
    Deliver(Fingerprint),
    Clear,
}

/// Handle to the observer registry actor.
#[derive(Clone)]
pub struct ObserverRegistry {
    commands: mpsc::UnboundedSender<RegistryMsg>,
}

impl ObserverRegistry {
    /// Spawn the registry loop and the cache-event bridge feeding it.
    pub(crate) fn spawn(
        cache: TieredCache,
        queues: QueueManager,
        main: MainDispatcher,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();

        // Bridge: cache change events become serialized registry messages, so
        // all deliveries for one write are dispatched before the next write's.
        let mut cache_events = cache.subscribe();
        let bridge = commands.clone();
        tokio::spawn(async move {
            loop {
                let event = match cache_events.recv().await {
                    Ok(event) => event,
                    // Lagging loses events but must not kill the bridge.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "observer bridge lagged behind cache events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let forwarded = match event {
                    CacheEvent::Added(fingerprint) => {
                        bridge.send(RegistryMsg::Deliver(fingerprint))
                    }
                    CacheEvent::RemovedAll => bridge.send(RegistryMsg::Clear),
                    CacheEvent::Removed(_) | CacheEvent::RemovedExpired => Ok(()),
                };
                if forwarded.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(run(rx, cache, queues, main));
        Self { commands }
    }

    /// Register an observer for `fingerprint`. The callback receives the raw
    /// cached bytes on the main dispatcher. A target that has already been
    /// deallocated is skipped (the returned token is born cancelled).
    pub(crate) fn add_observer<T: Send + Sync + 'static>(
        &self,
        fingerprint: Fingerprint,
        target: Weak<T>,
        callback: impl Fn(Vec<u8>) + Send + Sync + 'static,
    ) -> ObserverToken {
        let cancelled = Arc::new(AtomicBool::new(false));
        let token = ObserverToken {
            fingerprint: fingerprint.clone(),
            cancel_id: Uuid::new_v4(),
            cancelled: cancelled.clone(),
            commands: self.commands.clone(),
        };

        match target.upgrade() {
            Some(strong) => {
                let erased: Arc<dyn Any + Send + Sync> = strong;
                let entry = ObserverEntry {
                    target: Arc::downgrade(&erased),
                    callback: Arc::new(callback),
                    cancel_id: token.cancel_id,
                    cancelled,
                };
                let _ = self.commands.send(RegistryMsg::Add { fingerprint, entry });
            }
            None => {
                debug!(fingerprint = %fingerprint, "observer target already deallocated, skipping");
                cancelled.store(true, Ordering::SeqCst);
            }
        }
        token
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<RegistryMsg>,
    cache: TieredCache,
    queues: QueueManager,
    main: MainDispatcher,
) {
    let mut observers: HashMap<Fingerprint, Vec<ObserverEntry>> = HashMap::new();

    while let Some(message) = rx.recv().await {
        match message {
            RegistryMsg::Add { fingerprint, entry } => {
                observers.entry(fingerprint).or_default().push(entry);
            }
            RegistryMsg::Cancel {
                fingerprint,
                cancel_id,
            } => {
                if let Some(list) = observers.get_mut(&fingerprint) {
                    list.retain(|entry| entry.cancel_id != cancel_id);
                    if list.is_empty() {
                        observers.remove(&fingerprint);
                        demote(&queues, &fingerprint);
                    }
                }
            }
            RegistryMsg::Deliver(fingerprint) => {
                deliver(&mut observers, &fingerprint, &cache, &queues, &main).await;
            }
            RegistryMsg::Clear => observers.clear(),
        }
    }
}

/// Deliver one cache write to every live observer of `fingerprint`, in
/// registration order, pruning dead and cancelled entries first.
async fn deliver(
    observers: &mut HashMap<Fingerprint, Vec<ObserverEntry>>,
    fingerprint: &Fingerprint,
    cache: &TieredCache,
    queues: &QueueManager,
    main: &MainDispatcher,
) {
    let Some(list) = observers.get_mut(fingerprint) else {
        return;
    };
    list.retain(|entry| {
        entry.target.strong_count() > 0 && !entry.cancelled.load(Ordering::SeqCst)
    });
    if list.is_empty() {
        observers.remove(fingerprint);
        demote(queues, fingerprint);
        return;
    }

    let Some(bytes) = cache.get(fingerprint).await else {
        return;
    };
    for entry in list.iter() {
        let Some(target) = entry.target.upgrade() else {
            continue;
        };
        let callback = entry.callback.clone();
        let cancelled = entry.cancelled.clone();
        let bytes = bytes.clone();
        main.post(move || {
            // The upgraded target rides along so it stays alive through the
            // callback; the flag is re-checked at execution time.
            let _keep_alive = &target;
            if !cancelled.load(Ordering::SeqCst) {
                callback(bytes);
            }
        });
    }
}

/// Nobody is watching this fingerprint anymore: drop the matching task's
/// urgency. Best effort; the task may already be finished.
fn demote(queues: &QueueManager, fingerprint: &Fingerprint) {
    debug!(fingerprint = %fingerprint, "last observer gone, demoting task priority");
    queues.set_priority(fingerprint, Priority::VERY_LOW);
}
