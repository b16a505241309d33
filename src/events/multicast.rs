//! Weak-reference multicast delegate.
//!
//! A set of weakly-held listeners with snapshot invocation: `invoke` iterates
//! a snapshot taken under the lock, so listeners may add or remove entries
//! mid-pass without affecting the pass in flight. Dead references are
//! collected whenever the set is walked.

use std::sync::{Arc, Mutex, Weak};

/// Fan-out holder for `Weak<L>` listeners.
pub struct Multicast<L: ?Sized> {
    listeners: Mutex<Vec<Weak<L>>>,
}

impl<L: ?Sized> Default for Multicast<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> Multicast<L> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener. Only a weak reference is kept.
    pub fn add(&self, listener: &Arc<L>) {
        self.listeners.lock().unwrap().push(Arc::downgrade(listener));
    }

    /// Remove a previously registered listener (pointer identity).
    pub fn remove(&self, listener: &Arc<L>) {
        let target = Arc::downgrade(listener);
        self.listeners
            .lock()
            .unwrap()
            .retain(|candidate| !Weak::ptr_eq(candidate, &target));
    }

    /// Invoke `f` on every live listener, pruning dead ones.
    pub fn invoke(&self, f: impl Fn(&L)) {
        let snapshot: Vec<Arc<L>> = {
            let mut listeners = self.listeners.lock().unwrap();
            listeners.retain(|weak| weak.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in snapshot {
            f(&listener);
        }
    }

    /// Append every listener registered on `other`.
    pub fn merge_from(&self, other: &Multicast<L>) {
        let incoming: Vec<Weak<L>> = other
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .cloned()
            .collect();
        self.listeners.lock().unwrap().extend(incoming);
    }

    /// Whether any live listener remains.
    pub fn is_empty(&self) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|weak| weak.strong_count() > 0);
        listeners.is_empty()
    }
}
