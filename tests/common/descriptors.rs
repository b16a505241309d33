//! Configurable test descriptors.

use courier_core::http::decoder;
use courier_core::{
    CachePolicy, Fingerprint, MergePolicy, Method, QueueDef, Requestable, Result, UrlPath,
};

/// Fingerprint the manager will compute for a [`TestDescriptor`] invocation,
/// for pre-seeding the cache.
pub fn fingerprint_of(descriptor: &TestDescriptor) -> Fingerprint {
    let url = format!("https://api.test/ping/{}", descriptor.name);
    Fingerprint::compute(Method::Get, &url, &())
}

/// One-knob-per-behavior descriptor: each test builds exactly the shape it
/// needs. The `name` keeps fingerprints distinct between tests.
pub struct TestDescriptor {
    pub name: String,
    pub policy: Option<CachePolicy>,
    pub merge: MergePolicy,
    pub queue: QueueDef,
    pub stale_ok: bool,
}

impl TestDescriptor {
    /// Uncached, always-merge descriptor.
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            policy: None,
            merge: MergePolicy::Always,
            queue: QueueDef::network_default(),
            stale_ok: true,
        }
    }

    /// Cacheable with a timed policy.
    pub fn cacheable(name: &str, seconds: u64) -> Self {
        Self {
            policy: Some(CachePolicy::timed(seconds).expect("non-zero ttl")),
            ..Self::plain(name)
        }
    }

    /// Cacheable, but entries expire the moment they are written.
    pub fn expiring_immediately(name: &str) -> Self {
        Self {
            policy: Some(CachePolicy::ExpireImmediately),
            ..Self::plain(name)
        }
    }

    pub fn never_merging(name: &str) -> Self {
        Self {
            merge: MergePolicy::Never,
            ..Self::plain(name)
        }
    }

    pub fn on_queue(mut self, queue: QueueDef) -> Self {
        self.queue = queue;
        self
    }

    pub fn rejecting_stale(mut self) -> Self {
        self.stale_ok = false;
        self
    }
}

impl Requestable for TestDescriptor {
    type Params = ();
    type Response = serde_json::Value;

    fn method(&self) -> Method {
        Method::Get
    }

    fn host(&self) -> String {
        "api.test".into()
    }

    fn path(&self, _params: &Self::Params) -> Option<UrlPath> {
        Some(UrlPath::new() / "ping" / self.name.as_str())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Self::Response> {
        decoder::decode_json(bytes)
    }

    fn queue(&self) -> QueueDef {
        self.queue.clone()
    }

    fn merge_policy(&self) -> MergePolicy {
        self.merge.clone()
    }

    fn cache_policy(&self) -> Option<CachePolicy> {
        self.policy
    }

    fn return_cached_data_if_expired(&self) -> bool {
        self.stale_ok
    }
}
