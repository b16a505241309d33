//! # Request Descriptors
//!
//! The declarative contract application code implements once per request
//! type: method, URL recipe, parameter type, response type, and optional
//! cache and coalescing behavior. The core consumes nothing else.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::CachePolicy;
use crate::error::{CourierError, Result};
use crate::http::transport::TransportResponse;
use crate::http::{Method, UrlPath};
use crate::scheduling::QueueDef;

/// Parameters of a request: hashable, JSON-serializable, and able to project
/// themselves onto the query string and the request body.
pub trait RequestParams: Serialize + Hash + Send + Sync + 'static {
    /// Query items to set on the composed URL.
    fn as_query(&self) -> Option<BTreeMap<String, String>> {
        None
    }

    /// Raw request body.
    fn as_body(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Parameter type for requests that carry none.
impl RequestParams for () {}

/// Whether a task may be coalesced with an identical in-flight peer.
/// Evaluated once, at enqueue time.
#[derive(Clone, Default)]
pub enum MergePolicy {
    #[default]
    Always,
    Never,
    Custom(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl MergePolicy {
    pub(crate) fn allows(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Custom(predicate) => predicate(),
        }
    }
}

impl fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A declarative request type.
///
/// Implementations are cheap value types describing *what* to fetch; the
/// manager decides *whether* (cache), *when* (queues), and *how many times*
/// (coalescing) to actually fetch it.
pub trait Requestable: Send + Sync + 'static {
    type Params: RequestParams;
    type Response: Send + Sync + 'static;

    fn method(&self) -> Method;

    fn scheme(&self) -> &str {
        "https"
    }

    fn host(&self) -> String;

    fn port(&self) -> Option<u16> {
        None
    }

    /// Path for the given parameters. `None` means the URL cannot be formed.
    fn path(&self, params: &Self::Params) -> Option<UrlPath>;

    /// Additional request headers.
    fn headers(&self, _params: &Self::Params) -> Option<BTreeMap<String, String>> {
        None
    }

    /// Inspect the raw response before decoding. Returning an error fails the
    /// task with exactly that error.
    fn handle(&self, _response: &TransportResponse) -> Option<CourierError> {
        None
    }

    /// Decode the response body. Most implementations delegate to
    /// [`crate::http::decoder::decode_json`]; responses in other formats
    /// decode however they see fit.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Response>;

    /// Queue this request type runs on.
    fn queue(&self) -> QueueDef {
        QueueDef::network_default()
    }

    fn merge_policy(&self) -> MergePolicy {
        MergePolicy::Always
    }

    /// Cacheable opt-in: return `Some` to cache responses under this policy.
    fn cache_policy(&self) -> Option<CachePolicy> {
        None
    }

    /// When an entry is expired, deliver the stale value to observers anyway
    /// while the refresh is in flight.
    fn return_cached_data_if_expired(&self) -> bool {
        true
    }
}

/// Compose the absolute base URL (no query) of a descriptor invocation.
///
/// Percent-encoding is applied segment by segment, so the composed string is
/// canonical, the same string the fingerprint digests.
pub(crate) fn compose_base_url<D: Requestable>(
    descriptor: &D,
    params: &D::Params,
) -> Result<reqwest::Url> {
    let path = descriptor
        .path(params)
        .ok_or_else(|| CourierError::invalid_url("descriptor produced no path"))?;

    let origin = format!("{}://{}", descriptor.scheme(), descriptor.host());
    let mut url = reqwest::Url::parse(&origin)
        .map_err(|e| CourierError::invalid_url(format!("{origin}: {e}")))?;
    if let Some(port) = descriptor.port() {
        url.set_port(Some(port))
            .map_err(|_| CourierError::invalid_url(format!("cannot set port on {origin}")))?;
    }
    url.path_segments_mut()
        .map_err(|_| CourierError::invalid_url(format!("{origin} cannot carry a path")))?
        .extend(path.segments());
    Ok(url)
}
