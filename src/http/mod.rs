//! # HTTP Layer
//!
//! Declarative descriptors, URL composition, the transport seam, and the
//! network task that executes one request per fingerprint.

pub mod decoder;
pub mod descriptor;
pub mod method;
pub mod network_task;
pub mod transport;
pub mod url_path;

pub use descriptor::{MergePolicy, RequestParams, Requestable};
pub use method::Method;
pub use network_task::NetworkTask;
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
pub use url_path::UrlPath;
