//! Network boundary: request envelopes, the injectable transport, and the
//! single-attempt executor.

pub mod executor;
pub mod http;

pub use executor::{RequestExecutor, parse_retry_after};
pub use http::{
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, DEFAULT_TTL, HttpMethod, HttpResponse, HttpTransport,
    RequestDescriptor, ReqwestTransport,
};
