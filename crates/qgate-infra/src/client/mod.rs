//! Access client for the quality-analysis service.

mod access;
mod classify;
mod config;
mod transport;

pub use access::AccessClient;
pub use classify::{MAX_BACKOFF, backoff_delay};
pub use config::{API_SUFFIX, ClientConfig, normalize_base_url};
pub use transport::ReqwestTransport;
