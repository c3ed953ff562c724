//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod cache;
mod transport;
mod validator;

pub use cache::{BackendStats, CacheBackend, CacheError};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, QueryParams, Transport, TransportError};
pub use validator::InputValidator;
