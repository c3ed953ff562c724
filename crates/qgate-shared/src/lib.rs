//! # qgate Shared
//!
//! Serializable report envelopes shared by qgate frontends. Errors follow
//! RFC 7807 problem details.

pub mod response;

pub use response::{ApiResponse, ErrorResponse, ProblemKind};
