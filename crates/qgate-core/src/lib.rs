//! # qgate Core
//!
//! The contract layer of the qgate access stack.
//! This crate holds the ports (traits) that infrastructure implements and the
//! closed error taxonomy raised to callers. It has zero infrastructure dependencies.

pub mod error;
pub mod ports;

pub use error::{AccessError, AccessResult};
