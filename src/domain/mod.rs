//! Domain layer for the agent cache
//!
//! This module contains the agent model, pagination types and the port
//! traits adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
