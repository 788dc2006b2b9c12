//! Infrastructure adapters for external systems.

pub mod sources;
pub mod sqlite;
