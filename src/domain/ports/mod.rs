//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - AgentCacheRepository: the persistent, TTL-bounded agent store
//! - DataSource: per-network upstream feeding the store
//!
//! These traits keep the sync orchestrator and the query facade
//! independent of SQLite and of any particular chain.

pub mod agent_cache_repository;
pub mod data_source;

pub use agent_cache_repository::AgentCacheRepository;
pub use data_source::{DataSource, FetchBatch, FetchRequest, DEFAULT_BATCH_SIZE};
