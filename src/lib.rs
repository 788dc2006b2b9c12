//! Agent Cache - local cache-and-sync engine for on-chain agent metadata
//!
//! Agent Cache keeps a persistent, TTL-bounded and capacity-bounded SQLite copy
//! of agent records gathered from many independently failing upstream sources
//! (one per chain family), and serves point lookups, paginated listings and
//! full-text search over it.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, error taxonomy and the two ports
//!   (`AgentCacheRepository`, `DataSource`)
//! - **Adapters** (`adapters`): the SQLite store and the data source adapters
//! - **Service Layer** (`services`): sync orchestration with per-source circuit
//!   breakers, and the query façade
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use agent_cache::adapters::sources::MockDataSource;
//! use agent_cache::adapters::sqlite::open_cache;
//! use agent_cache::domain::models::{CacheConfig, ChainPrefix};
//! use agent_cache::services::{SyncOrchestrator, SyncOrchestratorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = Arc::new(open_cache(&CacheConfig::default()).await?);
//!     let orchestrator = SyncOrchestrator::new(cache, SyncOrchestratorConfig::default());
//!     let source = MockDataSource::with_generated("demo", ChainPrefix::Sol, 25)?;
//!     orchestrator.register_data_source(Arc::new(source)).await?;
//!     let report = orchestrator.sync_now().await;
//!     println!("{} records synced", report.records_synced());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::sqlite::{open_cache, SqliteAgentCache};
pub use domain::models::{
    AgentRecord, CacheConfig, CacheStats, CachedAgent, ChainPrefix, Config, GlobalId, Page,
    PageRequest, SearchFilter, SyncConfig,
};
pub use domain::ports::{AgentCacheRepository, DataSource, FetchBatch, FetchRequest};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AgentQueryService, SyncOrchestrator, SyncOrchestratorConfig, SyncReport};
