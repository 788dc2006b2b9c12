//! Data source adapters feeding the sync orchestrator.

pub mod http_indexer;
pub mod mock;

pub use http_indexer::{HttpIndexerSource, MAX_BATCH_SIZE};
pub use mock::MockDataSource;
