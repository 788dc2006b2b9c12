pub mod agent;
pub mod config;
pub mod page;

pub use agent::{AgentRecord, CachedAgent, ChainPrefix, GlobalId, MAX_NAME_CHARS};
pub use config::{CacheConfig, Config, LoggingConfig, SourceConfig, SyncConfig, MAX_TTL_SECS};
pub use page::{CacheStats, Page, PageRequest, SearchFilter};
