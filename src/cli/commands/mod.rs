//! CLI command implementations.

pub mod agent;
pub mod cache;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::sqlite::{open_cache, SqliteAgentCache};
use crate::domain::models::{CacheConfig, ChainPrefix};
use crate::services::AgentQueryService;

/// Open the configured store, applying migrations on first use.
pub async fn open_store(config: &CacheConfig) -> Result<Arc<SqliteAgentCache>> {
    let cache = open_cache(config)
        .await
        .with_context(|| format!("Failed to open agent cache at {}", config.storage_path))?;
    Ok(Arc::new(cache))
}

pub async fn open_query_service(config: &CacheConfig) -> Result<AgentQueryService<SqliteAgentCache>> {
    Ok(AgentQueryService::new(open_store(config).await?))
}

/// clap value parser for `--chain`.
pub fn parse_chain_prefix(s: &str) -> Result<ChainPrefix, String> {
    s.parse::<ChainPrefix>().map_err(|e| e.to_string())
}
