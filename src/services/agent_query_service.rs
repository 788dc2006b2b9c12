//! Read-side façade over the agent cache.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AgentRecord, CacheStats, CachedAgent, ChainPrefix, GlobalId, Page, PageRequest, SearchFilter,
};
use crate::domain::ports::AgentCacheRepository;

/// Counts from a manual import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

pub struct AgentQueryService<R: AgentCacheRepository> {
    repository: Arc<R>,
}

impl<R: AgentCacheRepository> AgentQueryService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Point lookup. The id is parsed first so `SOL:abc` and `sol:abc` find the same row.
    pub async fn get(&self, global_id: &str) -> DomainResult<Option<CachedAgent>> {
        let id: GlobalId = global_id.trim().parse()?;
        self.repository.get(&id.to_string()).await
    }

    pub async fn list(&self, chain_prefix: Option<ChainPrefix>, page: PageRequest) -> DomainResult<Page<CachedAgent>> {
        self.repository.list(chain_prefix, page).await
    }

    /// Free-text name search. Malformed queries degrade to substring matching, never to an error.
    pub async fn search(&self, query: &str, filter: SearchFilter) -> DomainResult<Page<CachedAgent>> {
        self.repository.search(query, filter).await
    }

    pub async fn stats(&self) -> DomainResult<CacheStats> {
        self.repository.stats().await
    }

    pub async fn evict_expired(&self) -> DomainResult<u64> {
        self.repository.evict_expired().await
    }

    pub async fn clear(&self) -> DomainResult<()> {
        self.repository.clear().await
    }

    /// Validate and upsert records supplied by hand. Invalid records are skipped.
    pub async fn import(&self, records: Vec<AgentRecord>) -> DomainResult<ImportSummary> {
        let total = records.len();
        let valid: Vec<AgentRecord> = records
            .into_iter()
            .filter(|record| match record.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "skipping invalid record");
                    false
                }
            })
            .collect();

        let imported = self.repository.upsert_batch(&valid).await?;
        Ok(ImportSummary {
            imported,
            skipped: total - valid.len(),
        })
    }
}
