use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AgentRecord, CacheStats, CachedAgent, ChainPrefix, Page, PageRequest, SearchFilter,
};

/// Repository trait for the local agent cache.
///
/// Write operations are individually atomic: a reader never observes a
/// half-written row or a search index that disagrees with the base table.
/// No transaction spans more than one call.
#[async_trait]
pub trait AgentCacheRepository: Send + Sync {
    /// Insert or replace a record by global id, refreshing its expiry.
    ///
    /// Capacity eviction runs before the write commits.
    async fn upsert(&self, record: &AgentRecord) -> DomainResult<CachedAgent>;

    /// Upsert every record of one batch in a single transaction.
    ///
    /// Returns the number of records written.
    async fn upsert_batch(&self, records: &[AgentRecord]) -> DomainResult<usize>;

    /// Fetch a live record. Missing and expired rows both return `None`.
    async fn get(&self, global_id: &str) -> DomainResult<Option<CachedAgent>>;

    /// Rank live records by text relevance against their name.
    ///
    /// Malformed queries degrade to a case-insensitive substring match and
    /// never surface as errors.
    async fn search(&self, query: &str, filter: SearchFilter) -> DomainResult<Page<CachedAgent>>;

    /// List live records by quality score, highest first, unscored last.
    async fn list(
        &self,
        chain_prefix: Option<ChainPrefix>,
        page: PageRequest,
    ) -> DomainResult<Page<CachedAgent>>;

    /// Hard-delete every expired row. Returns how many were removed.
    async fn evict_expired(&self) -> DomainResult<u64>;

    /// Occupancy snapshot.
    async fn stats(&self) -> DomainResult<CacheStats>;

    /// Remove every row.
    async fn clear(&self) -> DomainResult<()>;
}
