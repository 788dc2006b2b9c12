//! Data source port.
//!
//! Every chain-specific adapter implements [`DataSource`]. The sync
//! orchestrator is written once against this trait and never against a
//! specific chain. All fields an adapter reports are treated as advisory:
//! only `has_more` governs when a fetch loop terminates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentRecord, ChainPrefix};

/// Page size used when an adapter does not override it.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Parameters of a single incremental fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Opaque resume token from the previous batch; `None` starts from the beginning.
    pub cursor: Option<String>,
    /// Only return records updated at or after this instant.
    pub updated_since: Option<DateTime<Utc>>,
    /// Maximum records to return.
    pub limit: u32,
}

impl FetchRequest {
    pub fn first_page(limit: u32) -> Self {
        Self {
            cursor: None,
            updated_since: None,
            limit,
        }
    }
}

/// One batch returned by a data source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    pub agents: Vec<AgentRecord>,
    /// Resume token for the next batch; `None` together with `has_more = false` ends the stream.
    pub cursor: Option<String>,
    pub has_more: bool,
    /// Advisory total, never used for termination.
    pub total: Option<u64>,
    /// Items the upstream page carried that failed validation and were dropped.
    /// A batch with no agents but skipped items is a real page, not an empty one.
    pub skipped: u32,
}

impl FetchBatch {
    pub fn last(agents: Vec<AgentRecord>) -> Self {
        Self {
            agents,
            cursor: None,
            has_more: false,
            total: None,
            skipped: 0,
        }
    }
}

/// Port for adapters that pull agent records from one network.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Stable identifier used in logs and status reports.
    fn name(&self) -> &str;

    /// Chain family this source feeds.
    fn chain_prefix(&self) -> ChainPrefix;

    /// Page size the orchestrator should request from this source.
    fn default_batch_size(&self) -> u32 {
        DEFAULT_BATCH_SIZE
    }

    /// Cheap liveness probe. Returns `false` for ordinary unreachability instead of failing.
    async fn is_available(&self) -> bool;

    /// Fetch up to `request.limit` records starting after `request.cursor`.
    async fn fetch_batch(&self, request: FetchRequest) -> DomainResult<FetchBatch>;

    /// Best-effort record count, for reporting only.
    async fn total_count(&self) -> DomainResult<Option<u64>>;
}
