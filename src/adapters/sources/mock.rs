//! Scripted in-memory data source for tests and demos.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentRecord, ChainPrefix, GlobalId};
use crate::domain::ports::{DataSource, FetchBatch, FetchRequest};

/// Serves a fixed list of records in pages, using the record offset as cursor.
///
/// Pages are numbered from 1 by `offset / limit + 1`. A scripted failure
/// page makes every fetch of that page fail until the script is cleared.
pub struct MockDataSource {
    name: String,
    chain_prefix: ChainPrefix,
    batch_size: u32,
    records: RwLock<Vec<AgentRecord>>,
    available: AtomicBool,
    /// 0 means no scripted failure.
    fail_on_page: AtomicU32,
    availability_checks: AtomicU32,
    fetch_calls: AtomicU32,
    requests: RwLock<Vec<FetchRequest>>,
}

impl MockDataSource {
    pub fn new(name: impl Into<String>, chain_prefix: ChainPrefix) -> Self {
        Self {
            name: name.into(),
            chain_prefix,
            batch_size: 10,
            records: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            fail_on_page: AtomicU32::new(0),
            availability_checks: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
            requests: RwLock::new(Vec::new()),
        }
    }

    pub fn with_records(mut self, records: Vec<AgentRecord>) -> Self {
        self.records = RwLock::new(records);
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// A source pre-loaded with `count` synthetic agents named `<name> agent <n>`.
    pub fn with_generated(
        name: impl Into<String>,
        chain_prefix: ChainPrefix,
        count: usize,
    ) -> DomainResult<Self> {
        let name = name.into();
        let chain_id = chain_prefix.requires_chain_id().then_some(1);
        let records = (0..count)
            .map(|i| {
                let id = GlobalId::new(chain_prefix, chain_id, format!("{name}-{i:05}"))?;
                // Spread scores over [0, 100) so listings have a visible order.
                let score = ((i * 37) % 100) as f64;
                Ok(AgentRecord::new(id, format!("{name} agent {i}"), format!("owner-{}", i % 7))
                    .with_trust_tier((i % 4) as u8)
                    .with_quality_score(score))
            })
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(Self::new(name, chain_prefix).with_records(records))
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Fail every fetch of the given 1-based page; `None` clears the script.
    pub fn set_fail_on_page(&self, page: Option<u32>) {
        self.fail_on_page.store(page.unwrap_or(0), Ordering::Release);
    }

    pub async fn set_records(&self, records: Vec<AgentRecord>) {
        *self.records.write().await = records;
    }

    pub fn availability_checks(&self) -> u32 {
        self.availability_checks.load(Ordering::Acquire)
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::Acquire)
    }

    /// Every fetch request received, in order.
    pub async fn requests(&self) -> Vec<FetchRequest> {
        self.requests.read().await.clone()
    }

    fn parse_cursor(&self, cursor: Option<&str>) -> DomainResult<usize> {
        cursor.map_or(Ok(0), |c| {
            c.parse::<usize>()
                .map_err(|_| DomainError::upstream(&self.name, format!("invalid cursor '{c}'")))
        })
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn chain_prefix(&self) -> ChainPrefix {
        self.chain_prefix
    }

    fn default_batch_size(&self) -> u32 {
        self.batch_size
    }

    async fn is_available(&self) -> bool {
        self.availability_checks.fetch_add(1, Ordering::AcqRel);
        self.available.load(Ordering::Acquire)
    }

    async fn fetch_batch(&self, request: FetchRequest) -> DomainResult<FetchBatch> {
        self.fetch_calls.fetch_add(1, Ordering::AcqRel);
        self.requests.write().await.push(request.clone());

        let limit = request.limit.max(1) as usize;
        let offset = self.parse_cursor(request.cursor.as_deref())?;
        let page = u32::try_from(offset / limit + 1).unwrap_or(u32::MAX);

        if self.fail_on_page.load(Ordering::Acquire) == page {
            return Err(DomainError::upstream(&self.name, format!("scripted failure on page {page}")));
        }

        let records = self.records.read().await;
        let end = (offset + limit).min(records.len());
        let agents = records.get(offset..end).map(<[AgentRecord]>::to_vec).unwrap_or_default();
        let has_more = end < records.len();

        Ok(FetchBatch {
            agents,
            cursor: has_more.then(|| end.to_string()),
            has_more,
            total: Some(records.len() as u64),
            skipped: 0,
        })
    }

    async fn total_count(&self) -> DomainResult<Option<u64>> {
        Ok(Some(self.records.read().await.len() as u64))
    }
}
