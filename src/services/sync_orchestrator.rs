//! Sync orchestrator.
//!
//! Pulls batches from every registered [`DataSource`] into the cache store.
//! Each source keeps its own resumable cursor and circuit breaker; one
//! source failing never blocks or rolls back another. A background task
//! drives periodic passes and evicts expired rows on every tick.
//!
//! Stopping only affects the background task: it stops between pages and
//! lets an in-flight batch write finish. Manual [`SyncOrchestrator::sync_now`]
//! passes always run to the end of the stream. The task also ends on its own
//! once the cache store fails, since retrying cannot fix a local store.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChainPrefix, SyncConfig};
use crate::domain::ports::{AgentCacheRepository, DataSource, FetchRequest};
use crate::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncOrchestratorConfig {
    /// Interval between background sync passes.
    pub sync_interval: Duration,
    /// Whether the background task syncs as soon as it starts.
    pub sync_on_startup: bool,
    pub breaker: CircuitBreakerConfig,
}

impl Default for SyncOrchestratorConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOrchestratorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            sync_interval: config.sync_interval().max(Duration::from_millis(1)),
            sync_on_startup: config.sync_on_startup,
            breaker: CircuitBreakerConfig::from(config),
        }
    }
}

/// Where a source currently is in its sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Idle,
    Checking,
    Unavailable,
    Syncing,
    Failed,
    CircuitOpen,
}

impl SourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Unavailable => "unavailable",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
            Self::CircuitOpen => "circuit_open",
        }
    }
}

/// Result of one source's part of a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// Every page until end of stream was applied.
    Synced { pages: u32, records: u64 },
    /// The background task was stopped between pages; the cursor stays at the last applied page.
    Interrupted { pages: u32, records: u64 },
    /// The liveness probe failed; nothing was fetched.
    Unavailable,
    /// The circuit is open; the source was not contacted.
    Skipped,
    /// A fetch failed, or the source claimed more data without moving forward,
    /// after `pages` pages were applied.
    FetchFailed { error: String, pages: u32, records: u64 },
    /// Writing a batch into the cache failed.
    StoreFailed { error: String },
}

impl SourceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::StoreFailed { .. } | Self::Unavailable)
    }

    pub fn records(&self) -> u64 {
        match self {
            Self::Synced { records, .. }
            | Self::Interrupted { records, .. }
            | Self::FetchFailed { records, .. } => *records,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

/// Outcome of one sync pass across all sources.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl SyncReport {
    pub fn records_synced(&self) -> u64 {
        self.sources.iter().map(|s| s.outcome.records()).sum()
    }

    pub fn failures(&self) -> usize {
        self.sources.iter().filter(|s| s.outcome.is_failure()).count()
    }

    pub fn outcome(&self, source: &str) -> Option<&SourceOutcome> {
        self.sources.iter().find(|s| s.source == source).map(|s| &s.outcome)
    }

    fn store_failed(&self) -> bool {
        self.sources
            .iter()
            .any(|s| matches!(s.outcome, SourceOutcome::StoreFailed { .. }))
    }
}

/// Snapshot of one source's sync state.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub chain_prefix: ChainPrefix,
    pub state: SourceState,
    pub circuit: CircuitState,
    pub consecutive_failures: u32,
    /// How many times the circuit has opened since registration.
    pub circuit_opens: u32,
    /// When an open circuit lets the next probe through.
    pub retry_after: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub synced_since: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_outcome: Option<SourceOutcome>,
    pub records_synced: u64,
}

/// Mutable per-source state. The cursor only advances after a batch is committed.
#[derive(Debug)]
struct SourceRuntime {
    state: SourceState,
    cursor: Option<String>,
    synced_since: Option<DateTime<Utc>>,
    last_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_outcome: Option<SourceOutcome>,
    records_synced: u64,
    breaker: CircuitBreaker,
}

impl SourceRuntime {
    fn new() -> Self {
        Self {
            state: SourceState::Idle,
            cursor: None,
            synced_since: None,
            last_sync_at: None,
            last_error: None,
            last_outcome: None,
            records_synced: 0,
            breaker: CircuitBreaker::new(),
        }
    }
}

struct SourceSlot {
    source: Arc<dyn DataSource>,
    /// Held for a whole pass so one source never has two fetches in flight.
    run: Mutex<()>,
    runtime: RwLock<SourceRuntime>,
}

/// Handle to the background sync task.
pub struct SyncHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Signal the task and wait for it to finish. An in-flight batch write completes first.
    pub async fn stop(self) {
        self.stop_tx.send_replace(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "sync task terminated abnormally");
        }
    }

    /// Wait for the task to end on its own, which it only does once the store fails.
    /// Do not call [`SyncHandle::stop`] after this resolves.
    pub async fn finished(&mut self) {
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "sync task terminated abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Drives incremental sync from all registered sources into the cache.
pub struct SyncOrchestrator<C>
where
    C: AgentCacheRepository + 'static,
{
    cache: Arc<C>,
    config: SyncOrchestratorConfig,
    sources: RwLock<Vec<Arc<SourceSlot>>>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl<C> SyncOrchestrator<C>
where
    C: AgentCacheRepository + 'static,
{
    pub fn new(cache: Arc<C>, config: SyncOrchestratorConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            cache,
            config,
            sources: RwLock::new(Vec::new()),
            stop_tx: Arc::new(stop_tx),
        }
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn config(&self) -> &SyncOrchestratorConfig {
        &self.config
    }

    /// Register a source. Names must be unique.
    pub async fn register_data_source(&self, source: Arc<dyn DataSource>) -> DomainResult<()> {
        let mut sources = self.sources.write().await;
        if sources.iter().any(|slot| slot.source.name() == source.name()) {
            return Err(DomainError::DuplicateSource(source.name().to_string()));
        }

        info!(source = %source.name(), chain = %source.chain_prefix(), "registered data source");
        sources.push(Arc::new(SourceSlot {
            source,
            run: Mutex::new(()),
            runtime: RwLock::new(SourceRuntime::new()),
        }));
        Ok(())
    }

    /// Spawn the background task: optional startup pass, then one pass and an
    /// expiry sweep per interval until stopped.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        self.stop_tx.send_replace(false);
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run_loop().await });

        SyncHandle {
            stop_tx: Arc::clone(&self.stop_tx),
            task,
        }
    }

    /// Ask a running background task to stop without waiting for it.
    /// Manual passes are not affected.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    async fn run_loop(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        let period = self.config.sync_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = period.as_millis() as u64, "sync task started");

        if self.config.sync_on_startup && !self.is_stopping() && self.run_tick().await.is_break() {
            error!("cache store failing, sync task giving up");
            return;
        }

        loop {
            if self.is_stopping() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if self.is_stopping() {
                        break;
                    }
                    if self.run_tick().await.is_break() {
                        error!("cache store failing, sync task giving up");
                        return;
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("sync task stopped");
    }

    /// One background pass plus an expiry sweep. Breaks when the store failed.
    async fn run_tick(&self) -> ControlFlow<()> {
        let report = self.run_pass(true).await;
        debug!(
            sources = report.sources.len(),
            records = report.records_synced(),
            failures = report.failures(),
            "sync pass finished"
        );
        if report.store_failed() {
            return ControlFlow::Break(());
        }

        match self.cache.evict_expired().await {
            Ok(0) => ControlFlow::Continue(()),
            Ok(removed) => {
                info!(removed, "evicted expired agents");
                ControlFlow::Continue(())
            }
            Err(e) => {
                error!(error = %e, "expiry sweep failed");
                ControlFlow::Break(())
            }
        }
    }

    /// Run one pass over every registered source concurrently, to the end of each stream.
    pub async fn sync_now(&self) -> SyncReport {
        self.run_pass(false).await
    }

    async fn run_pass(&self, interruptible: bool) -> SyncReport {
        let started_at = Utc::now();
        let slots: Vec<Arc<SourceSlot>> = self.sources.read().await.clone();

        let sources = join_all(slots.iter().map(|slot| self.sync_source(slot, interruptible))).await;

        SyncReport {
            started_at,
            finished_at: Utc::now(),
            sources,
        }
    }

    pub async fn source_status(&self) -> Vec<SourceStatus> {
        let slots: Vec<Arc<SourceSlot>> = self.sources.read().await.clone();
        let mut statuses = Vec::with_capacity(slots.len());
        for slot in slots {
            let rt = slot.runtime.read().await;
            statuses.push(SourceStatus {
                name: slot.source.name().to_string(),
                chain_prefix: slot.source.chain_prefix(),
                state: rt.state,
                circuit: rt.breaker.state(),
                consecutive_failures: rt.breaker.consecutive_failures(),
                circuit_opens: rt.breaker.open_count(),
                retry_after: rt.breaker.retry_after(&self.config.breaker),
                cursor: rt.cursor.clone(),
                synced_since: rt.synced_since,
                last_sync_at: rt.last_sync_at,
                last_error: rt.last_error.clone(),
                last_outcome: rt.last_outcome.clone(),
                records_synced: rt.records_synced,
            });
        }
        statuses
    }

    async fn sync_source(&self, slot: &SourceSlot, interruptible: bool) -> SourceReport {
        let _running = slot.run.lock().await;
        let outcome = self.run_source_pass(slot, interruptible).await;
        slot.runtime.write().await.last_outcome = Some(outcome.clone());
        SourceReport {
            source: slot.source.name().to_string(),
            outcome,
        }
    }

    async fn run_source_pass(&self, slot: &SourceSlot, interruptible: bool) -> SourceOutcome {
        let source = slot.source.as_ref();
        let name = source.name();
        let pass_started = Utc::now();
        let breaker_config = &self.config.breaker;

        {
            let mut rt = slot.runtime.write().await;
            if !rt.breaker.allows(breaker_config) {
                rt.state = SourceState::CircuitOpen;
                debug!(source = %name, retry_after = ?rt.breaker.retry_after(breaker_config), "circuit open, skipping");
                return SourceOutcome::Skipped;
            }
            rt.state = SourceState::Checking;
        }

        if !source.is_available().await {
            let mut rt = slot.runtime.write().await;
            rt.breaker.record_failure(breaker_config);
            rt.last_error = Some("source unavailable".to_string());
            rt.state = if rt.breaker.state() == CircuitState::Open {
                SourceState::CircuitOpen
            } else {
                SourceState::Idle
            };
            warn!(source = %name, failures = rt.breaker.consecutive_failures(), "data source unavailable");
            return SourceOutcome::Unavailable;
        }

        let (mut cursor, synced_since) = {
            let mut rt = slot.runtime.write().await;
            rt.state = SourceState::Syncing;
            (rt.cursor.clone(), rt.synced_since)
        };
        let limit = source.default_batch_size().max(1);
        let mut pages = 0u32;
        let mut records = 0u64;

        if cursor.is_some() {
            debug!(source = %name, cursor = ?cursor, "resuming sync");
        }

        let completed = loop {
            if interruptible && self.is_stopping() {
                break false;
            }

            let request = FetchRequest {
                cursor: cursor.clone(),
                updated_since: synced_since,
                limit,
            };

            let batch = match source.fetch_batch(request).await {
                Ok(batch) => batch,
                Err(e) => return self.fetch_failed(slot, e.to_string(), pages, records).await,
            };

            // Nothing came back at all: either the stream ended or the source is confused.
            if batch.agents.is_empty() && batch.skipped == 0 {
                if !batch.has_more {
                    break true;
                }
                let error = "source reported more data but returned an empty batch".to_string();
                return self.fetch_failed(slot, error, pages, records).await;
            }

            match self.cache.upsert_batch(&batch.agents).await {
                Ok(applied) => {
                    pages += 1;
                    records += applied as u64;
                }
                Err(e) => {
                    let error = e.to_string();
                    let mut rt = slot.runtime.write().await;
                    rt.last_error = Some(error.clone());
                    rt.records_synced += records;
                    rt.state = SourceState::Failed;
                    error!(source = %name, pages, error = %error, "failed to store batch");
                    return SourceOutcome::StoreFailed { error };
                }
            }
            if batch.skipped > 0 {
                debug!(source = %name, skipped = batch.skipped, "page carried invalid agents");
            }

            if !batch.has_more {
                break true;
            }
            match batch.cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                    slot.runtime.write().await.cursor = cursor.clone();
                }
                _ => {
                    let error = "source reported more data without advancing its cursor".to_string();
                    return self.fetch_failed(slot, error, pages, records).await;
                }
            }
        };

        let mut rt = slot.runtime.write().await;
        rt.records_synced += records;
        rt.state = SourceState::Idle;
        if !completed {
            info!(source = %name, pages, records, cursor = ?rt.cursor, "sync pass interrupted by stop");
            return SourceOutcome::Interrupted { pages, records };
        }

        rt.cursor = None;
        rt.synced_since = Some(pass_started);
        rt.last_sync_at = Some(Utc::now());
        rt.last_error = None;
        rt.breaker.record_success();
        info!(source = %name, pages, records, "sync pass complete");
        SourceOutcome::Synced { pages, records }
    }

    /// Count an upstream failure against the breaker. The cursor stays where
    /// the last applied page left it.
    async fn fetch_failed(&self, slot: &SourceSlot, error: String, pages: u32, records: u64) -> SourceOutcome {
        let mut rt = slot.runtime.write().await;
        rt.breaker.record_failure(&self.config.breaker);
        rt.last_error = Some(error.clone());
        rt.records_synced += records;
        rt.state = if rt.breaker.state() == CircuitState::Open {
            SourceState::CircuitOpen
        } else {
            SourceState::Failed
        };
        warn!(
            source = %slot.source.name(),
            pages,
            records,
            cursor = ?rt.cursor,
            error = %error,
            "fetch failed, will resume from last cursor"
        );
        SourceOutcome::FetchFailed { error, pages, records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sources::MockDataSource;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAgentCache};
    use crate::domain::models::{AgentRecord, GlobalId, PageRequest};
    use crate::domain::ports::FetchBatch;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    async fn setup_cache() -> Arc<SqliteAgentCache> {
        let pool = create_migrated_test_pool().await.unwrap();
        Arc::new(SqliteAgentCache::new(pool, chrono::Duration::hours(1), 10_000))
    }

    fn config(failure_threshold: u32, cooldown: chrono::Duration) -> SyncOrchestratorConfig {
        SyncOrchestratorConfig {
            sync_interval: Duration::from_millis(20),
            sync_on_startup: true,
            breaker: CircuitBreakerConfig {
                failure_threshold,
                open_timeout: cooldown,
            },
        }
    }

    async fn cached_total(cache: &SqliteAgentCache) -> u64 {
        cache.list(None, PageRequest::default()).await.unwrap().total
    }

    #[tokio::test]
    async fn test_failed_page_resumes_from_last_cursor() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache.clone(), config(3, chrono::Duration::minutes(10)));
        let source = Arc::new(MockDataSource::with_generated("sol-indexer", ChainPrefix::Sol, 30).unwrap());
        source.set_fail_on_page(Some(2));
        orchestrator.register_data_source(source.clone()).await.unwrap();

        let report = orchestrator.sync_now().await;
        assert!(matches!(
            report.outcome("sol-indexer"),
            Some(SourceOutcome::FetchFailed { pages: 1, records: 10, .. })
        ));
        assert_eq!(cached_total(&cache).await, 10);

        let status = &orchestrator.source_status().await[0];
        assert_eq!(status.cursor.as_deref(), Some("10"));
        assert_eq!(status.state, SourceState::Failed);

        source.set_fail_on_page(None);
        let report = orchestrator.sync_now().await;
        assert_eq!(
            report.outcome("sol-indexer"),
            Some(&SourceOutcome::Synced { pages: 2, records: 20 })
        );
        assert_eq!(cached_total(&cache).await, 30);

        let cursors: Vec<Option<String>> = source.requests().await.into_iter().map(|r| r.cursor).collect();
        assert_eq!(
            cursors,
            vec![None, Some("10".to_string()), Some("10".to_string()), Some("20".to_string())]
        );

        let status = &orchestrator.source_status().await[0];
        assert!(status.cursor.is_none());
        assert!(status.synced_since.is_some());
        assert_eq!(status.records_synced, 30);
    }

    #[tokio::test]
    async fn test_completed_pass_makes_next_pass_incremental() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache, config(3, chrono::Duration::minutes(10)));
        let source = Arc::new(MockDataSource::with_generated("near-indexer", ChainPrefix::Near, 5).unwrap());
        orchestrator.register_data_source(source.clone()).await.unwrap();

        let first = orchestrator.sync_now().await;
        orchestrator.sync_now().await;

        let requests = source.requests().await;
        assert_eq!(requests.len(), 2);
        assert!(requests[0].updated_since.is_none());
        assert!(requests[1].cursor.is_none());
        let since = requests[1].updated_since.expect("second pass should be incremental");
        assert!(since >= first.started_at && since <= first.finished_at);
    }

    #[tokio::test]
    async fn test_unavailable_source_is_not_fetched() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache.clone(), config(3, chrono::Duration::minutes(10)));
        let source = Arc::new(MockDataSource::with_generated("down", ChainPrefix::Sui, 10).unwrap());
        source.set_available(false);
        orchestrator.register_data_source(source.clone()).await.unwrap();

        let report = orchestrator.sync_now().await;
        assert_eq!(report.outcome("down"), Some(&SourceOutcome::Unavailable));
        assert_eq!(source.fetch_calls(), 0);
        assert_eq!(cached_total(&cache).await, 0);

        let status = &orchestrator.source_status().await[0];
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.cursor.is_none());
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache.clone(), config(3, chrono::Duration::minutes(10)));

        let broken = Arc::new(MockDataSource::with_generated("broken", ChainPrefix::Evm, 10).unwrap());
        broken.set_fail_on_page(Some(1));
        let healthy = Arc::new(MockDataSource::with_generated("healthy", ChainPrefix::Aptos, 25).unwrap());
        let down = Arc::new(MockDataSource::with_generated("down", ChainPrefix::Sol, 5).unwrap());
        down.set_available(false);

        orchestrator.register_data_source(broken).await.unwrap();
        orchestrator.register_data_source(healthy).await.unwrap();
        orchestrator.register_data_source(down).await.unwrap();

        let report = orchestrator.sync_now().await;
        assert!(matches!(report.outcome("broken"), Some(SourceOutcome::FetchFailed { pages: 0, .. })));
        assert_eq!(report.outcome("healthy"), Some(&SourceOutcome::Synced { pages: 3, records: 25 }));
        assert_eq!(report.outcome("down"), Some(&SourceOutcome::Unavailable));
        assert_eq!(report.failures(), 2);
        assert_eq!(report.records_synced(), 25);
        assert_eq!(cached_total(&cache).await, 25);
    }

    #[tokio::test]
    async fn test_circuit_opens_and_skips_probe_during_cooldown() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache, config(2, chrono::Duration::minutes(10)));
        let source = Arc::new(MockDataSource::with_generated("flaky", ChainPrefix::Sol, 5).unwrap());
        source.set_available(false);
        orchestrator.register_data_source(source.clone()).await.unwrap();

        orchestrator.sync_now().await;
        orchestrator.sync_now().await;
        assert_eq!(source.availability_checks(), 2);

        let report = orchestrator.sync_now().await;
        assert_eq!(report.outcome("flaky"), Some(&SourceOutcome::Skipped));
        assert_eq!(source.availability_checks(), 2);

        let status = &orchestrator.source_status().await[0];
        assert_eq!(status.circuit, CircuitState::Open);
        assert_eq!(status.state, SourceState::CircuitOpen);
        assert_eq!(status.circuit_opens, 1);
        assert!(status.retry_after.is_some_and(|at| at > Utc::now()));
        assert_eq!(status.last_outcome, Some(SourceOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_half_open_probe_closes_circuit() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache, config(1, chrono::Duration::milliseconds(30)));
        let source = Arc::new(MockDataSource::with_generated("recovering", ChainPrefix::Sol, 5).unwrap());
        source.set_available(false);
        orchestrator.register_data_source(source.clone()).await.unwrap();

        orchestrator.sync_now().await;
        assert_eq!(orchestrator.sync_now().await.outcome("recovering"), Some(&SourceOutcome::Skipped));

        tokio::time::sleep(Duration::from_millis(50)).await;
        source.set_available(true);

        let report = orchestrator.sync_now().await;
        assert_eq!(report.outcome("recovering"), Some(&SourceOutcome::Synced { pages: 1, records: 5 }));
        assert_eq!(orchestrator.source_status().await[0].circuit, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_trip_breaker() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache.clone(), config(1, chrono::Duration::minutes(10)));
        let source = Arc::new(MockDataSource::with_generated("ok", ChainPrefix::Sol, 5).unwrap());
        orchestrator.register_data_source(source).await.unwrap();

        cache.pool().close().await;

        let report = orchestrator.sync_now().await;
        assert!(matches!(report.outcome("ok"), Some(SourceOutcome::StoreFailed { .. })));

        let status = &orchestrator.source_status().await[0];
        assert_eq!(status.circuit, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
    }

    struct EmptyPageSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DataSource for EmptyPageSource {
        fn name(&self) -> &str {
            "empty"
        }

        fn chain_prefix(&self) -> ChainPrefix {
            ChainPrefix::Near
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn fetch_batch(&self, _request: FetchRequest) -> DomainResult<FetchBatch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchBatch {
                agents: Vec::new(),
                cursor: Some("next".to_string()),
                has_more: true,
                total: None,
                skipped: 0,
            })
        }

        async fn total_count(&self) -> DomainResult<Option<u64>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_empty_batch_with_more_flag_is_a_failed_fetch() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache, config(3, chrono::Duration::minutes(10)));
        let source = Arc::new(EmptyPageSource {
            calls: AtomicU32::new(0),
        });
        orchestrator.register_data_source(source.clone()).await.unwrap();

        let report = orchestrator.sync_now().await;
        assert!(matches!(
            report.outcome("empty"),
            Some(SourceOutcome::FetchFailed { pages: 0, records: 0, .. })
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // The stream is not treated as finished.
        let status = &orchestrator.source_status().await[0];
        assert!(status.cursor.is_none());
        assert!(status.synced_since.is_none());
        assert!(status.last_sync_at.is_none());
        assert_eq!(status.consecutive_failures, 1);

        orchestrator.sync_now().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2, "next pass retries from the same position");
    }

    /// Returns one page of agents whose cursor never moves.
    struct StuckCursorSource;

    #[async_trait]
    impl DataSource for StuckCursorSource {
        fn name(&self) -> &str {
            "stuck"
        }

        fn chain_prefix(&self) -> ChainPrefix {
            ChainPrefix::Sol
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn fetch_batch(&self, request: FetchRequest) -> DomainResult<FetchBatch> {
            let id = GlobalId::new(ChainPrefix::Sol, None, "stuck-1")?;
            Ok(FetchBatch {
                agents: vec![AgentRecord::new(id, "Stuck", "w1")],
                cursor: request.cursor.or_else(|| Some("5".to_string())),
                has_more: true,
                total: None,
                skipped: 0,
            })
        }

        async fn total_count(&self) -> DomainResult<Option<u64>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_cursor_that_stops_moving_ends_pass_as_failure() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache.clone(), config(3, chrono::Duration::minutes(10)));
        orchestrator.register_data_source(Arc::new(StuckCursorSource)).await.unwrap();

        let report = orchestrator.sync_now().await;
        assert!(matches!(
            report.outcome("stuck"),
            Some(SourceOutcome::FetchFailed { pages: 2, records: 2, .. })
        ));
        assert_eq!(cached_total(&cache).await, 1);

        let status = &orchestrator.source_status().await[0];
        assert_eq!(status.cursor.as_deref(), Some("5"));
        assert!(status.synced_since.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_source_rejected() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache, SyncOrchestratorConfig::default());
        orchestrator
            .register_data_source(Arc::new(MockDataSource::new("dup", ChainPrefix::Sol)))
            .await
            .unwrap();

        let err = orchestrator
            .register_data_source(Arc::new(MockDataSource::new("dup", ChainPrefix::Evm)))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateSource(name) if name == "dup"));
    }

    #[tokio::test]
    async fn test_background_task_syncs_until_stopped() {
        let cache = setup_cache().await;
        let orchestrator = Arc::new(SyncOrchestrator::new(cache.clone(), config(3, chrono::Duration::minutes(10))));
        let source = Arc::new(MockDataSource::with_generated("bg", ChainPrefix::Sol, 12).unwrap());
        orchestrator.register_data_source(source.clone()).await.unwrap();

        let handle = orchestrator.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        assert_eq!(cached_total(&cache).await, 12);
        let checks = source.availability_checks();
        assert!(checks >= 2, "expected startup pass plus ticks, got {checks}");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.availability_checks(), checks);
    }

    #[tokio::test]
    async fn test_manual_pass_after_stop_runs_to_completion() {
        let cache = setup_cache().await;
        let orchestrator = SyncOrchestrator::new(cache.clone(), config(3, chrono::Duration::minutes(10)));
        let source = Arc::new(MockDataSource::with_generated("manual", ChainPrefix::Sui, 12).unwrap());
        orchestrator.register_data_source(source.clone()).await.unwrap();

        orchestrator.stop();
        let report = orchestrator.sync_now().await;

        assert_eq!(report.outcome("manual"), Some(&SourceOutcome::Synced { pages: 2, records: 12 }));
        assert_eq!(source.fetch_calls(), 2);
        assert_eq!(cached_total(&cache).await, 12);
    }

    #[tokio::test]
    async fn test_background_task_ends_when_store_fails() {
        let cache = setup_cache().await;
        let orchestrator = Arc::new(SyncOrchestrator::new(cache.clone(), config(3, chrono::Duration::minutes(10))));
        let source = Arc::new(MockDataSource::with_generated("doomed", ChainPrefix::Sol, 5).unwrap());
        orchestrator.register_data_source(source.clone()).await.unwrap();

        cache.pool().close().await;
        let handle = orchestrator.start();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(handle.is_finished(), "sync task should give up on a failing store");
        assert_eq!(source.fetch_calls(), 1);
        let status = &orchestrator.source_status().await[0];
        assert!(matches!(status.last_outcome, Some(SourceOutcome::StoreFailed { .. })));
        handle.stop().await;
    }

    /// Pages through a mock source but parks the fetch at `gate_cursor` until released.
    struct GatedSource {
        inner: MockDataSource,
        gate_cursor: &'static str,
        reached: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DataSource for GatedSource {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn chain_prefix(&self) -> ChainPrefix {
            self.inner.chain_prefix()
        }

        fn default_batch_size(&self) -> u32 {
            self.inner.default_batch_size()
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn fetch_batch(&self, request: FetchRequest) -> DomainResult<FetchBatch> {
            if request.cursor.as_deref() == Some(self.gate_cursor) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.inner.fetch_batch(request).await
        }

        async fn total_count(&self) -> DomainResult<Option<u64>> {
            self.inner.total_count().await
        }
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_page_land_and_keeps_cursor() {
        let cache = setup_cache().await;
        let orchestrator = Arc::new(SyncOrchestrator::new(cache.clone(), config(3, chrono::Duration::minutes(10))));
        let source = Arc::new(GatedSource {
            inner: MockDataSource::with_generated("gated", ChainPrefix::Sol, 40).unwrap(),
            gate_cursor: "20",
            reached: Notify::new(),
            release: Notify::new(),
        });
        orchestrator.register_data_source(source.clone()).await.unwrap();

        let handle = orchestrator.start();
        source.reached.notified().await;
        orchestrator.stop();
        source.release.notify_one();
        handle.stop().await;

        // Page 3 was in flight when stop arrived; it lands, page 4 is never requested.
        assert_eq!(cached_total(&cache).await, 30);
        assert_eq!(source.inner.fetch_calls(), 3);

        let status = &orchestrator.source_status().await[0];
        assert_eq!(status.last_outcome, Some(SourceOutcome::Interrupted { pages: 3, records: 30 }));
        assert_eq!(status.cursor.as_deref(), Some("30"));
        assert!(status.synced_since.is_none());
        assert_eq!(status.state, SourceState::Idle);

        // The next pass resumes at the saved cursor.
        let report = orchestrator.sync_now().await;
        assert_eq!(report.outcome("gated"), Some(&SourceOutcome::Synced { pages: 1, records: 10 }));
        assert_eq!(cached_total(&cache).await, 40);
    }
}
