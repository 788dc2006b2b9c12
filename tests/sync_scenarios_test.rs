//! End-to-end sync scenarios against a file-backed store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_cache::adapters::sources::MockDataSource;
use agent_cache::domain::models::{ChainPrefix, PageRequest, SearchFilter};
use agent_cache::domain::ports::AgentCacheRepository;
use agent_cache::services::{
    AgentQueryService, CircuitBreakerConfig, CircuitState, SourceOutcome, SyncOrchestrator,
    SyncOrchestratorConfig,
};
use common::{file_backed_cache, setup_test_logging};

fn orchestrator_config(failure_threshold: u32) -> SyncOrchestratorConfig {
    SyncOrchestratorConfig {
        sync_interval: Duration::from_millis(50),
        sync_on_startup: true,
        breaker: CircuitBreakerConfig {
            failure_threshold,
            open_timeout: chrono::Duration::minutes(10),
        },
    }
}

#[tokio::test]
async fn test_all_chain_families_sync_and_are_queryable() {
    setup_test_logging();
    let (_dir, cache) = file_backed_cache(3600, 10_000).await;
    let orchestrator = SyncOrchestrator::new(Arc::clone(&cache), orchestrator_config(3));

    for chain in ChainPrefix::ALL {
        let source = MockDataSource::with_generated(format!("demo-{chain}"), chain, 23)
            .unwrap()
            .with_batch_size(10);
        orchestrator.register_data_source(Arc::new(source)).await.unwrap();
    }

    let report = orchestrator.sync_now().await;
    assert_eq!(report.failures(), 0);
    assert_eq!(report.records_synced(), 23 * 5);
    assert_eq!(
        report.outcome("demo-evm"),
        Some(&SourceOutcome::Synced { pages: 3, records: 23 })
    );

    let service = AgentQueryService::new(Arc::clone(&cache));
    let stats = service.stats().await.unwrap();
    assert_eq!(stats.total, 115);
    for chain in ChainPrefix::ALL {
        assert_eq!(stats.by_chain.get(&chain), Some(&23), "{chain}");
    }

    let evm = service.get("evm:1:demo-evm-00004").await.unwrap().expect("evm agent");
    assert_eq!(evm.name, "demo-evm agent 4");

    let hits = service
        .search("demo", SearchFilter::default().with_chain(ChainPrefix::Aptos).with_page(100, 0))
        .await
        .unwrap();
    assert_eq!(hits.total, 23);
    assert!(hits.items.iter().all(|a| a.chain_prefix == ChainPrefix::Aptos));
}

#[tokio::test]
async fn test_outage_on_one_source_does_not_block_others() {
    let (_dir, cache) = file_backed_cache(3600, 10_000).await;
    let orchestrator = SyncOrchestrator::new(Arc::clone(&cache), orchestrator_config(2));

    let healthy = Arc::new(MockDataSource::with_generated("healthy", ChainPrefix::Sol, 12).unwrap());
    let flaky = Arc::new(MockDataSource::with_generated("flaky", ChainPrefix::Near, 30).unwrap());
    flaky.set_fail_on_page(Some(2));
    orchestrator.register_data_source(healthy.clone()).await.unwrap();
    orchestrator.register_data_source(flaky.clone()).await.unwrap();

    let first = orchestrator.sync_now().await;
    assert!(matches!(first.outcome("healthy"), Some(SourceOutcome::Synced { records: 12, .. })));
    assert!(matches!(
        first.outcome("flaky"),
        Some(SourceOutcome::FetchFailed { pages: 1, records: 10, .. })
    ));

    // The page written before the failure stays committed.
    let near = cache.list(Some(ChainPrefix::Near), PageRequest::new(100, 0)).await.unwrap();
    assert_eq!(near.total, 10);

    // Second failure opens the circuit; the third pass skips the source entirely.
    orchestrator.sync_now().await;
    let calls_before = flaky.fetch_calls();
    let third = orchestrator.sync_now().await;
    assert_eq!(third.outcome("flaky"), Some(&SourceOutcome::Skipped));
    assert_eq!(flaky.fetch_calls(), calls_before);
    assert!(matches!(third.outcome("healthy"), Some(SourceOutcome::Synced { .. })));

    let status = orchestrator.source_status().await;
    let flaky_status = status.iter().find(|s| s.name == "flaky").unwrap();
    assert_eq!(flaky_status.circuit, CircuitState::Open);
    assert_eq!(flaky_status.cursor.as_deref(), Some("10"));
    assert!(flaky_status.last_error.as_deref().unwrap_or_default().contains("page 2"));
}

#[tokio::test]
async fn test_failed_pass_resumes_from_cursor() {
    let (_dir, cache) = file_backed_cache(3600, 10_000).await;
    let orchestrator = SyncOrchestrator::new(Arc::clone(&cache), orchestrator_config(5));
    let source = Arc::new(MockDataSource::with_generated("resumable", ChainPrefix::Sui, 35).unwrap());
    orchestrator.register_data_source(source.clone()).await.unwrap();

    source.set_fail_on_page(Some(3));
    orchestrator.sync_now().await;
    assert_eq!(cache.stats().await.unwrap().total, 20);

    source.set_fail_on_page(None);
    let report = orchestrator.sync_now().await;
    assert_eq!(
        report.outcome("resumable"),
        Some(&SourceOutcome::Synced { pages: 2, records: 15 })
    );
    assert_eq!(cache.stats().await.unwrap().total, 35);

    let requests = source.requests().await;
    let resumed = &requests[requests.len() - 2];
    assert_eq!(resumed.cursor.as_deref(), Some("20"));
    assert!(resumed.updated_since.is_none(), "first full pass has not completed yet");
}

#[tokio::test]
async fn test_capacity_pressure_during_sync() {
    let (_dir, cache) = file_backed_cache(3600, 40).await;
    let orchestrator = SyncOrchestrator::new(Arc::clone(&cache), orchestrator_config(3));
    orchestrator
        .register_data_source(Arc::new(MockDataSource::with_generated("big", ChainPrefix::Sol, 100).unwrap()))
        .await
        .unwrap();

    let report = orchestrator.sync_now().await;
    assert_eq!(report.records_synced(), 100);

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.total, 40);
    assert!(cache.get("sol:big-00099").await.unwrap().is_some());
    assert!(cache.get("sol:big-00000").await.unwrap().is_none());
}

#[tokio::test]
async fn test_background_task_syncs_until_stopped() {
    let (_dir, cache) = file_backed_cache(3600, 10_000).await;
    let orchestrator = Arc::new(SyncOrchestrator::new(Arc::clone(&cache), orchestrator_config(3)));
    let source = Arc::new(MockDataSource::with_generated("bg", ChainPrefix::Sol, 5).unwrap());
    orchestrator.register_data_source(source.clone()).await.unwrap();

    let handle = orchestrator.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop().await;

    assert_eq!(cache.stats().await.unwrap().total, 5);
    let checks_after_stop = source.availability_checks();
    assert!(checks_after_stop >= 2, "startup pass plus at least one tick");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(source.availability_checks(), checks_after_stop);

    // Later passes are incremental.
    let requests = source.requests().await;
    assert!(requests.last().and_then(|r| r.updated_since).is_some());
}
