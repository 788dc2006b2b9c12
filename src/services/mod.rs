pub mod agent_query_service;
pub mod circuit_breaker;
pub mod sync_orchestrator;

pub use agent_query_service::{AgentQueryService, ImportSummary};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use sync_orchestrator::{
    SourceOutcome, SourceReport, SourceState, SourceStatus, SyncHandle, SyncOrchestrator,
    SyncOrchestratorConfig, SyncReport,
};
