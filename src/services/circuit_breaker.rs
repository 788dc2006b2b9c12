//! Circuit breaker for upstream data sources.
//!
//! Counts consecutive failures of one source and, once the threshold is
//! reached, stops the orchestrator from probing that source until the
//! cooldown has elapsed. After the cooldown a single probe is let through
//! (half-open): success closes the circuit, failure re-opens it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::SyncConfig;

/// Configuration for circuit breakers.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Duration to keep circuit open before trying half-open.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::minutes(10),
        }
    }
}

impl From<&SyncConfig> for CircuitBreakerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            open_timeout: Duration::from_std(config.cooldown()).unwrap_or(Duration::MAX),
        }
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are blocked.
    Open,
    /// Circuit is testing if the source has recovered.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Per-source circuit breaker state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    /// Total times the circuit has opened.
    open_count: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            open_count: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    /// When an open circuit will let the next probe through.
    pub fn retry_after(&self, config: &CircuitBreakerConfig) -> Option<DateTime<Utc>> {
        match self.state {
            CircuitState::Open => self.opened_at.map(|at| at + config.open_timeout),
            _ => None,
        }
    }

    /// Record a failure.
    pub fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        self.record_failure_at(config, Utc::now());
    }

    pub fn record_failure_at(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            // Any failure in half-open reopens the circuit
            CircuitState::HalfOpen => self.open(now),
            CircuitState::Closed if self.consecutive_failures >= config.failure_threshold => {
                self.open(now);
            }
            _ => {}
        }
    }

    /// Record a success.
    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.consecutive_failures = 0;
    }

    /// Check if the circuit allows a request, moving an expired open circuit to half-open.
    pub fn allows(&mut self, config: &CircuitBreakerConfig) -> bool {
        self.allows_at(config, Utc::now())
    }

    pub fn allows_at(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match self.opened_at {
                Some(opened_at) if now >= opened_at + config.open_timeout => {
                    self.state = CircuitState::HalfOpen;
                    true
                }
                _ => false,
            },
        }
    }

    fn open(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.open_count = self.open_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            open_timeout: Duration::seconds(60),
        }
    }

    #[test]
    fn test_circuit_opens_at_threshold() {
        let config = config();
        let mut breaker = CircuitBreaker::new();
        let now = Utc::now();

        breaker.record_failure_at(&config, now);
        breaker.record_failure_at(&config, now);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allows_at(&config, now));
        assert_eq!(breaker.retry_after(&config), None);

        breaker.record_failure_at(&config, now);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.open_count(), 1);
        assert!(!breaker.allows_at(&config, now + Duration::seconds(59)));
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let config = config();
        let mut breaker = CircuitBreaker::new();

        breaker.record_failure(&config);
        breaker.record_failure(&config);
        breaker.record_success();
        breaker.record_failure(&config);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[test]
    fn test_half_open_recovery() {
        let config = config();
        let mut breaker = CircuitBreaker::new();
        let now = Utc::now();
        for _ in 0..3 {
            breaker.record_failure_at(&config, now);
        }

        let later = now + Duration::seconds(60);
        assert!(breaker.allows_at(&config, later));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let config = config();
        let mut breaker = CircuitBreaker::new();
        let now = Utc::now();
        for _ in 0..3 {
            breaker.record_failure_at(&config, now);
        }

        let later = now + Duration::seconds(61);
        assert!(breaker.allows_at(&config, later));
        breaker.record_failure_at(&config, later);

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.open_count(), 2);
        assert_eq!(breaker.retry_after(&config), Some(later + Duration::seconds(60)));
        assert!(!breaker.allows_at(&config, later + Duration::seconds(1)));
    }

    #[test]
    fn test_config_from_sync_config() {
        let sync = SyncConfig {
            failure_threshold: 0,
            cooldown_secs: 30,
            ..SyncConfig::default()
        };
        let config = CircuitBreakerConfig::from(&sync);
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.open_timeout, Duration::seconds(30));
    }

    #[test]
    fn test_open_count_survives_recovery() {
        let config = config();
        let mut breaker = CircuitBreaker::new();
        for _ in 0..3 {
            breaker.record_failure(&config);
        }
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.open_count(), 1);
        assert_eq!(CircuitState::HalfOpen.as_str(), "half_open");
    }
}
