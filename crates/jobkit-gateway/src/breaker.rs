//! Per-provider circuit breakers
//!
//! A breaker stops traffic to a failing provider until it has had time to
//! recover:
//! - Closed: normal operation, calls pass through
//! - Open: failure threshold reached, calls are rejected
//! - HalfOpen: open timeout elapsed, exactly one trial call is admitted
//!
//! One breaker exists per provider and is shared by every concurrent
//! request; transitions take a per-breaker lock, never a process-wide one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failures exceeded threshold - calls are rejected
    Open,
    /// Testing recovery - one trial call admitted
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breakers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long an open circuit stays closed to traffic
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set open timeout
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

/// Circuit breaker for one provider
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    opened_at: AtomicU64,
    // Guards the single trial call while half-open
    probe_in_flight: AtomicBool,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(provider: impl Into<String>) -> Self {
        Self::new(provider, CircuitBreakerConfig::default())
    }

    /// Provider this breaker guards
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Current consecutive failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Ask to admit one call.
    ///
    /// Closed admits unconditionally. Open rejects until `open_timeout` has
    /// elapsed, then moves to HalfOpen and admits exactly one trial call;
    /// further callers are rejected until that trial reports its outcome.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = self.opened_at.load(Ordering::SeqCst);
                let elapsed = Duration::from_millis(current_timestamp().saturating_sub(opened_at));
                if elapsed > self.config.open_timeout {
                    self.half_open()
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => !self.probe_in_flight.swap(true, Ordering::SeqCst),
        }
    }

    /// Record a successful call outcome
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                info!(provider = %self.provider, "trial call succeeded, closing circuit");
                self.close();
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call outcome
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    provider = %self.provider,
                    failures,
                    threshold = self.config.failure_threshold,
                    "breaker failure recorded"
                );
                if failures >= self.config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => {
                warn!(provider = %self.provider, "trial call failed, reopening circuit");
                self.open();
            }
            CircuitState::Open => {}
        }
    }

    /// Return an admitted slot without recording an outcome, for callers
    /// that acquired but never made the call.
    pub fn release(&self) {
        if self.state() == CircuitState::HalfOpen {
            self.probe_in_flight.store(false, Ordering::SeqCst);
        }
    }

    /// Force the breaker back to Closed (admin surface)
    pub fn reset(&self) {
        self.close();
    }

    /// When the circuit opened, as a unix-millisecond timestamp
    #[must_use]
    pub fn opened_at_ms(&self) -> Option<u64> {
        match self.state() {
            CircuitState::Closed => None,
            _ => Some(self.opened_at.load(Ordering::SeqCst)),
        }
    }

    fn open(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state != CircuitState::Open {
            info!(
                provider = %self.provider,
                failures = self.failure_count.load(Ordering::SeqCst),
                "circuit opened"
            );
        }
        *state = CircuitState::Open;
        self.opened_at.store(current_timestamp(), Ordering::SeqCst);
        self.probe_in_flight.store(false, Ordering::SeqCst);
    }

    /// Move Open -> HalfOpen and claim the trial slot. Returns whether this
    /// caller won the slot; with concurrent callers only one does.
    fn half_open(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match *state {
            CircuitState::Open => {
                info!(provider = %self.provider, "circuit entering half-open state");
                *state = CircuitState::HalfOpen;
                self.probe_in_flight.store(true, Ordering::SeqCst);
                true
            }
            // Lost the race to another caller
            CircuitState::HalfOpen => !self.probe_in_flight.swap(true, Ordering::SeqCst),
            CircuitState::Closed => true,
        }
    }

    fn close(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state != CircuitState::Closed {
            info!(provider = %self.provider, "circuit closed");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
        self.probe_in_flight.store(false, Ordering::SeqCst);
    }
}

/// Health snapshot of one breaker (admin surface)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerHealth {
    /// Provider name
    pub provider: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub failure_count: u32,
    /// When the circuit opened, unix milliseconds
    pub opened_at_ms: Option<u64>,
}

/// Registry of per-provider breakers, created lazily on first use
#[derive(Default)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create a registry with the given per-breaker configuration
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the breaker for a provider
    #[must_use]
    pub fn breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self
            .breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(provider)
        {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            breakers
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(provider, self.config.clone()))),
        )
    }

    /// Health snapshot for every known provider
    #[must_use]
    pub fn health(&self) -> Vec<BreakerHealth> {
        let breakers = self.breakers.read().unwrap_or_else(|e| e.into_inner());
        let mut health: Vec<BreakerHealth> = breakers
            .values()
            .map(|b| BreakerHealth {
                provider: b.provider().to_string(),
                state: b.state(),
                failure_count: b.failure_count(),
                opened_at_ms: b.opened_at_ms(),
            })
            .collect();
        health.sort_by(|a, b| a.provider.cmp(&b.provider));
        health
    }
}

/// Current timestamp in unix milliseconds
fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_closed() {
        let breaker = CircuitBreaker::with_defaults("openai");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let config = CircuitBreakerConfig::new().with_failure_threshold(5);
        let breaker = CircuitBreaker::new("openai", config);

        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::with_defaults("openai");
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 2);

        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_within_timeout() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_open_timeout(Duration::from_secs(60));
        let breaker = CircuitBreaker::new("openai", config);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        for _ in 0..10 {
            assert!(!breaker.try_acquire());
        }
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_open_timeout(Duration::from_millis(0));
        let breaker = CircuitBreaker::new("openai", config);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Timeout of zero has elapsed; first caller gets the trial slot
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Trial still in flight; everyone else is rejected
        assert!(!breaker.try_acquire());
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_half_open_success_closes() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_open_timeout(Duration::from_millis(0));
        let breaker = CircuitBreaker::new("openai", config);
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.try_acquire());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_open_timeout(Duration::from_millis(0));
        let breaker = CircuitBreaker::new("openai", config);
        breaker.record_failure();
        let first_opened = breaker.opened_at_ms().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        // opened_at is reset so the timeout starts over
        assert!(breaker.opened_at_ms().unwrap() >= first_opened);
    }

    #[test]
    fn test_reset_closes_circuit() {
        let config = CircuitBreakerConfig::new().with_failure_threshold(1);
        let breaker = CircuitBreaker::new("openai", config);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_registry_shares_breaker_per_provider() {
        let registry = BreakerRegistry::default();
        let a = registry.breaker("openai");
        let b = registry.breaker("openai");
        a.record_failure();
        assert_eq!(b.failure_count(), 1);

        let health = registry.health();
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].provider, "openai");
        assert_eq!(health[0].failure_count, 1);
    }
}
