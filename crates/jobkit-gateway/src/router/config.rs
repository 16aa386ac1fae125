use crate::breaker::CircuitBreakerConfig;
use crate::complexity::ComplexityWeights;
use crate::registry::SelectionCriteria;
use crate::streaming::StreamingConfig;
use std::time::Duration;

/// Router tuning knobs
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Full passes over the candidate list before giving up
    pub max_retries: u32,
    /// Ceiling on the exponential inter-attempt backoff
    pub backoff_cap: Duration,
    /// Per-call adapter timeout; elapsing counts as a provider failure
    pub adapter_timeout: Duration,
    /// Response cache time-to-live
    pub cache_ttl: Duration,
    /// Default ranking criteria when the request does not specify one
    pub default_criteria: SelectionCriteria,
    /// Complexity scoring weights
    pub complexity_weights: ComplexityWeights,
    /// Per-provider breaker parameters
    pub breaker: CircuitBreakerConfig,
    /// Streaming buffer parameters
    pub streaming: StreamingConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_cap: Duration::from_secs(30),
            adapter_timeout: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(300),
            default_criteria: SelectionCriteria::Quality,
            complexity_weights: ComplexityWeights::default(),
            breaker: CircuitBreakerConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Set the number of full candidate passes
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the per-call adapter timeout
    #[must_use]
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Set the response cache time-to-live
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the breaker parameters
    #[must_use]
    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}
