use super::cache::ResponseCache;
use super::config::RouterConfig;
use crate::breaker::BreakerRegistry;
use crate::budget::CostTracker;
use crate::complexity::ComplexityAnalyzer;
use crate::metrics::MetricsCollector;
use crate::optimizer::TokenOptimizer;
use crate::provider::ProviderAdapter;
use crate::registry::{default_catalog, ModelRegistry};
use crate::streaming::StreamingManager;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything the router needs, constructed once at startup.
///
/// One context per process; hosts build it with [`GatewayContext::builder`]
/// and hand an `Arc` to the router. There are deliberately no lazily
/// initialized globals behind this type.
pub struct GatewayContext {
    pub(super) config: RouterConfig,
    pub(super) registry: ModelRegistry,
    pub(super) providers: HashMap<String, Arc<dyn ProviderAdapter>>,
    pub(super) analyzer: ComplexityAnalyzer,
    pub(super) breakers: BreakerRegistry,
    pub(super) cost_tracker: CostTracker,
    pub(super) metrics: Arc<MetricsCollector>,
    pub(super) streaming: Arc<StreamingManager>,
    pub(super) optimizer: TokenOptimizer,
    pub(super) cache: ResponseCache,
}

impl GatewayContext {
    /// Start building a context
    #[must_use]
    pub fn builder() -> GatewayContextBuilder {
        GatewayContextBuilder::default()
    }

    /// The model catalogue
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The cost ledger and budget limits (admin surface)
    #[must_use]
    pub fn cost_tracker(&self) -> &CostTracker {
        &self.cost_tracker
    }

    /// The metrics collector (admin surface)
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Per-provider breaker health (admin surface)
    #[must_use]
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Drop all cached responses (admin surface)
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }
}

/// Builder for [`GatewayContext`]
#[derive(Default)]
pub struct GatewayContextBuilder {
    config: Option<RouterConfig>,
    registry: Option<ModelRegistry>,
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl GatewayContextBuilder {
    /// Override the default router configuration
    #[must_use]
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the default model catalogue
    #[must_use]
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a provider adapter under its own name
    #[must_use]
    pub fn with_provider(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.insert(adapter.name().to_string(), adapter);
        self
    }

    /// Assemble the context
    #[must_use]
    pub fn build(self) -> Arc<GatewayContext> {
        let config = self.config.unwrap_or_default();
        let registry = self
            .registry
            .unwrap_or_else(|| ModelRegistry::new(default_catalog()));
        let metrics = Arc::new(MetricsCollector::default());
        let streaming = Arc::new(StreamingManager::new(
            config.streaming.clone(),
            Arc::clone(&metrics),
        ));
        Arc::new(GatewayContext {
            analyzer: ComplexityAnalyzer::with_weights(config.complexity_weights.clone()),
            breakers: BreakerRegistry::new(config.breaker.clone()),
            cost_tracker: CostTracker::new(),
            cache: ResponseCache::new(config.cache_ttl),
            optimizer: TokenOptimizer::new(),
            registry,
            providers: self.providers,
            metrics,
            streaming,
            config,
        })
    }
}
