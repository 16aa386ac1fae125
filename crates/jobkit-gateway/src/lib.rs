//! Multi-provider LLM routing and reliability core for the Jobkit assistant.
//!
//! The gateway sits between the application and upstream LLM vendors and
//! owns the traffic decisions: prompt complexity analysis, model selection
//! over a configurable catalogue, per-provider circuit breaking, retry with
//! exponential backoff and candidate failover, token-budget optimization,
//! cost tracking with hard and soft budget limits, managed streaming, and
//! windowed performance metrics.
//!
//! Hosts assemble a [`GatewayContext`] once at startup, register one
//! [`ProviderAdapter`] per vendor, and route everything through a
//! [`Router`]:
//!
//! ```no_run
//! use jobkit_gateway::{GatewayContext, Router, TaskCategory, TaskRequest};
//! # use std::sync::Arc;
//! # async fn example(adapter: Arc<dyn jobkit_gateway::ProviderAdapter>) {
//! let context = GatewayContext::builder().with_provider(adapter).build();
//! let router = Router::new(context);
//! let response = router
//!     .execute(TaskRequest::new(
//!         TaskCategory::CoverLetter,
//!         "Draft an opening paragraph for the attached role.",
//!     ))
//!     .await
//!     .unwrap();
//! println!("{} answered: {}", response.provider, response.content);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod breaker;
pub mod budget;
pub mod complexity;
pub mod completion;
pub mod error;
pub mod message;
pub mod metrics;
pub mod mock;
pub mod optimizer;
pub mod provider;
pub mod registry;
pub mod router;
pub mod streaming;
pub mod token;
pub mod util;

pub use breaker::{
    BreakerHealth, BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use budget::{BudgetLimit, BudgetPeriod, BudgetStatus, CostEntry, CostTracker, SpendSummary};
pub use complexity::{ComplexityAnalyzer, ComplexityWeights, TaskComplexity};
pub use completion::{CompletionRequest, CompletionResponse, TokenUsage};
pub use error::{Error, ProviderErrorKind, Result};
pub use message::{Message, MessageRole};
pub use metrics::{
    LatencyStats, MetricType, MetricsCollector, PerformanceMetric, RequestTimer, StreamingMetric,
    StreamingStats, TokenUsageStats,
};
pub use mock::{MockOutcome, MockProvider};
pub use optimizer::{
    OptimizationResult, OptimizationStrategy, OptimizationTechnique, TokenBudget, TokenOptimizer,
};
pub use provider::{ProviderAdapter, StreamEvent};
pub use registry::{
    default_catalog, ModelCapability, ModelConfig, ModelRegistry, SelectionCriteria, TaskCategory,
};
pub use router::{
    AiResponse, GatewayContext, GatewayContextBuilder, ResponseCache, Router, RouterConfig,
    StreamHandle, TaskRequest,
};
pub use streaming::{
    SessionStatus, StreamingChunk, StreamingConfig, StreamingManager, StreamingMode,
    StreamingSession,
};
