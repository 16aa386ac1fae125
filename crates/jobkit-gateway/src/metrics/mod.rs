//! Performance metrics collection
//!
//! Rolling windowed statistics per provider/model/operation. Each key owns
//! a bounded ring of raw samples; window queries filter by timestamp and
//! compute rank-based percentiles on the fly. A background sweep purges by
//! age independently of queries.

mod collector;


pub use collector::{
    LatencyStats, MetricsCollector, PerformanceMetric, RequestTimer, StreamingMetric,
    StreamingStats, TokenUsageStats,
};

use serde::{Deserialize, Serialize};

/// Kind of a recorded performance sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Request wall-clock latency, milliseconds
    Latency,
    /// Tokens consumed by a request
    TokenUsage,
    /// Cost of a request, USD
    Cost,
    /// Streaming throughput
    Streaming,
}
