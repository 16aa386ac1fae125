//! Ring-buffered sample storage and window queries

use super::MetricType;
use crate::completion::TokenUsage;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default per-key ring capacity
const DEFAULT_CAPACITY: usize = 10_000;

/// Default sample max age for the background sweep
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// One raw request sample
#[derive(Debug, Clone)]
struct RequestSample {
    timestamp: DateTime<Utc>,
    latency_ms: f64,
    success: bool,
    prompt_tokens: u64,
    completion_tokens: u64,
    cost: f64,
}

/// One finalized streaming sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingMetric {
    /// When the stream finalized
    pub timestamp: DateTime<Utc>,
    /// Completion tokens per second
    pub tokens_per_second: f64,
    /// Stream duration, milliseconds
    pub total_time_ms: u64,
    /// Chunks emitted
    pub chunk_count: u64,
    /// Mean chunk size, characters
    pub avg_chunk_size: f64,
    /// min(1, estimated minimum time / actual time)
    pub efficiency: f64,
    /// Whether the stream finished cleanly
    pub success: bool,
}

/// One typed row flattened from the raw sample stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    /// When the underlying sample was recorded
    pub timestamp: DateTime<Utc>,
    /// What the value measures
    pub metric: MetricType,
    /// Latency in ms, token count, cost in USD, or tokens per second
    pub value: f64,
    /// Whether the underlying request or stream succeeded
    pub success: bool,
}

/// Latency distribution over a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Samples in the window
    pub count: usize,
    /// Mean latency, ms
    pub mean_ms: f64,
    /// Median latency, ms (nearest rank)
    pub median_ms: f64,
    /// 95th percentile, ms (nearest rank)
    pub p95_ms: f64,
    /// 99th percentile, ms (nearest rank)
    pub p99_ms: f64,
}

/// Token consumption over a window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsageStats {
    /// Requests counted
    pub requests: usize,
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
    /// Total cost, USD (approximate; the ledger is authoritative)
    pub total_cost: f64,
}

/// Streaming behavior over a window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingStats {
    /// Streams counted
    pub count: usize,
    /// Mean tokens per second
    pub avg_tokens_per_second: f64,
    /// Mean chunk size, characters
    pub avg_chunk_size: f64,
    /// Mean efficiency
    pub avg_efficiency: f64,
    /// Chunks across all streams
    pub total_chunks: u64,
}

/// Handle returned by [`MetricsCollector::record_request_start`]
#[derive(Debug)]
pub struct RequestTimer {
    key: String,
    started: Instant,
}

impl RequestTimer {
    /// Elapsed wall-clock time since the request started
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

type Ring<T> = Arc<Mutex<VecDeque<T>>>;

/// Windowed per-provider/model/operation performance statistics
pub struct MetricsCollector {
    capacity: usize,
    max_age: Duration,
    requests: RwLock<HashMap<String, Ring<RequestSample>>>,
    streams: RwLock<HashMap<String, Ring<StreamingMetric>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_MAX_AGE)
    }
}

impl MetricsCollector {
    /// Create a collector with the given ring capacity and sample max age
    #[must_use]
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            capacity,
            max_age,
            requests: RwLock::new(HashMap::new()),
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Start timing a request
    #[must_use]
    pub fn record_request_start(&self, provider: &str, model: &str, operation: &str) -> RequestTimer {
        RequestTimer {
            key: metric_key(provider, model, operation),
            started: Instant::now(),
        }
    }

    /// Record the outcome of a timed request
    pub fn record_completion(
        &self,
        timer: RequestTimer,
        success: bool,
        usage: Option<TokenUsage>,
        cost: f64,
    ) {
        let sample = RequestSample {
            timestamp: Utc::now(),
            latency_ms: timer.elapsed_ms(),
            success,
            prompt_tokens: u64::from(usage.map_or(0, |u| u.prompt_tokens)),
            completion_tokens: u64::from(usage.map_or(0, |u| u.completion_tokens)),
            cost,
        };
        push_bounded(&self.requests, &timer.key, sample, self.capacity);
    }

    /// Record a finalized streaming session
    pub fn record_streaming(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
        metric: StreamingMetric,
    ) {
        let key = metric_key(provider, model, operation);
        push_bounded(&self.streams, &key, metric, self.capacity);
    }

    /// Latency distribution inside the window, or `None` with no samples
    #[must_use]
    pub fn latency_stats(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
        window: Duration,
    ) -> Option<LatencyStats> {
        let cutoff = window_cutoff(window);
        let mut latencies: Vec<f64> = self
            .request_samples(provider, model, operation)?
            .into_iter()
            .filter(|s| s.timestamp >= cutoff)
            .map(|s| s.latency_ms)
            .collect();
        if latencies.is_empty() {
            return None;
        }
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = latencies.len();
        Some(LatencyStats {
            count,
            mean_ms: latencies.iter().sum::<f64>() / count as f64,
            median_ms: nearest_rank(&latencies, 50.0),
            p95_ms: nearest_rank(&latencies, 95.0),
            p99_ms: nearest_rank(&latencies, 99.0),
        })
    }

    /// Fraction of successful requests inside the window
    #[must_use]
    pub fn success_rate(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
        window: Duration,
    ) -> Option<f64> {
        let cutoff = window_cutoff(window);
        let samples: Vec<RequestSample> = self
            .request_samples(provider, model, operation)?
            .into_iter()
            .filter(|s| s.timestamp >= cutoff)
            .collect();
        if samples.is_empty() {
            return None;
        }
        let successes = samples.iter().filter(|s| s.success).count();
        Some(successes as f64 / samples.len() as f64)
    }

    /// Token and cost totals inside the window
    #[must_use]
    pub fn token_usage(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
        window: Duration,
    ) -> TokenUsageStats {
        let cutoff = window_cutoff(window);
        let mut stats = TokenUsageStats::default();
        let Some(samples) = self.request_samples(provider, model, operation) else {
            return stats;
        };
        for sample in samples.into_iter().filter(|s| s.timestamp >= cutoff) {
            stats.requests += 1;
            stats.prompt_tokens += sample.prompt_tokens;
            stats.completion_tokens += sample.completion_tokens;
            stats.total_tokens += sample.prompt_tokens + sample.completion_tokens;
            stats.total_cost += sample.cost;
        }
        stats
    }

    /// Streaming aggregates inside the window, or `None` with no samples
    #[must_use]
    pub fn streaming_stats(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
        window: Duration,
    ) -> Option<StreamingStats> {
        let cutoff = window_cutoff(window);
        let key = metric_key(provider, model, operation);
        let ring = Arc::clone(
            self.streams
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(&key)?,
        );
        let samples: Vec<StreamingMetric> = ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect();
        if samples.is_empty() {
            return None;
        }

        let count = samples.len();
        Some(StreamingStats {
            count,
            avg_tokens_per_second: samples.iter().map(|s| s.tokens_per_second).sum::<f64>()
                / count as f64,
            avg_chunk_size: samples.iter().map(|s| s.avg_chunk_size).sum::<f64>() / count as f64,
            avg_efficiency: samples.iter().map(|s| s.efficiency).sum::<f64>() / count as f64,
            total_chunks: samples.iter().map(|s| s.chunk_count).sum(),
        })
    }

    /// Raw samples inside the window, flattened into typed rows and sorted
    /// by timestamp.
    ///
    /// Each request sample yields a [`MetricType::Latency`],
    /// [`MetricType::TokenUsage`] and [`MetricType::Cost`] row; each
    /// finalized stream yields a [`MetricType::Streaming`] throughput row.
    #[must_use]
    pub fn recent_samples(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
        window: Duration,
    ) -> Vec<PerformanceMetric> {
        let cutoff = window_cutoff(window);
        let mut rows = Vec::new();

        if let Some(samples) = self.request_samples(provider, model, operation) {
            for sample in samples.into_iter().filter(|s| s.timestamp >= cutoff) {
                rows.push(PerformanceMetric {
                    timestamp: sample.timestamp,
                    metric: MetricType::Latency,
                    value: sample.latency_ms,
                    success: sample.success,
                });
                rows.push(PerformanceMetric {
                    timestamp: sample.timestamp,
                    metric: MetricType::TokenUsage,
                    value: (sample.prompt_tokens + sample.completion_tokens) as f64,
                    success: sample.success,
                });
                rows.push(PerformanceMetric {
                    timestamp: sample.timestamp,
                    metric: MetricType::Cost,
                    value: sample.cost,
                    success: sample.success,
                });
            }
        }

        let key = metric_key(provider, model, operation);
        let stream_ring = self
            .streams
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .map(Arc::clone);
        if let Some(ring) = stream_ring {
            for sample in ring
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .filter(|s| s.timestamp >= cutoff)
            {
                rows.push(PerformanceMetric {
                    timestamp: sample.timestamp,
                    metric: MetricType::Streaming,
                    value: sample.tokens_per_second,
                    success: sample.success,
                });
            }
        }

        rows.sort_by_key(|r| r.timestamp);
        rows
    }

    /// Drop all samples older than the configured max age.
    ///
    /// Intended for a periodic background task; queries never depend on it.
    pub fn purge_expired(&self) {
        let cutoff = window_cutoff(self.max_age);
        let mut purged = 0usize;
        for ring in self
            .requests
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
        {
            let mut ring = ring.lock().unwrap_or_else(|e| e.into_inner());
            let before = ring.len();
            ring.retain(|s| s.timestamp >= cutoff);
            purged += before - ring.len();
        }
        for ring in self
            .streams
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
        {
            let mut ring = ring.lock().unwrap_or_else(|e| e.into_inner());
            let before = ring.len();
            ring.retain(|s| s.timestamp >= cutoff);
            purged += before - ring.len();
        }
        if purged > 0 {
            debug!(purged, "expired metric samples swept");
        }
    }

    fn request_samples(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
    ) -> Option<Vec<RequestSample>> {
        let key = metric_key(provider, model, operation);
        let ring = Arc::clone(
            self.requests
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(&key)?,
        );
        let samples = ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        Some(samples)
    }
}

fn metric_key(provider: &str, model: &str, operation: &str) -> String {
    format!("{provider}:{model}:{operation}")
}

fn window_cutoff(window: Duration) -> DateTime<Utc> {
    Utc::now()
        - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::days(365 * 100))
}

/// Append under the per-key lock, evicting the oldest sample at capacity
fn push_bounded<T>(map: &RwLock<HashMap<String, Ring<T>>>, key: &str, sample: T, capacity: usize) {
    let ring = {
        let read = map.read().unwrap_or_else(|e| e.into_inner());
        read.get(key).map(Arc::clone)
    };
    let ring = match ring {
        Some(ring) => ring,
        None => {
            let mut write = map.write().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                write
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new()))),
            )
        }
    };
    let mut ring = ring.lock().unwrap_or_else(|e| e.into_inner());
    if ring.len() == capacity {
        ring.pop_front();
    }
    ring.push_back(sample);
}

/// Nearest-rank percentile over an ascending-sorted slice
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
