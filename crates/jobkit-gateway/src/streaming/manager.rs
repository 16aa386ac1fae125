use super::{SessionStatus, StreamingChunk, StreamingMode, StreamingSession};
use crate::metrics::{MetricsCollector, StreamingMetric};
use crate::provider::StreamEvent;
use crate::token::estimate_tokens;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Baseline generation rate used for the efficiency metric
const NOMINAL_TOKENS_PER_SECOND: f64 = 50.0;

/// Tuning knobs for chunk buffering and session hygiene
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Flush threshold in characters for [`StreamingMode::Buffered`]
    pub buffer_size: usize,
    /// Maximum time a partial buffer may wait before flushing
    pub chunk_delay: Duration,
    /// Outbound chunk channel capacity
    pub channel_capacity: usize,
    /// Sessions idle longer than this are failed by [`StreamingManager::sweep_idle`]
    pub max_idle: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            chunk_delay: Duration::from_millis(100),
            channel_capacity: 64,
            max_idle: Duration::from_secs(3600),
        }
    }
}

struct SessionEntry {
    session: StreamingSession,
    last_activity: DateTime<Utc>,
}

/// Rechunks provider token streams and tracks session lifecycles
pub struct StreamingManager {
    config: StreamingConfig,
    metrics: Arc<MetricsCollector>,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl StreamingManager {
    /// Create a manager that reports finalized sessions into `metrics`
    #[must_use]
    pub fn new(config: StreamingConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            config,
            metrics,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session and return its id
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        provider: &str,
        model: &str,
        operation: &str,
        mode: StreamingMode,
    ) -> Uuid {
        let session = StreamingSession::new(provider, model, operation, mode);
        let session_id = session.session_id;
        self.sessions.write().await.insert(
            session_id,
            SessionEntry {
                session,
                last_activity: Utc::now(),
            },
        );
        debug!(%session_id, provider, model, "streaming session created");
        session_id
    }

    /// Snapshot of a session, if it is still tracked
    pub async fn session(&self, session_id: Uuid) -> Option<StreamingSession> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|e| e.session.clone())
    }

    /// Sessions currently in [`SessionStatus::Active`]
    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|e| e.session.status == SessionStatus::Active)
            .count()
    }

    /// Drive a session: consume provider events, emit rechunked output.
    ///
    /// The returned receiver yields chunks with strictly increasing sequence
    /// numbers and exactly one final chunk. Cancellation or a provider error
    /// finalizes the session as failed; tokens already consumed are still
    /// reported to the metrics collector.
    pub fn run(
        self: &Arc<Self>,
        session_id: Uuid,
        events: mpsc::Receiver<StreamEvent>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamingChunk> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.pump(session_id, events, cancel, tx).await;
        });
        rx
    }

    async fn pump(
        &self,
        session_id: Uuid,
        mut events: mpsc::Receiver<StreamEvent>,
        cancel: CancellationToken,
        tx: mpsc::Sender<StreamingChunk>,
    ) {
        let mode = match self.session(session_id).await {
            Some(s) => s.mode,
            None => {
                warn!(%session_id, "run called for unknown streaming session");
                return;
            }
        };
        let threshold = mode.flush_threshold(self.config.buffer_size);

        let mut buffer = String::new();
        // The chunk carries the arrival time of its first token, so the first
        // chunk's timestamp matches the session's first_token_time exactly.
        let mut buffer_started: Option<DateTime<Utc>> = None;
        let mut sequence = 0u64;
        let mut total_chars = 0usize;
        let mut reported_tokens: Option<u64> = None;
        let mut flush_deadline: Option<tokio::time::Instant> = None;
        let mut status = SessionStatus::Completed;

        loop {
            let delay = async {
                match flush_deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                () = cancel.cancelled() => {
                    status = SessionStatus::Cancelled;
                    break;
                }
                () = delay => {
                    flush_deadline = None;
                    self.flush(session_id, &mut buffer, &mut buffer_started, &mut sequence, false, &tx).await;
                }
                event = events.recv() => match event {
                    Some(StreamEvent::Token(token)) => {
                        let arrived = Utc::now();
                        self.mark_first_token(session_id, arrived).await;
                        if buffer.is_empty() {
                            buffer_started = Some(arrived);
                        }
                        total_chars += token.chars().count();
                        buffer.push_str(&token);
                        if buffer.chars().count() >= threshold {
                            flush_deadline = None;
                            self.flush(session_id, &mut buffer, &mut buffer_started, &mut sequence, false, &tx).await;
                        } else if flush_deadline.is_none() {
                            flush_deadline =
                                Some(tokio::time::Instant::now() + self.config.chunk_delay);
                        }
                    }
                    Some(StreamEvent::Done(usage)) => {
                        reported_tokens = Some(u64::from(usage.completion_tokens));
                        break;
                    }
                    Some(StreamEvent::Error(kind)) => {
                        warn!(%session_id, kind = kind.as_str(), "provider stream failed");
                        status = SessionStatus::Failed;
                        break;
                    }
                    None => break,
                },
            }
        }

        // The remainder always ships as the single final chunk, even empty.
        self.flush(
            session_id,
            &mut buffer,
            &mut buffer_started,
            &mut sequence,
            true,
            &tx,
        )
        .await;
        self.finalize(session_id, status, reported_tokens, total_chars, sequence)
            .await;
    }

    async fn flush(
        &self,
        session_id: Uuid,
        buffer: &mut String,
        buffer_started: &mut Option<DateTime<Utc>>,
        sequence: &mut u64,
        is_final: bool,
        tx: &mpsc::Sender<StreamingChunk>,
    ) {
        if buffer.is_empty() && !is_final {
            return;
        }
        let content = std::mem::take(buffer);
        let token_count = estimate_tokens(&content) as u32;
        let chunk = StreamingChunk {
            chunk_id: Uuid::new_v4(),
            session_id,
            sequence_number: *sequence,
            content,
            token_count,
            is_final,
            timestamp: buffer_started.take().unwrap_or_else(Utc::now),
        };
        *sequence += 1;

        // A dropped consumer stops emission but not session accounting.
        let _ = tx.send(chunk).await;

        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&session_id) {
            entry.session.total_chunks += 1;
            entry.session.total_tokens += u64::from(token_count);
            entry.last_activity = Utc::now();
        }
    }

    async fn mark_first_token(&self, session_id: Uuid, arrived: DateTime<Utc>) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&session_id) {
            if entry.session.first_token_time.is_none() {
                entry.session.first_token_time = Some(arrived);
            }
            entry.last_activity = arrived;
        }
    }

    #[instrument(skip(self))]
    async fn finalize(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        reported_tokens: Option<u64>,
        total_chars: usize,
        chunk_count: u64,
    ) {
        let session = {
            let mut sessions = self.sessions.write().await;
            let Some(entry) = sessions.get_mut(&session_id) else {
                return;
            };
            // First finalization wins. The pump may still be draining when
            // sweep_idle has already failed the session; a second pass here
            // must not rewrite the status or double-count the metric.
            if entry.session.status != SessionStatus::Active {
                debug!(%session_id, ?status, "session already finalized, ignoring");
                return;
            }
            entry.session.status = status;
            if let Some(tokens) = reported_tokens {
                entry.session.total_tokens = tokens;
            }
            entry.last_activity = Utc::now();
            entry.session.clone()
        };

        let total_time_ms = session.elapsed_ms();
        let secs = (total_time_ms as f64 / 1000.0).max(0.001);
        let tokens = session.total_tokens as f64;
        let estimated_min_secs = tokens / NOMINAL_TOKENS_PER_SECOND;

        self.metrics.record_streaming(
            &session.provider,
            &session.model,
            &session.operation,
            StreamingMetric {
                timestamp: Utc::now(),
                tokens_per_second: tokens / secs,
                total_time_ms,
                chunk_count,
                avg_chunk_size: if chunk_count == 0 {
                    0.0
                } else {
                    total_chars as f64 / chunk_count as f64
                },
                efficiency: (estimated_min_secs / secs).min(1.0),
                success: status == SessionStatus::Completed,
            },
        );
        debug!(%session_id, ?status, chunk_count, "streaming session finalized");
    }

    /// Fail sessions idle longer than the configured limit and drop finished
    /// ones. Returns the number of sessions failed.
    pub async fn sweep_idle(&self) -> usize {
        let now = Utc::now();
        let max_idle = chrono::Duration::from_std(self.config.max_idle)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let stale: Vec<Uuid> = {
            let mut sessions = self.sessions.write().await;
            sessions.retain(|_, e| e.session.status == SessionStatus::Active);
            sessions
                .iter()
                .filter(|(_, e)| now - e.last_activity > max_idle)
                .map(|(id, _)| *id)
                .collect()
        };
        for session_id in &stale {
            warn!(%session_id, "streaming session idle past limit");
            self.finalize(*session_id, SessionStatus::Failed, None, 0, 0)
                .await;
        }
        stale.len()
    }
}
