use super::StreamingMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Chunks are still flowing
    Active,
    /// Finished cleanly, final chunk emitted
    Completed,
    /// Provider error or idle timeout
    Failed,
    /// Cancelled by the consumer
    Cancelled,
}

/// Book-keeping for one in-flight stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSession {
    /// Session id, also stamped on every chunk
    pub session_id: Uuid,
    /// Provider name
    pub provider: String,
    /// Model id
    pub model: String,
    /// Operation label for metrics
    pub operation: String,
    /// Rechunking mode
    pub mode: StreamingMode,
    /// Current status
    pub status: SessionStatus,
    /// Session creation time
    pub start_time: DateTime<Utc>,
    /// First provider token, if any arrived yet
    pub first_token_time: Option<DateTime<Utc>>,
    /// Chunks emitted so far
    pub total_chunks: u64,
    /// Estimated tokens streamed so far
    pub total_tokens: u64,
}

impl StreamingSession {
    pub(crate) fn new(provider: &str, model: &str, operation: &str, mode: StreamingMode) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            provider: provider.to_string(),
            model: model.to_string(),
            operation: operation.to_string(),
            mode,
            status: SessionStatus::Active,
            start_time: Utc::now(),
            first_token_time: None,
            total_chunks: 0,
            total_tokens: 0,
        }
    }

    /// Milliseconds from first token to now, or from session start when no
    /// token arrived
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        let origin = self.first_token_time.unwrap_or(self.start_time);
        (Utc::now() - origin).num_milliseconds().max(0) as u64
    }
}
