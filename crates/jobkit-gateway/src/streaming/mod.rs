//! Streaming session management.
//!
//! Providers push raw [`StreamEvent`](crate::provider::StreamEvent)s into a
//! session; the manager rechunks them according to the session's
//! [`StreamingMode`], stamps a strictly increasing sequence number, and emits
//! exactly one final chunk per session. Every finalization records one
//! streaming performance metric, including cancelled and failed sessions.

mod manager;
mod session;


pub use manager::{StreamingConfig, StreamingManager};
pub use session::{SessionStatus, StreamingSession};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How provider tokens are regrouped into consumer-facing chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingMode {
    /// One chunk per provider token
    #[default]
    RealTime,
    /// Flush at `buffer_size` characters or when `chunk_delay` elapses
    Buffered,
    /// Like `Buffered` with a doubled flush threshold
    Batch,
}

impl StreamingMode {
    pub(crate) fn flush_threshold(self, buffer_size: usize) -> usize {
        match self {
            Self::RealTime => 0,
            Self::Buffered => buffer_size,
            Self::Batch => buffer_size * 2,
        }
    }
}

/// One consumer-facing piece of a streamed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingChunk {
    /// Unique chunk id
    pub chunk_id: Uuid,
    /// Owning session
    pub session_id: Uuid,
    /// Strictly increasing from 0 within the session
    pub sequence_number: u64,
    /// Chunk text
    pub content: String,
    /// Estimated tokens in this chunk
    pub token_count: u32,
    /// Set on exactly the last chunk of the session
    pub is_final: bool,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}
