//! Append-only cost ledger entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One spend event. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    /// When the spend occurred
    pub timestamp: DateTime<Utc>,
    /// Provider billed
    pub provider: String,
    /// Model billed
    pub model: String,
    /// Cost-ledger category label
    pub category: String,
    /// Prompt tokens consumed
    pub prompt_tokens: u32,
    /// Completion tokens consumed
    pub completion_tokens: u32,
    /// Cost in USD, 4 decimal places
    pub cost: Decimal,
    /// Requesting user, when known
    pub user_id: Option<String>,
    /// Streaming session, when the spend came from a stream
    pub session_id: Option<String>,
}
