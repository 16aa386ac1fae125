//! Token estimation
//!
//! Client-side token estimates use the ~4 characters per token heuristic.
//! Providers report exact usage after the fact; these numbers only gate
//! optimization and budget admission, so a cheap estimate is enough.

use crate::message::Message;

/// Average characters per token across modern tokenizers
const CHARS_PER_TOKEN: usize = 4;

/// Per-message structural overhead (role marker + separators)
const MESSAGE_OVERHEAD: usize = 6;

/// Estimate tokens in a string
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens in a single message, including structural overhead
#[must_use]
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(&message.content) + MESSAGE_OVERHEAD
}

/// Estimate total tokens in a conversation
#[must_use]
pub fn estimate_conversation_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
