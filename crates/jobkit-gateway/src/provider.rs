//! Provider adapter trait
//!
//! Every upstream vendor (OpenAI, Anthropic, Groq, local Ollama, ...) is
//! wrapped by one adapter implementing this trait. The router only ever sees
//! the trait and the closed [`ProviderErrorKind`] failure set, so vendor SDK
//! differences never leak into routing policy.

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{ProviderErrorKind, Result};
use tokio::sync::mpsc;

/// One event on a provider token stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// An incremental piece of generated text
    Token(String),
    /// Stream completed normally, with final usage numbers
    Done(TokenUsage),
    /// Stream failed; no further events follow
    Error(ProviderErrorKind),
}

/// Trait for provider adapters
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic", "groq", "ollama")
    fn name(&self) -> &str;

    /// Execute a completion call
    async fn generate(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Execute a streaming completion call
    ///
    /// The returned channel carries token events as the vendor emits them;
    /// the final event is always `Done` or `Error`.
    async fn generate_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>>;
}
