//! Mock provider adapter for tests
//!
//! Outcomes are scripted per call: queue successes, failures, or token
//! streams, then assert on how many calls the adapter actually received.

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{Error, ProviderErrorKind, Result};
use crate::provider::{ProviderAdapter, StreamEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A scripted outcome for one adapter call
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return a successful completion with this content
    Success {
        /// Response body
        content: String,
        /// Reported usage
        usage: TokenUsage,
    },
    /// Fail with this error kind
    Failure(ProviderErrorKind),
    /// Stream these tokens, then report `Done` with the given usage
    Stream {
        /// Tokens to emit in order
        tokens: Vec<String>,
        /// Usage reported on `Done`
        usage: TokenUsage,
    },
    /// Fail the stream after emitting this many tokens
    StreamFailure {
        /// Tokens emitted before the failure
        tokens_before_error: Vec<String>,
        /// Error kind emitted last
        kind: ProviderErrorKind,
    },
}

/// A mock provider adapter driven by a queue of scripted outcomes.
///
/// An empty queue yields a default successful completion, so simple tests
/// need no scripting at all.
pub struct MockProvider {
    name: String,
    outcomes: Arc<Mutex<VecDeque<MockOutcome>>>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    /// Create a mock provider with the given name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue an outcome for a future call
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Queue `n` consecutive failures of the same kind
    pub fn push_failures(&self, kind: ProviderErrorKind, n: usize) {
        for _ in 0..n {
            self.push_outcome(MockOutcome::Failure(kind));
        }
    }

    /// Number of calls this adapter has received (generate + stream)
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Option<MockOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_outcome() {
            Some(MockOutcome::Success { content, usage }) => Ok(CompletionResponse {
                content,
                usage,
                model: request.model,
                response_time_ms: 1,
            }),
            Some(MockOutcome::Failure(kind)) => {
                Err(Error::provider(&self.name, kind, "scripted failure"))
            }
            Some(other) => Err(Error::provider(
                &self.name,
                ProviderErrorKind::InvalidRequest,
                format!("streaming outcome {other:?} queued for non-streaming call"),
            )),
            None => Ok(CompletionResponse {
                content: "mock response".to_string(),
                usage: TokenUsage::new(10, 5),
                model: request.model,
                response_time_ms: 1,
            }),
        }
    }

    async fn generate_stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        match self.next_outcome() {
            Some(MockOutcome::Stream { tokens, usage }) => {
                tokio::spawn(async move {
                    for token in tokens {
                        if tx.send(StreamEvent::Token(token)).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(StreamEvent::Done(usage)).await;
                });
                Ok(rx)
            }
            Some(MockOutcome::StreamFailure {
                tokens_before_error,
                kind,
            }) => {
                tokio::spawn(async move {
                    for token in tokens_before_error {
                        if tx.send(StreamEvent::Token(token)).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(StreamEvent::Error(kind)).await;
                });
                Ok(rx)
            }
            Some(MockOutcome::Failure(kind)) => {
                Err(Error::provider(&self.name, kind, "scripted failure"))
            }
            _ => {
                tokio::spawn(async move {
                    let _ = tx.send(StreamEvent::Token("mock".to_string())).await;
                    let _ = tx.send(StreamEvent::Done(TokenUsage::new(10, 1))).await;
                });
                Ok(rx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn test_mock_default_response() {
        let provider = MockProvider::new("mock");
        let request = CompletionRequest::new("mock-model").with_message(Message::user("hi"));
        let response = provider.generate(request).await.unwrap();
        assert_eq!(response.content, "mock response");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_scripted_failure() {
        let provider = MockProvider::new("mock");
        provider.push_failures(ProviderErrorKind::ServerError, 1);
        let err = provider
            .generate(CompletionRequest::new("mock-model"))
            .await
            .unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::ServerError));
    }

    #[tokio::test]
    async fn test_mock_scripted_stream() {
        let provider = MockProvider::new("mock");
        provider.push_outcome(MockOutcome::Stream {
            tokens: vec!["a".into(), "b".into()],
            usage: TokenUsage::new(5, 2),
        });

        let mut rx = provider
            .generate_stream(CompletionRequest::new("mock-model"))
            .await
            .unwrap();

        let mut tokens = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Token(t) => tokens.push(t),
                StreamEvent::Done(usage) => {
                    assert_eq!(usage.completion_tokens, 2);
                    break;
                }
                StreamEvent::Error(kind) => panic!("unexpected stream error: {kind}"),
            }
        }
        assert_eq!(tokens, vec!["a", "b"]);
    }
}
