use super::cache::ResponseCache;
use super::context::GatewayContext;
use crate::budget::{round_money, BudgetStatus};
use crate::complexity::TaskComplexity;
use crate::completion::{CompletionRequest, TokenUsage};
use crate::error::{Error, ProviderErrorKind, Result};
use crate::message::Message;
use crate::optimizer::{OptimizationResult, TokenBudget};
use crate::provider::StreamEvent;
use crate::registry::{ModelConfig, SelectionCriteria, TaskCategory};
use crate::streaming::{StreamingChunk, StreamingMode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Safety factor on the word-count cost estimate used for budget admission
const COST_ESTIMATE_FACTOR: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

/// One routed task
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Task category, drives candidate filtering and cost attribution
    pub category: TaskCategory,
    /// The prompt
    pub prompt: String,
    /// Optional supporting context, sent as a system message
    pub context: Option<String>,
    /// Candidate ranking criteria; `None` uses the configured default
    pub criteria: Option<SelectionCriteria>,
    /// Attribution for user-scoped budget limits
    pub user_id: Option<String>,
    /// Attribution for the cost ledger
    pub session_id: Option<String>,
    /// When given, the prompt is optimized to fit before any call
    pub token_budget: Option<TokenBudget>,
    /// Rechunking mode for streaming calls
    pub streaming_mode: StreamingMode,
}

impl TaskRequest {
    /// A request with everything else defaulted
    #[must_use]
    pub fn new(category: TaskCategory, prompt: impl Into<String>) -> Self {
        Self {
            category,
            prompt: prompt.into(),
            context: None,
            criteria: None,
            user_id: None,
            session_id: None,
            token_budget: None,
            streaming_mode: StreamingMode::default(),
        }
    }

    /// Attach supporting context
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Override the ranking criteria
    #[must_use]
    pub fn with_criteria(mut self, criteria: SelectionCriteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    /// Attribute the request to a user
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Constrain the prompt to a token budget
    #[must_use]
    pub fn with_token_budget(mut self, budget: TokenBudget) -> Self {
        self.token_budget = Some(budget);
        self
    }

    /// Set the streaming rechunking mode
    #[must_use]
    pub fn with_streaming_mode(mut self, mode: StreamingMode) -> Self {
        self.streaming_mode = mode;
        self
    }
}

/// A completed routed response. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    /// Generated text
    pub content: String,
    /// Model that answered
    pub model_used: String,
    /// Provider that answered
    pub provider: String,
    /// Heuristic confidence in the model/task pairing, in [0, 1]
    pub confidence_score: f64,
    /// Wall-clock routing time, ms
    pub processing_time_ms: u64,
    /// Provider-reported token usage
    pub token_usage: TokenUsage,
    /// Recorded cost, USD
    pub cost: Decimal,
    /// Complexity tier the request was routed at
    pub complexity_used: TaskComplexity,
    /// Budget statuses in scope after this call
    pub budget_impact: Vec<BudgetStatus>,
    /// Whether the response was streamed
    pub is_streaming: bool,
    /// Optimization report, when a token budget was applied
    pub optimization: Option<OptimizationResult>,
}

/// Handle for one streaming call
pub struct StreamHandle {
    /// The streaming session driving this call
    pub session_id: Uuid,
    /// Ordered chunk stream; ends after the final chunk
    pub chunks: mpsc::Receiver<StreamingChunk>,
    /// Cancelling finalizes the session as failed
    pub cancel: CancellationToken,
    /// Complexity tier the request was routed at
    pub complexity_used: TaskComplexity,
    /// Optimization report, when a token budget was applied
    pub optimization: Option<OptimizationResult>,
}

/// The routing orchestrator
pub struct Router {
    context: Arc<GatewayContext>,
}

struct Admission {
    complexity: TaskComplexity,
    messages: Vec<Message>,
    optimization: Option<OptimizationResult>,
    candidates: Vec<ModelConfig>,
}

impl Router {
    /// Create a router over a shared context
    #[must_use]
    pub fn new(context: Arc<GatewayContext>) -> Self {
        Self { context }
    }

    /// Route a non-streaming request.
    ///
    /// Walks the ranked candidate list up to `max_retries` times; a single
    /// provider failure never fails the request while another eligible
    /// candidate remains. Only exhaustion of every candidate across every
    /// attempt surfaces as [`Error::AllProvidersFailed`].
    #[instrument(skip(self, request), fields(category = %request.category))]
    pub async fn execute(&self, request: TaskRequest) -> Result<AiResponse> {
        let started = Instant::now();
        let admission = self.admit(&request)?;

        let cache_key =
            ResponseCache::key(request.category, admission.complexity, &request.prompt);
        if let Some(hit) = self.context.cache.get(&cache_key) {
            return Ok(hit);
        }

        let mut attempts_made = 0u32;
        let mut last_error: Option<Error> = None;
        // Per-candidate attempt caps, tightened by the observed failure kind.
        let mut allowed: Vec<u32> = vec![
            self.context.config.max_retries;
            admission.candidates.len()
        ];

        for attempt in 0..self.context.config.max_retries {
            let mut budget_rejection: Option<Error> = None;

            for (idx, candidate) in admission.candidates.iter().enumerate() {
                if attempt >= allowed[idx] {
                    continue;
                }
                let Some(adapter) = self.context.providers.get(&candidate.provider) else {
                    continue;
                };

                let breaker = self.context.breakers.breaker(&candidate.provider);
                if !breaker.try_acquire() {
                    debug!(provider = %candidate.provider, "breaker rejected candidate");
                    continue;
                }

                if let Err(rejection) = self
                    .check_admission_budget(&request, &admission.messages, candidate)
                    .await
                {
                    // Not a provider fault; return the admitted slot unused.
                    breaker.release();
                    budget_rejection = Some(rejection);
                    continue;
                }

                attempts_made += 1;
                let timer = self.context.metrics.record_request_start(
                    &candidate.provider,
                    &candidate.model,
                    "generate",
                );
                let completion_request = build_completion_request(candidate, &admission.messages);

                match self.call_adapter(adapter.as_ref(), completion_request).await {
                    Ok(response) => {
                        breaker.record_success();
                        let cost = round_money(
                            Decimal::from(response.usage.total_tokens) * candidate.cost_per_token,
                        );
                        self.context
                            .cost_tracker
                            .record_cost(
                                &candidate.provider,
                                &candidate.model,
                                request.category.cost_category(),
                                response.usage.prompt_tokens,
                                response.usage.completion_tokens,
                                cost,
                                request.user_id.as_deref(),
                                request.session_id.as_deref(),
                            )
                            .await;
                        self.context.metrics.record_completion(
                            timer,
                            true,
                            Some(response.usage),
                            cost.to_f64().unwrap_or(0.0),
                        );
                        let budget_impact = self
                            .context
                            .cost_tracker
                            .check_budget_limits(
                                request.category.cost_category(),
                                Decimal::ZERO,
                                request.user_id.as_deref(),
                            )
                            .await;

                        let answer = AiResponse {
                            content: response.content,
                            model_used: candidate.model.clone(),
                            provider: candidate.provider.clone(),
                            confidence_score: confidence_score(candidate, admission.complexity),
                            processing_time_ms: started.elapsed().as_millis() as u64,
                            token_usage: response.usage,
                            cost,
                            complexity_used: admission.complexity,
                            budget_impact,
                            is_streaming: false,
                            optimization: admission.optimization.clone(),
                        };
                        self.context.cache.insert(cache_key, answer.clone());
                        info!(
                            provider = %answer.provider,
                            model = %answer.model_used,
                            cost = %answer.cost,
                            attempt,
                            "request routed"
                        );
                        return Ok(answer);
                    }
                    Err(failure) => {
                        breaker.record_failure();
                        self.context.metrics.record_completion(timer, false, None, 0.0);
                        if let Some(kind) = failure.provider_kind() {
                            allowed[idx] = kind.max_attempts(self.context.config.max_retries);
                        }
                        warn!(
                            provider = %candidate.provider,
                            model = %candidate.model,
                            error = %failure,
                            attempt,
                            "candidate failed, trying next"
                        );
                        last_error = Some(failure);
                    }
                }
            }

            // Every candidate was rejected on budget: retrying will not
            // produce money.
            if attempts_made == 0 && last_error.is_none() {
                if let Some(rejection) = budget_rejection {
                    return Err(rejection);
                }
            }
            if budget_rejection.is_some() && last_error.is_none() {
                last_error = budget_rejection;
            }

            if attempt + 1 < self.context.config.max_retries {
                let backoff = Duration::from_secs(2u64.saturating_pow(attempt + 1))
                    .min(self.context.config.backoff_cap);
                debug!(?backoff, attempt, "candidate pass exhausted, backing off");
                tokio::time::sleep(backoff).await;
            }
        }

        Err(Error::AllProvidersFailed {
            attempts: attempts_made,
            last_error: Box::new(last_error.unwrap_or_else(|| {
                Error::NotConfigured(request.category.to_string())
            })),
        })
    }

    /// Route a streaming request.
    ///
    /// Admission matches [`Router::execute`], but the cache is bypassed and
    /// there is no mid-stream retry: a candidate that fails to open a stream,
    /// or whose stream dies before its first event, falls through to the next
    /// one, while a stream that fails after the first byte finalizes as
    /// failed.
    #[instrument(skip(self, request), fields(category = %request.category))]
    pub async fn execute_stream(&self, request: TaskRequest) -> Result<StreamHandle> {
        let admission = self.admit(&request)?;

        let mut attempts_made = 0u32;
        let mut last_error: Option<Error> = None;

        for candidate in &admission.candidates {
            let Some(adapter) = self.context.providers.get(&candidate.provider) else {
                continue;
            };
            let breaker = self.context.breakers.breaker(&candidate.provider);
            if !breaker.try_acquire() {
                continue;
            }
            if let Err(rejection) = self
                .check_admission_budget(&request, &admission.messages, candidate)
                .await
            {
                breaker.release();
                if last_error.is_none() {
                    last_error = Some(rejection);
                }
                continue;
            }

            attempts_made += 1;
            let completion_request = build_completion_request(candidate, &admission.messages);
            match adapter.generate_stream(completion_request).await {
                Ok(mut events) => {
                    // A stream that opens and then errors, times out, or
                    // closes before its first event is a candidate failure:
                    // nothing has been delivered, so the next candidate can
                    // still serve the request.
                    let first = match tokio::time::timeout(
                        self.context.config.adapter_timeout,
                        events.recv(),
                    )
                    .await
                    {
                        Ok(Some(StreamEvent::Error(kind))) => {
                            breaker.record_failure();
                            let failure = Error::provider(
                                &candidate.provider,
                                kind,
                                "stream failed before the first token",
                            );
                            warn!(
                                provider = %candidate.provider,
                                error = %failure,
                                "stream died before first event, trying next candidate"
                            );
                            last_error = Some(failure);
                            continue;
                        }
                        Ok(Some(event)) => event,
                        Ok(None) => {
                            breaker.record_failure();
                            let failure = Error::provider(
                                &candidate.provider,
                                ProviderErrorKind::Connection,
                                "stream closed before the first event",
                            );
                            last_error = Some(failure);
                            continue;
                        }
                        Err(_) => {
                            breaker.record_failure();
                            let failure = Error::provider(
                                &candidate.provider,
                                ProviderErrorKind::Timeout,
                                "stream produced no event within the configured timeout",
                            );
                            last_error = Some(failure);
                            continue;
                        }
                    };

                    breaker.record_success();
                    // Streaming spend is ledgered at the admission estimate;
                    // exact usage only exists once the stream finishes.
                    let estimate = estimated_cost(&admission.messages, candidate);
                    self.context
                        .cost_tracker
                        .record_cost(
                            &candidate.provider,
                            &candidate.model,
                            request.category.cost_category(),
                            0,
                            0,
                            estimate,
                            request.user_id.as_deref(),
                            request.session_id.as_deref(),
                        )
                        .await;

                    let session_id = self
                        .context
                        .streaming
                        .create_session(
                            &candidate.provider,
                            &candidate.model,
                            "stream",
                            request.streaming_mode,
                        )
                        .await;
                    let cancel = CancellationToken::new();
                    // Replay the observed first event ahead of the rest of
                    // the provider stream.
                    let (relay_tx, relay_rx) =
                        mpsc::channel(self.context.config.streaming.channel_capacity);
                    let _ = relay_tx.send(first).await;
                    tokio::spawn(async move {
                        while let Some(event) = events.recv().await {
                            if relay_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    });
                    let chunks =
                        self.context
                            .streaming
                            .run(session_id, relay_rx, cancel.clone());
                    info!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        %session_id,
                        "stream opened"
                    );
                    return Ok(StreamHandle {
                        session_id,
                        chunks,
                        cancel,
                        complexity_used: admission.complexity,
                        optimization: admission.optimization,
                    });
                }
                Err(failure) => {
                    breaker.record_failure();
                    warn!(
                        provider = %candidate.provider,
                        error = %failure,
                        "stream open failed, trying next candidate"
                    );
                    last_error = Some(failure);
                }
            }
        }

        match last_error {
            Some(rejection @ Error::BudgetExceeded { .. }) if attempts_made == 0 => Err(rejection),
            last => Err(Error::AllProvidersFailed {
                attempts: attempts_made,
                last_error: Box::new(last.unwrap_or_else(|| {
                    Error::NotConfigured(request.category.to_string())
                })),
            }),
        }
    }

    /// Shared admission path: validation, complexity, optimization,
    /// candidate selection.
    fn admit(&self, request: &TaskRequest) -> Result<Admission> {
        if request.prompt.trim().is_empty() {
            return Err(Error::Validation("prompt must not be empty".to_string()));
        }

        let complexity = self
            .context
            .analyzer
            .analyze(&request.prompt, request.context.as_deref());

        let mut messages = Vec::new();
        if let Some(context) = &request.context {
            messages.push(Message::system(context.clone()));
        }
        messages.push(Message::user(request.prompt.clone()));

        let mut optimization = None;
        if let Some(budget) = &request.token_budget {
            let (optimized, result) =
                self.context
                    .optimizer
                    .optimize_for_budget(&messages, budget, complexity)?;
            messages = optimized;
            optimization = Some(result);
        }

        let criteria = request
            .criteria
            .unwrap_or(self.context.config.default_criteria);
        let candidates =
            self.context
                .registry
                .select_candidates(request.category, complexity, criteria);
        if candidates.is_empty() {
            return Err(Error::NotConfigured(request.category.to_string()));
        }

        Ok(Admission {
            complexity,
            messages,
            optimization,
            candidates,
        })
    }

    async fn check_admission_budget(
        &self,
        request: &TaskRequest,
        messages: &[Message],
        candidate: &ModelConfig,
    ) -> Result<()> {
        let estimate = estimated_cost(messages, candidate);
        let statuses = self
            .context
            .cost_tracker
            .check_budget_limits(
                request.category.cost_category(),
                estimate,
                request.user_id.as_deref(),
            )
            .await;
        for status in statuses {
            if status.hard_limit && status.limit_exceeded {
                warn!(
                    scope = %status.scope,
                    limit = %status.limit,
                    current = %status.current_spend,
                    "hard budget limit rejected candidate"
                );
                return Err(Error::BudgetExceeded {
                    scope: status.scope,
                    limit: status.limit,
                    projected: status.current_spend + round_money(estimate),
                });
            }
        }
        Ok(())
    }

    async fn call_adapter(
        &self,
        adapter: &dyn crate::provider::ProviderAdapter,
        request: CompletionRequest,
    ) -> Result<crate::completion::CompletionResponse> {
        match tokio::time::timeout(self.context.config.adapter_timeout, adapter.generate(request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::provider(
                adapter.name(),
                ProviderErrorKind::Timeout,
                "adapter call exceeded the configured timeout",
            )),
        }
    }
}

fn build_completion_request(candidate: &ModelConfig, messages: &[Message]) -> CompletionRequest {
    CompletionRequest::new(candidate.model.clone())
        .with_messages(messages.to_vec())
        .with_max_tokens(candidate.max_tokens)
        .with_temperature(candidate.temperature)
}

/// Pre-call cost estimate: 1.5 x word count x per-token price
fn estimated_cost(messages: &[Message], candidate: &ModelConfig) -> Decimal {
    let words: usize = messages
        .iter()
        .map(|m| m.content.split_whitespace().count())
        .sum();
    Decimal::from(words as u64) * candidate.cost_per_token * COST_ESTIMATE_FACTOR
}

/// Heuristic model/task pairing confidence.
///
/// Higher tiers are harder, and a model rated above the task gets a small
/// headroom bonus.
fn confidence_score(candidate: &ModelConfig, complexity: TaskComplexity) -> f64 {
    let base: f64 = match complexity {
        TaskComplexity::Simple => 0.92,
        TaskComplexity::Medium => 0.85,
        TaskComplexity::Complex => 0.78,
    };
    let headroom = if candidate.complexity_level > complexity {
        0.05
    } else {
        0.0
    };
    (base + headroom).min(1.0)
}
