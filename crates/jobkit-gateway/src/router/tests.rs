use super::*;
use crate::breaker::{CircuitBreakerConfig, CircuitState};
use crate::budget::{BudgetLimit, BudgetPeriod};
use crate::complexity::TaskComplexity;
use crate::completion::TokenUsage;
use crate::error::{Error, ProviderErrorKind};
use crate::mock::{MockOutcome, MockProvider};
use crate::registry::{ModelConfig, ModelRegistry, SelectionCriteria, TaskCategory};
use crate::streaming::StreamingMode;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;

fn model(provider: &str, model_name: &str, priority: u32, cost_micros: i64) -> ModelConfig {
    ModelConfig {
        provider: provider.to_string(),
        model: model_name.to_string(),
        temperature: 0.7,
        max_tokens: 1024,
        cost_per_token: Decimal::new(cost_micros, 6),
        capabilities: BTreeSet::new(),
        priority,
        complexity_level: TaskComplexity::Complex,
        tokens_per_minute: 100_000,
        requests_per_minute: 1_000,
        categories: BTreeSet::new(),
    }
}

struct Harness {
    router: Router,
    context: Arc<GatewayContext>,
    primary: Arc<MockProvider>,
    fallback: Arc<MockProvider>,
}

fn harness(config: RouterConfig) -> Harness {
    let primary = Arc::new(MockProvider::new("alpha"));
    let fallback = Arc::new(MockProvider::new("beta"));
    let registry = ModelRegistry::new(vec![
        model("alpha", "alpha-large", 1, 9),
        model("beta", "beta-large", 2, 3),
    ]);
    let context = GatewayContext::builder()
        .with_config(config)
        .with_registry(registry)
        .with_provider(Arc::clone(&primary) as Arc<dyn crate::provider::ProviderAdapter>)
        .with_provider(Arc::clone(&fallback) as Arc<dyn crate::provider::ProviderAdapter>)
        .build();
    Harness {
        router: Router::new(Arc::clone(&context)),
        context,
        primary,
        fallback,
    }
}

fn request(prompt: &str) -> TaskRequest {
    TaskRequest::new(TaskCategory::General, prompt)
}

#[tokio::test]
async fn routes_to_highest_priority_candidate() {
    let h = harness(RouterConfig::default());
    let response = h.router.execute(request("Write a short greeting.")).await.unwrap();

    assert_eq!(response.provider, "alpha");
    assert_eq!(response.model_used, "alpha-large");
    assert_eq!(response.content, "mock response");
    assert!(!response.is_streaming);
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.fallback.call_count(), 0);
    assert!(response.cost > Decimal::ZERO);
}

#[tokio::test]
async fn cost_criteria_prefers_cheapest_model() {
    let h = harness(RouterConfig::default());
    let response = h
        .router
        .execute(
            request("Summarize: The quick brown fox jumps.")
                .with_criteria(SelectionCriteria::Cost),
        )
        .await
        .unwrap();

    // beta-large costs 3 micros/token against alpha-large's 9.
    assert_eq!(response.provider, "beta");
    assert_eq!(response.complexity_used, TaskComplexity::Simple);
}

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let h = harness(RouterConfig::default());
    let first = h.router.execute(request("Write a short greeting.")).await.unwrap();
    let second = h.router.execute(request("Write a short greeting.")).await.unwrap();

    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(first.content, second.content);

    h.context.invalidate_cache();
    h.router.execute(request("Write a short greeting.")).await.unwrap();
    assert_eq!(h.primary.call_count(), 2);
}

#[tokio::test]
async fn failure_falls_over_to_next_candidate() {
    let h = harness(RouterConfig::default());
    h.primary.push_failures(ProviderErrorKind::ServerError, 1);

    let response = h.router.execute(request("Write a short greeting.")).await.unwrap();

    assert_eq!(response.provider, "beta");
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.fallback.call_count(), 1);
    assert_eq!(h.context.breakers().breaker("alpha").failure_count(), 1);
}

#[tokio::test]
async fn open_breaker_skips_provider_without_calling_it() {
    let config = RouterConfig::default()
        .with_max_retries(1)
        .with_breaker(CircuitBreakerConfig::default().with_failure_threshold(5));
    let h = harness(config);
    h.primary.push_failures(ProviderErrorKind::ServerError, 5);

    for i in 0..5 {
        let response = h
            .router
            .execute(request(&format!("greeting number {i}")))
            .await
            .unwrap();
        assert_eq!(response.provider, "beta");
    }
    assert_eq!(h.primary.call_count(), 5);
    assert_eq!(
        h.context.breakers().breaker("alpha").state(),
        CircuitState::Open
    );

    // Sixth request: alpha's breaker rejects before the adapter is reached.
    let response = h.router.execute(request("greeting number six")).await.unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(h.primary.call_count(), 5);
}

#[tokio::test]
async fn hard_budget_limit_rejects_before_any_call() {
    // An expensive catalogue makes the word-count estimate overshoot the
    // remaining 1.00 for every candidate.
    let primary = Arc::new(MockProvider::new("alpha"));
    let context = GatewayContext::builder()
        .with_registry(ModelRegistry::new(vec![model(
            "alpha",
            "alpha-large",
            1,
            2_000_000,
        )]))
        .with_provider(Arc::clone(&primary) as Arc<dyn crate::provider::ProviderAdapter>)
        .build();
    context
        .cost_tracker()
        .add_limit(BudgetLimit::global(
            BudgetPeriod::Daily,
            Decimal::new(5000, 2),
            true,
        ))
        .await;
    // Prior spend today: 49.00 against the 50.00 daily hard limit.
    context
        .cost_tracker()
        .record_cost(
            "alpha",
            "alpha-large",
            "general",
            1_000_000,
            0,
            Decimal::new(4900, 2),
            None,
            None,
        )
        .await;
    let router = Router::new(context);

    let err = router.execute(request("one two three")).await.unwrap_err();
    match err {
        Error::BudgetExceeded { limit, projected, .. } => {
            assert_eq!(limit, Decimal::new(5000, 2));
            assert!(projected > limit);
        }
        other => panic!("expected BudgetExceeded, got {other}"),
    }
    assert_eq!(primary.call_count(), 0);
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let h = harness(RouterConfig::default());
    let err = h.router.execute(request("   ")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.primary.call_count(), 0);
}

#[tokio::test]
async fn unconfigured_catalogue_is_rejected() {
    let context = GatewayContext::builder()
        .with_registry(ModelRegistry::new(Vec::new()))
        .build();
    let router = Router::new(context);
    let err = router.execute(request("hello")).await.unwrap_err();
    assert!(matches!(err, Error::NotConfigured(_)));
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_is_never_retried() {
    let primary = Arc::new(MockProvider::new("alpha"));
    let context = GatewayContext::builder()
        .with_registry(ModelRegistry::new(vec![model("alpha", "alpha-large", 1, 9)]))
        .with_provider(Arc::clone(&primary) as Arc<dyn crate::provider::ProviderAdapter>)
        .build();
    primary.push_failures(ProviderErrorKind::Authentication, 3);
    let router = Router::new(context);

    let err = router.execute(request("hello")).await.unwrap_err();
    match err {
        Error::AllProvidersFailed { attempts, last_error } => {
            assert_eq!(attempts, 1);
            assert_eq!(
                last_error.provider_kind(),
                Some(ProviderErrorKind::Authentication)
            );
        }
        other => panic!("expected AllProvidersFailed, got {other}"),
    }
    assert_eq!(primary.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_failure_is_capped_at_two_attempts() {
    let primary = Arc::new(MockProvider::new("alpha"));
    let context = GatewayContext::builder()
        .with_registry(ModelRegistry::new(vec![model("alpha", "alpha-large", 1, 9)]))
        .with_provider(Arc::clone(&primary) as Arc<dyn crate::provider::ProviderAdapter>)
        .build();
    primary.push_failures(ProviderErrorKind::Unknown, 5);
    let router = Router::new(context);

    let err = router.execute(request("hello")).await.unwrap_err();
    assert!(matches!(err, Error::AllProvidersFailed { attempts: 2, .. }));
    assert_eq!(primary.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn retryable_failures_exhaust_all_attempts() {
    let primary = Arc::new(MockProvider::new("alpha"));
    let context = GatewayContext::builder()
        .with_config(RouterConfig::default().with_breaker(
            CircuitBreakerConfig::default().with_failure_threshold(10),
        ))
        .with_registry(ModelRegistry::new(vec![model("alpha", "alpha-large", 1, 9)]))
        .with_provider(Arc::clone(&primary) as Arc<dyn crate::provider::ProviderAdapter>)
        .build();
    primary.push_failures(ProviderErrorKind::ServerError, 3);
    let router = Router::new(context);

    let err = router.execute(request("hello")).await.unwrap_err();
    assert!(matches!(err, Error::AllProvidersFailed { attempts: 3, .. }));
    assert_eq!(primary.call_count(), 3);
}

#[tokio::test]
async fn streaming_call_yields_ordered_chunks() {
    let h = harness(RouterConfig::default());
    h.primary.push_outcome(MockOutcome::Stream {
        tokens: vec!["Dear ".into(), "hiring ".into(), "manager".into()],
        usage: TokenUsage::new(12, 3),
    });

    let mut handle = h
        .router
        .execute_stream(
            request("Draft a cover letter opening.")
                .with_streaming_mode(StreamingMode::RealTime),
        )
        .await
        .unwrap();

    let mut chunks = Vec::new();
    while let Some(chunk) = handle.chunks.recv().await {
        chunks.push(chunk);
    }
    let body: String = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(body, "Dear hiring manager");
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence_number, i as u64);
    }
    assert_eq!(chunks.iter().filter(|c| c.is_final).count(), 1);
    assert!(chunks.last().unwrap().is_final);

    // Streaming spend is ledgered at the admission estimate.
    let entries = h.context.cost_tracker().recent_entries(10).await;
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn stream_open_failure_falls_over() {
    let h = harness(RouterConfig::default());
    h.primary
        .push_outcome(MockOutcome::Failure(ProviderErrorKind::Connection));
    h.fallback.push_outcome(MockOutcome::Stream {
        tokens: vec!["ok".into()],
        usage: TokenUsage::new(3, 1),
    });

    let mut handle = h
        .router
        .execute_stream(request("Stream something."))
        .await
        .unwrap();
    let mut body = String::new();
    while let Some(chunk) = handle.chunks.recv().await {
        body.push_str(&chunk.content);
    }
    assert_eq!(body, "ok");
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.fallback.call_count(), 1);
    assert_eq!(h.context.breakers().breaker("alpha").failure_count(), 1);
}

#[tokio::test]
async fn stream_dying_before_first_token_falls_over() {
    let h = harness(RouterConfig::default());
    // The stream opens cleanly but its first event is an error.
    h.primary.push_outcome(MockOutcome::StreamFailure {
        tokens_before_error: Vec::new(),
        kind: ProviderErrorKind::ServerError,
    });
    h.fallback.push_outcome(MockOutcome::Stream {
        tokens: vec!["ok".into()],
        usage: TokenUsage::new(3, 1),
    });

    let mut handle = h
        .router
        .execute_stream(request("Stream something."))
        .await
        .unwrap();
    let mut body = String::new();
    while let Some(chunk) = handle.chunks.recv().await {
        body.push_str(&chunk.content);
    }
    assert_eq!(body, "ok");
    assert_eq!(h.primary.call_count(), 1);
    assert_eq!(h.fallback.call_count(), 1);
    assert_eq!(h.context.breakers().breaker("alpha").failure_count(), 1);

    // Only the candidate that actually delivered is ledgered.
    let entries = h.context.cost_tracker().recent_entries(10).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].provider, "beta");
}

#[tokio::test]
async fn stream_failing_after_first_token_does_not_fall_over() {
    let h = harness(RouterConfig::default());
    h.primary.push_outcome(MockOutcome::StreamFailure {
        tokens_before_error: vec!["partial".into()],
        kind: ProviderErrorKind::ServerError,
    });

    let mut handle = h
        .router
        .execute_stream(
            request("Stream something.").with_streaming_mode(StreamingMode::RealTime),
        )
        .await
        .unwrap();
    let mut body = String::new();
    while let Some(chunk) = handle.chunks.recv().await {
        body.push_str(&chunk.content);
    }
    // Delivered tokens reach the consumer; the session fails without retry.
    assert_eq!(body, "partial");
    assert_eq!(h.fallback.call_count(), 0);
}

#[tokio::test]
async fn response_records_budget_impact_and_metrics() {
    let h = harness(RouterConfig::default());
    h.context
        .cost_tracker()
        .add_limit(
            BudgetLimit::global(BudgetPeriod::Daily, Decimal::new(10_0000, 4), false)
                .with_alert_threshold(0.5),
        )
        .await;

    let response = h.router.execute(request("Write a short greeting.")).await.unwrap();
    assert_eq!(response.budget_impact.len(), 1);
    assert!(!response.budget_impact[0].limit_exceeded);

    let stats = h
        .context
        .metrics()
        .latency_stats(
            "alpha",
            "alpha-large",
            "generate",
            std::time::Duration::from_secs(60),
        )
        .unwrap();
    assert_eq!(stats.count, 1);
}
