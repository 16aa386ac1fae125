use super::*;
use rust_decimal::Decimal;

fn usd(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[tokio::test]
async fn test_record_cost_rounds_half_up() {
    let tracker = CostTracker::new();
    let entry = tracker
        .record_cost(
            "openai",
            "gpt-4o",
            "general",
            100,
            50,
            Decimal::new(1_234_55, 7), // 0.0123455 -> 0.0123
            None,
            None,
        )
        .await;
    assert_eq!(entry.cost, Decimal::new(123, 4));
}

#[tokio::test]
async fn test_round_money_half_up() {
    assert_eq!(round_money(Decimal::new(12345, 5)), Decimal::new(1235, 4)); // 0.12345 -> 0.1235
    assert_eq!(round_money(Decimal::new(12344, 5)), Decimal::new(1234, 4)); // 0.12344 -> 0.1234
}

#[tokio::test]
async fn test_hard_daily_limit_rejects_projected_overrun() {
    // Scenario: daily hard cap of 50.00, 49.00 already spent, 2.00 estimated
    let tracker = CostTracker::new();
    tracker
        .add_limit(BudgetLimit::global(BudgetPeriod::Daily, usd(50_00), true))
        .await;
    tracker
        .record_cost("openai", "gpt-4o", "general", 1000, 500, usd(49_00), None, None)
        .await;

    let statuses = tracker.check_budget_limits("general", usd(2_00), None).await;
    assert_eq!(statuses.len(), 1);
    let status = &statuses[0];
    assert!(status.limit_exceeded);
    assert!(status.hard_limit);
    assert_eq!(status.current_spend, usd(49_00));
    assert_eq!(status.remaining, usd(1_00));
}

#[tokio::test]
async fn test_limit_not_exceeded_when_projection_fits() {
    let tracker = CostTracker::new();
    tracker
        .add_limit(BudgetLimit::global(BudgetPeriod::Daily, usd(50_00), true))
        .await;
    tracker
        .record_cost("openai", "gpt-4o", "general", 100, 50, usd(10_00), None, None)
        .await;

    let statuses = tracker.check_budget_limits("general", usd(2_00), None).await;
    assert!(!statuses[0].limit_exceeded);
    assert_eq!(statuses[0].remaining, usd(40_00));
}

#[tokio::test]
async fn test_independent_scopes_all_evaluated() {
    let tracker = CostTracker::new();
    tracker
        .add_limit(BudgetLimit::global(BudgetPeriod::Daily, usd(100_00), true))
        .await;
    tracker
        .add_limit(
            BudgetLimit::global(BudgetPeriod::Daily, usd(10_00), true)
                .for_category("cover_letter"),
        )
        .await;
    tracker
        .add_limit(BudgetLimit::global(BudgetPeriod::Daily, usd(5_00), true).for_user("u1"))
        .await;

    tracker
        .record_cost(
            "openai",
            "gpt-4o",
            "cover_letter",
            100,
            50,
            usd(9_50),
            Some("u1"),
            None,
        )
        .await;

    let statuses = tracker
        .check_budget_limits("cover_letter", usd(1_00), Some("u1"))
        .await;
    assert_eq!(statuses.len(), 3);

    // Category cap (10.00) and user cap (5.00) are both breached by the
    // projection; the global cap is fine. One exceeded hard limit is enough
    // to block the request.
    let exceeded: Vec<_> = statuses.iter().filter(|s| s.limit_exceeded).collect();
    assert_eq!(exceeded.len(), 2);
    assert!(statuses.iter().any(|s| !s.limit_exceeded));
}

#[tokio::test]
async fn test_soft_limit_alerts_but_does_not_exceed() {
    let tracker = CostTracker::new();
    tracker
        .add_limit(
            BudgetLimit::global(BudgetPeriod::Daily, usd(10_00), false).with_alert_threshold(0.8),
        )
        .await;
    tracker
        .record_cost("openai", "gpt-4o", "general", 100, 50, usd(8_50), None, None)
        .await;

    let statuses = tracker.check_budget_limits("general", usd(0_10), None).await;
    let status = &statuses[0];
    assert!(status.alert_triggered);
    assert!(!status.hard_limit);
    assert!(status.percentage_used >= 80.0);
}

#[tokio::test]
async fn test_user_scoped_spend_ignores_other_users() {
    let tracker = CostTracker::new();
    tracker
        .add_limit(BudgetLimit::global(BudgetPeriod::Daily, usd(10_00), true).for_user("u1"))
        .await;

    tracker
        .record_cost("openai", "gpt-4o", "general", 100, 50, usd(9_00), Some("u2"), None)
        .await;

    let statuses = tracker
        .check_budget_limits("general", usd(1_00), Some("u1"))
        .await;
    assert_eq!(statuses[0].current_spend, Decimal::ZERO);
    assert!(!statuses[0].limit_exceeded);
}

#[tokio::test]
async fn test_no_matching_limit_yields_no_statuses() {
    let tracker = CostTracker::new();
    tracker
        .add_limit(
            BudgetLimit::global(BudgetPeriod::Daily, usd(10_00), true).for_category("job_match"),
        )
        .await;

    let statuses = tracker.check_budget_limits("general", usd(1_00), None).await;
    assert!(statuses.is_empty());
}

#[tokio::test]
async fn test_remove_limit() {
    let tracker = CostTracker::new();
    let limit = BudgetLimit::global(BudgetPeriod::Daily, usd(10_00), true);
    let id = limit.id;
    tracker.add_limit(limit).await;
    assert_eq!(tracker.limits().await.len(), 1);

    assert!(tracker.remove_limit(id).await);
    assert!(!tracker.remove_limit(id).await);
    assert!(tracker.limits().await.is_empty());
}

#[tokio::test]
async fn test_spend_summary_aggregates() {
    let tracker = CostTracker::new();
    tracker
        .record_cost("openai", "gpt-4o", "general", 100, 50, usd(1_00), None, None)
        .await;
    tracker
        .record_cost("openai", "gpt-4o-mini", "general", 100, 50, usd(0_50), None, None)
        .await;
    tracker
        .record_cost("groq", "llama-3.3-70b-versatile", "general", 100, 50, usd(0_25), None, None)
        .await;

    let summary = tracker.spend_summary(None).await;
    assert_eq!(summary.entry_count, 3);
    assert_eq!(summary.total, usd(1_75));
    assert_eq!(summary.by_provider["openai"], usd(1_50));
    assert_eq!(summary.by_provider["groq"], usd(0_25));
    assert_eq!(summary.by_model["gpt-4o"], usd(1_00));
}

#[tokio::test]
async fn test_recent_entries_returns_tail() {
    let tracker = CostTracker::new();
    for i in 0..5 {
        tracker
            .record_cost("openai", "gpt-4o", "general", i, i, usd(1), None, None)
            .await;
    }
    let recent = tracker.recent_entries(2).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[1].prompt_tokens, 4);
}
