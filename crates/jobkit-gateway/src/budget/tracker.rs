//! Cost tracker - ledger plus budget admission checks

use super::entry::CostEntry;
use super::limits::{BudgetLimit, BudgetStatus};
use super::round_money;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// How long a computed period spend may be served from cache
const SPEND_CACHE_TTL: Duration = Duration::from_secs(300);

/// Ledger entries older than this can never influence a budget window
/// (the longest period is yearly) and are pruned lazily.
const LEDGER_RETENTION_DAYS: i64 = 400;

/// Prune cadence, in appended entries
const PRUNE_EVERY: usize = 1024;

/// Aggregate spend view for the admin surface
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SpendSummary {
    /// Total spend across the ledger
    pub total: Decimal,
    /// Spend per provider
    pub by_provider: HashMap<String, Decimal>,
    /// Spend per model
    pub by_model: HashMap<String, Decimal>,
    /// Ledger entries considered
    pub entry_count: usize,
}

/// Append-only spend ledger with hierarchical budget checks.
///
/// State is process-local and in-memory; limits are host-persisted and
/// re-supplied at startup, ledger history is accepted to reset on restart.
#[derive(Debug, Default)]
pub struct CostTracker {
    entries: RwLock<Vec<CostEntry>>,
    limits: RwLock<Vec<BudgetLimit>>,
    // (limit id, period start) -> (spend, computed at)
    spend_cache: RwLock<HashMap<(Uuid, DateTime<Utc>), (Decimal, Instant)>>,
}

impl CostTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a spend event. The entry is immutable once recorded.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_cost(
        &self,
        provider: &str,
        model: &str,
        category: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        cost: Decimal,
        user_id: Option<&str>,
        session_id: Option<&str>,
    ) -> CostEntry {
        let entry = CostEntry {
            timestamp: Utc::now(),
            provider: provider.to_string(),
            model: model.to_string(),
            category: category.to_string(),
            prompt_tokens,
            completion_tokens,
            cost: round_money(cost),
            user_id: user_id.map(str::to_string),
            session_id: session_id.map(str::to_string),
        };

        let mut entries = self.entries.write().await;
        entries.push(entry.clone());
        if entries.len() % PRUNE_EVERY == 0 {
            let cutoff = Utc::now() - ChronoDuration::days(LEDGER_RETENTION_DAYS);
            entries.retain(|e| e.timestamp >= cutoff);
        }
        drop(entries);

        // New spend invalidates cached window sums
        self.spend_cache.write().await.clear();

        debug!(
            provider,
            model,
            category,
            cost = %entry.cost,
            "cost recorded"
        );
        entry
    }

    /// Install a budget limit (admin surface)
    pub async fn add_limit(&self, limit: BudgetLimit) {
        self.limits.write().await.push(limit);
    }

    /// Remove a budget limit by id; returns whether one was removed
    pub async fn remove_limit(&self, id: Uuid) -> bool {
        let mut limits = self.limits.write().await;
        let before = limits.len();
        limits.retain(|l| l.id != id);
        before != limits.len()
    }

    /// All installed limits
    pub async fn limits(&self) -> Vec<BudgetLimit> {
        self.limits.read().await.clone()
    }

    /// Evaluate every limit whose scope matches the request.
    ///
    /// Global, category-scoped and user-scoped limits are independent and
    /// all enforced simultaneously; the caller rejects when any returned
    /// status has `hard_limit && limit_exceeded`.
    pub async fn check_budget_limits(
        &self,
        category: &str,
        estimated_cost: Decimal,
        user_id: Option<&str>,
    ) -> Vec<BudgetStatus> {
        let now = Utc::now();
        let limits = self.limits.read().await.clone();
        let mut statuses = Vec::new();

        for limit in limits.iter().filter(|l| l.matches(category, user_id)) {
            let (period_start, period_end) = limit.period.window(now);
            let current_spend = self.period_spend(limit, period_start, period_end).await;
            let projected = current_spend + round_money(estimated_cost);

            let percentage_used = if limit.limit.is_zero() {
                100.0
            } else {
                (current_spend / limit.limit).to_f64().unwrap_or(0.0) * 100.0
            };
            let alert_triggered = percentage_used >= limit.alert_threshold * 100.0;
            let limit_exceeded = projected > limit.limit;

            if alert_triggered && !limit.hard_limit {
                warn!(
                    scope = %limit.scope(),
                    percentage_used,
                    "budget alert threshold crossed"
                );
            }

            statuses.push(BudgetStatus {
                limit_id: limit.id,
                scope: limit.scope(),
                limit: limit.limit,
                current_spend,
                remaining: (limit.limit - current_spend).max(Decimal::ZERO),
                percentage_used,
                period_start,
                period_end,
                alert_triggered,
                limit_exceeded,
                hard_limit: limit.hard_limit,
            });
        }

        statuses
    }

    /// Spend matching one limit's scope inside [start, end), cached for
    /// five minutes per (limit, period start).
    async fn period_spend(
        &self,
        limit: &BudgetLimit,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Decimal {
        let key = (limit.id, start);
        if let Some((cached, at)) = self.spend_cache.read().await.get(&key) {
            if at.elapsed() < SPEND_CACHE_TTL {
                return *cached;
            }
        }

        let entries = self.entries.read().await;
        let spend: Decimal = entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .filter(|e| limit.matches(&e.category, e.user_id.as_deref()))
            .map(|e| e.cost)
            .sum();
        drop(entries);

        self.spend_cache
            .write()
            .await
            .insert(key, (spend, Instant::now()));
        spend
    }

    /// Recent ledger entries, newest last
    pub async fn recent_entries(&self, count: usize) -> Vec<CostEntry> {
        let entries = self.entries.read().await;
        let start = entries.len().saturating_sub(count);
        entries[start..].to_vec()
    }

    /// Aggregate spend since `since` (or all time) for the admin surface
    pub async fn spend_summary(&self, since: Option<DateTime<Utc>>) -> SpendSummary {
        let entries = self.entries.read().await;
        let mut summary = SpendSummary::default();

        for entry in entries
            .iter()
            .filter(|e| since.is_none_or(|s| e.timestamp >= s))
        {
            summary.total += entry.cost;
            *summary
                .by_provider
                .entry(entry.provider.clone())
                .or_default() += entry.cost;
            *summary.by_model.entry(entry.model.clone()).or_default() += entry.cost;
            summary.entry_count += 1;
        }

        summary
    }
}
