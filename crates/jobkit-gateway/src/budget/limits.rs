//! Budget limits, calendar periods, and derived status

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Calendar window a spend cap applies to. Boundaries are UTC; weeks are
/// ISO weeks starting Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    /// Clock hour
    Hourly,
    /// Calendar day
    Daily,
    /// ISO week from Monday
    Weekly,
    /// Calendar month
    Monthly,
    /// Calendar year
    Yearly,
}

impl BudgetPeriod {
    /// [start, end) of the period containing `at`
    #[must_use]
    pub fn window(&self, at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let date = at.date_naive();
        match self {
            Self::Hourly => {
                let start = at
                    .with_minute(0)
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
                    .unwrap_or(at);
                (start, start + ChronoDuration::hours(1))
            }
            Self::Daily => {
                let start = start_of_day(date);
                (start, start + ChronoDuration::days(1))
            }
            Self::Weekly => {
                let monday = date
                    - ChronoDuration::days(i64::from(date.weekday().num_days_from_monday()));
                let start = start_of_day(monday);
                (start, start + ChronoDuration::weeks(1))
            }
            Self::Monthly => {
                let start = start_of_day(first_of_month(date.year(), date.month()));
                let (next_year, next_month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                let end = start_of_day(first_of_month(next_year, next_month));
                (start, end)
            }
            Self::Yearly => {
                let start = start_of_day(first_of_month(date.year(), 1));
                let end = start_of_day(first_of_month(date.year() + 1, 1));
                (start, end)
            }
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is always valid"))
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is always valid")
}

/// An operator-created spend cap.
///
/// Global, category-scoped, and user-scoped limits are independent; one
/// request can be checked against several at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLimit {
    /// Stable identifier
    pub id: Uuid,
    /// Restrict to one cost category; `None` means all spend
    pub category: Option<String>,
    /// Calendar window the cap covers
    pub period: BudgetPeriod,
    /// Spend cap in USD
    pub limit: Decimal,
    /// Restrict to one user; `None` means all users
    pub user_id: Option<String>,
    /// Fraction of the limit at which an alert fires, in [0, 1]
    pub alert_threshold: f64,
    /// Hard limits reject requests; soft limits only alert
    pub hard_limit: bool,
}

impl BudgetLimit {
    /// Create a global limit over all spend
    #[must_use]
    pub fn global(period: BudgetPeriod, limit: Decimal, hard_limit: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: None,
            period,
            limit,
            user_id: None,
            alert_threshold: 0.8,
            hard_limit,
        }
    }

    /// Scope the limit to a cost category
    #[must_use]
    pub fn for_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Scope the limit to a user
    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the alert threshold
    #[must_use]
    pub fn with_alert_threshold(mut self, threshold: f64) -> Self {
        self.alert_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Whether this limit applies to a request in `category` by `user_id`
    #[must_use]
    pub fn matches(&self, category: &str, user_id: Option<&str>) -> bool {
        let category_ok = self.category.as_deref().is_none_or(|c| c == category);
        let user_ok = self.user_id.as_deref().is_none_or(|u| Some(u) == user_id);
        category_ok && user_ok
    }

    /// Human-readable scope label used in errors and logs
    #[must_use]
    pub fn scope(&self) -> String {
        match (&self.category, &self.user_id) {
            (None, None) => format!("global/{:?}", self.period),
            (Some(c), None) => format!("category {c}/{:?}", self.period),
            (None, Some(u)) => format!("user {u}/{:?}", self.period),
            (Some(c), Some(u)) => format!("user {u} category {c}/{:?}", self.period),
        }
    }
}

/// Derived view of one limit at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    /// Limit this status describes
    pub limit_id: Uuid,
    /// Scope label
    pub scope: String,
    /// Configured cap
    pub limit: Decimal,
    /// Spend inside the current period
    pub current_spend: Decimal,
    /// Cap minus current spend, floored at zero
    pub remaining: Decimal,
    /// current_spend / limit, as a percentage
    pub percentage_used: f64,
    /// Period window start
    pub period_start: DateTime<Utc>,
    /// Period window end (exclusive)
    pub period_end: DateTime<Utc>,
    /// Soft-limit alert fired
    pub alert_triggered: bool,
    /// Projected spend (current + estimate) breaches the cap
    pub limit_exceeded: bool,
    /// Whether the underlying limit is hard
    pub hard_limit: bool,
}
