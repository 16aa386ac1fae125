//! Cost tracking and budget admission control
//!
//! The ledger is the append-only source of truth for spend; budget limits
//! are evaluated against it on every request. All monetary math is
//! fixed-point [`rust_decimal::Decimal`] rounded half-up to 4 places.
//!
//! # Module Structure
//!
//! - `entry`: the append-only cost entry type
//! - `limits`: budget limits, periods, and derived status
//! - `tracker`: the ledger plus admission checks

mod entry;
mod limits;
mod tracker;

#[cfg(test)]
mod tests;

pub use entry::CostEntry;
pub use limits::{BudgetLimit, BudgetPeriod, BudgetStatus};
pub use tracker::{CostTracker, SpendSummary};

use rust_decimal::{Decimal, RoundingStrategy};

/// Round a monetary amount half-up to 4 decimal places
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}
