//! Token optimization
//!
//! Compresses a message set into a token budget before a provider call.
//! A strategy is chosen from the pressure ratio and its full technique plan
//! is applied; a request the techniques cannot fit is an explicit error,
//! never a silent over-budget call.
//!
//! # Module Structure
//!
//! - `techniques`: the individual text transforms
//! - `pipeline`: strategy selection and the optimization pipeline

mod pipeline;
mod techniques;

#[cfg(test)]
mod tests;

pub use pipeline::TokenOptimizer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-call token budget
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Cap on prompt tokens
    pub max_prompt_tokens: usize,
    /// Cap on completion tokens
    pub max_completion_tokens: usize,
    /// Cap on prompt plus completion
    pub max_total_tokens: usize,
    /// Tokens held back from the total for safety margin
    pub reserved_tokens: usize,
    /// Pressure ratio above which optimization turns aggressive
    pub emergency_threshold: f64,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_prompt_tokens: 3072,
            max_completion_tokens: 1024,
            max_total_tokens: 4096,
            reserved_tokens: 256,
            emergency_threshold: 0.95,
        }
    }
}

impl TokenBudget {
    /// Tokens actually available to the prompt: total cap minus reserve
    #[must_use]
    pub fn available_tokens(&self) -> usize {
        self.max_total_tokens.saturating_sub(self.reserved_tokens)
    }
}

/// How hard the optimizer is allowed to compress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationStrategy {
    /// Lossless cleanup only
    Conservative,
    /// Cleanup plus redundancy removal
    Balanced,
    /// Everything, including lossy transforms
    Aggressive,
}

/// One text transform the optimizer may apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationTechnique {
    /// Collapse whitespace runs
    WhitespaceNormalization,
    /// Drop duplicate sentences and verbose phrases
    RedundancyElimination,
    /// Fixed-dictionary abbreviation
    Abbreviation,
    /// Drop stop words outside sentence-initial and quoted spans
    StopWordRemoval,
}

impl OptimizationTechnique {
    /// Fixed quality penalty charged when the technique is applied
    #[must_use]
    pub fn quality_penalty(&self) -> f64 {
        match self {
            Self::WhitespaceNormalization => 0.0,
            Self::RedundancyElimination => 0.02,
            Self::Abbreviation => 0.10,
            Self::StopWordRemoval => 0.15,
        }
    }
}

/// Outcome of one optimization pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Estimated tokens before optimization
    pub original_tokens: usize,
    /// Estimated tokens after optimization
    pub optimized_tokens: usize,
    /// Percentage of tokens removed
    pub reduction_percentage: f64,
    /// Techniques that were applied
    pub techniques_used: BTreeSet<OptimizationTechnique>,
    /// Estimated residual quality in [0, 1]
    pub quality_score: f64,
    /// Strategy the pass ran under
    pub strategy: OptimizationStrategy,
}

impl OptimizationResult {
    /// A pass that changed nothing
    #[must_use]
    pub fn noop(tokens: usize, strategy: OptimizationStrategy) -> Self {
        Self {
            original_tokens: tokens,
            optimized_tokens: tokens,
            reduction_percentage: 0.0,
            techniques_used: BTreeSet::new(),
            quality_score: 1.0,
            strategy,
        }
    }
}
