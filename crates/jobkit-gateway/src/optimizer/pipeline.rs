//! Strategy selection and the optimization pipeline

use super::techniques;
use super::{OptimizationResult, OptimizationStrategy, OptimizationTechnique, TokenBudget};
use crate::complexity::TaskComplexity;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::token::estimate_conversation_tokens;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use tracing::{debug, info};

/// Compresses message sets into a token budget.
///
/// Passes are pure given (messages, budget, complexity); results are cached
/// by content hash, strategy and budget.
#[derive(Debug, Default)]
pub struct TokenOptimizer {
    cache: RwLock<HashMap<String, (Vec<Message>, OptimizationResult)>>,
}

impl TokenOptimizer {
    /// Create an optimizer with an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit `messages` into `budget`.
    ///
    /// Returns the (possibly rewritten) messages and an [`OptimizationResult`]
    /// describing the pass. Errors with [`Error::OverTokenBudget`] when the
    /// applicable techniques cannot reach the budget; the messages are never
    /// silently returned over budget.
    pub fn optimize_for_budget(
        &self,
        messages: &[Message],
        budget: &TokenBudget,
        complexity: TaskComplexity,
    ) -> Result<(Vec<Message>, OptimizationResult)> {
        let original_tokens = estimate_conversation_tokens(messages);
        let available = budget.available_tokens();
        if available == 0 {
            return Err(Error::Validation(
                "token budget reserves everything; nothing available for the prompt".to_string(),
            ));
        }

        let strategy = select_strategy(original_tokens, budget, complexity);
        if original_tokens <= available {
            return Ok((
                messages.to_vec(),
                OptimizationResult::noop(original_tokens, strategy),
            ));
        }

        let cache_key = cache_key(messages, strategy, budget);
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&cache_key)
        {
            return Ok(hit.clone());
        }

        // Lossy transforms only run when quality is not being preserved,
        // which is exactly the aggressive strategy.
        let preserve_quality = strategy != OptimizationStrategy::Aggressive;

        let mut current: Vec<Message> = messages.to_vec();
        let mut used: BTreeSet<OptimizationTechnique> = BTreeSet::new();

        for technique in technique_plan(strategy, preserve_quality) {
            current = apply(&current, technique);
            used.insert(technique);
        }

        let optimized_tokens = estimate_conversation_tokens(&current);
        if optimized_tokens > available {
            debug!(
                original_tokens,
                optimized_tokens, available, "optimization could not reach budget"
            );
            return Err(Error::OverTokenBudget {
                actual: optimized_tokens,
                available,
            });
        }

        let result = OptimizationResult {
            original_tokens,
            optimized_tokens,
            reduction_percentage: reduction_pct(original_tokens, optimized_tokens),
            quality_score: quality_score(&used, original_tokens, optimized_tokens),
            techniques_used: used,
            strategy,
        };

        info!(
            original_tokens,
            optimized_tokens,
            ?strategy,
            quality = result.quality_score,
            "request optimized into token budget"
        );

        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key, (current.clone(), result.clone()));
        Ok((current, result))
    }
}

/// Pick the strategy from the pressure ratio; Complex tasks always run at
/// least Balanced.
fn select_strategy(
    current_tokens: usize,
    budget: &TokenBudget,
    complexity: TaskComplexity,
) -> OptimizationStrategy {
    let pressure = if budget.max_total_tokens == 0 {
        f64::INFINITY
    } else {
        current_tokens as f64 / budget.max_total_tokens as f64
    };

    let mut strategy = if pressure > budget.emergency_threshold {
        OptimizationStrategy::Aggressive
    } else if pressure > 0.8 {
        OptimizationStrategy::Balanced
    } else {
        OptimizationStrategy::Conservative
    };

    if complexity == TaskComplexity::Complex && strategy < OptimizationStrategy::Balanced {
        strategy = OptimizationStrategy::Balanced;
    }
    strategy
}

/// Techniques to try, in increasing aggressiveness
fn technique_plan(
    strategy: OptimizationStrategy,
    preserve_quality: bool,
) -> Vec<OptimizationTechnique> {
    let mut plan = vec![OptimizationTechnique::WhitespaceNormalization];
    if strategy >= OptimizationStrategy::Balanced {
        plan.push(OptimizationTechnique::RedundancyElimination);
    }
    if !preserve_quality {
        plan.push(OptimizationTechnique::Abbreviation);
        if strategy == OptimizationStrategy::Aggressive {
            plan.push(OptimizationTechnique::StopWordRemoval);
        }
    }
    plan
}

fn apply(messages: &[Message], technique: OptimizationTechnique) -> Vec<Message> {
    messages
        .iter()
        .map(|m| {
            let content = match technique {
                OptimizationTechnique::WhitespaceNormalization => {
                    techniques::normalize_whitespace(&m.content)
                }
                OptimizationTechnique::RedundancyElimination => {
                    techniques::eliminate_redundancy(&m.content)
                }
                OptimizationTechnique::Abbreviation => techniques::abbreviate(&m.content),
                OptimizationTechnique::StopWordRemoval => {
                    techniques::remove_stop_words(&m.content)
                }
            };
            Message {
                role: m.role,
                content,
            }
        })
        .collect()
}

fn reduction_pct(original: usize, optimized: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original.saturating_sub(optimized)) as f64 / original as f64 * 100.0
}

/// 1 minus the fixed per-technique penalties, minus an extra charge when
/// the compression ratio is severe.
fn quality_score(
    used: &BTreeSet<OptimizationTechnique>,
    original: usize,
    optimized: usize,
) -> f64 {
    let mut score = 1.0 - used.iter().map(OptimizationTechnique::quality_penalty).sum::<f64>();
    if original > 0 {
        let ratio = optimized as f64 / original as f64;
        if ratio < 0.5 {
            score -= 0.2;
        } else if ratio < 0.7 {
            score -= 0.1;
        }
    }
    score.clamp(0.0, 1.0)
}

fn cache_key(messages: &[Message], strategy: OptimizationStrategy, budget: &TokenBudget) -> String {
    let mut hasher = Sha256::new();
    for message in messages {
        hasher.update(message.role.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(message.content.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(format!(
        "{strategy:?}:{}:{}:{}",
        budget.max_total_tokens, budget.reserved_tokens, budget.emergency_threshold
    ));
    format!("{:x}", hasher.finalize())
}
