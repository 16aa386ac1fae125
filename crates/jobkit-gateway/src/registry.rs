//! Model catalogue and candidate selection
//!
//! The registry holds the immutable per-provider model catalogue loaded at
//! startup and ranks eligible models for a request. Availability beats
//! optimality: when no model is rated for the task complexity, the full
//! category catalogue is used and the degraded selection is logged.

use crate::complexity::TaskComplexity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Host-facing task category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Cover letter drafting
    CoverLetter,
    /// Resume review and scoring
    ResumeAnalysis,
    /// Job-to-candidate matching
    JobMatch,
    /// Interview preparation
    InterviewPrep,
    /// Anything else
    General,
}

impl TaskCategory {
    /// Cost-ledger category label
    #[must_use]
    pub fn cost_category(&self) -> &'static str {
        match self {
            Self::CoverLetter => "cover_letter",
            Self::ResumeAnalysis => "resume_analysis",
            Self::JobMatch => "job_match",
            Self::InterviewPrep => "interview_prep",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cost_category())
    }
}

/// A capability a model advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    /// Conversational completion
    Chat,
    /// Document analysis
    Analysis,
    /// Long-context input
    LongContext,
    /// Token streaming
    Streaming,
    /// Structured/JSON output
    StructuredOutput,
}

/// Static configuration for one upstream model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name (e.g. "openai", "anthropic", "groq", "ollama")
    pub provider: String,
    /// Model name (provider-specific)
    pub model: String,
    /// Default sampling temperature
    pub temperature: f32,
    /// Default completion token cap
    pub max_tokens: u32,
    /// Blended cost per token, USD
    pub cost_per_token: Decimal,
    /// Advertised capabilities
    pub capabilities: BTreeSet<ModelCapability>,
    /// Operator preference rank; lower is better
    pub priority: u32,
    /// Highest task complexity this model is rated for
    pub complexity_level: TaskComplexity,
    /// Provider throughput ceiling
    pub tokens_per_minute: u32,
    /// Provider request ceiling
    pub requests_per_minute: u32,
    /// Categories this model serves; empty means all
    #[serde(default)]
    pub categories: BTreeSet<TaskCategory>,
}

impl ModelConfig {
    /// Whether this model serves the given category
    #[must_use]
    pub fn serves(&self, category: TaskCategory) -> bool {
        self.categories.is_empty() || self.categories.contains(&category)
    }
}

/// Ranking criteria for candidate selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionCriteria {
    /// Cheapest first
    Cost,
    /// Operator priority order
    #[default]
    Quality,
    /// Highest throughput first
    Speed,
    /// Most capable first
    Confidence,
}

/// Immutable model catalogue with selection
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelConfig>,
}

impl ModelRegistry {
    /// Create a registry from a catalogue
    #[must_use]
    pub fn new(models: Vec<ModelConfig>) -> Self {
        Self { models }
    }

    /// All configured models
    #[must_use]
    pub fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    /// Select and rank candidate models for a request.
    ///
    /// Eligibility requires `complexity_level >= complexity`; a model rated
    /// for Complex work may serve Simple requests, never the reverse. An
    /// empty eligible set falls back to the whole category catalogue.
    #[must_use]
    pub fn select_candidates(
        &self,
        category: TaskCategory,
        complexity: TaskComplexity,
        criteria: SelectionCriteria,
    ) -> Vec<ModelConfig> {
        let in_category: Vec<&ModelConfig> =
            self.models.iter().filter(|m| m.serves(category)).collect();

        let mut candidates: Vec<ModelConfig> = in_category
            .iter()
            .filter(|m| m.complexity_level >= complexity)
            .map(|m| (*m).clone())
            .collect();

        if candidates.is_empty() {
            warn!(
                %category,
                %complexity,
                "no model rated for task complexity; degraded selection over full category catalogue"
            );
            candidates = in_category.into_iter().cloned().collect();
        }

        sort_candidates(&mut candidates, criteria);
        debug!(
            %category,
            %complexity,
            ?criteria,
            count = candidates.len(),
            "selected candidate models"
        );
        candidates
    }
}

/// Sort candidates in place by the requested criteria, ties broken by
/// ascending priority.
fn sort_candidates(candidates: &mut [ModelConfig], criteria: SelectionCriteria) {
    match criteria {
        SelectionCriteria::Cost => {
            candidates.sort_by(|a, b| {
                a.cost_per_token
                    .cmp(&b.cost_per_token)
                    .then(a.priority.cmp(&b.priority))
            });
        }
        SelectionCriteria::Quality => {
            candidates.sort_by_key(|m| m.priority);
        }
        SelectionCriteria::Speed => {
            candidates.sort_by(|a, b| {
                b.tokens_per_minute
                    .cmp(&a.tokens_per_minute)
                    .then(a.priority.cmp(&b.priority))
            });
        }
        SelectionCriteria::Confidence => {
            candidates.sort_by(|a, b| {
                b.capabilities
                    .len()
                    .cmp(&a.capabilities.len())
                    .then(a.priority.cmp(&b.priority))
            });
        }
    }
}

/// Default multi-provider catalogue.
///
/// Pricing is a blended per-token USD figure; operators override this table
/// at startup for real deployments.
#[must_use]
pub fn default_catalog() -> Vec<ModelConfig> {
    use ModelCapability::*;

    let entry = |provider: &str,
                 model: &str,
                 cost_micros: i64,
                 priority: u32,
                 complexity: TaskComplexity,
                 tpm: u32,
                 caps: &[ModelCapability]| ModelConfig {
        provider: provider.to_string(),
        model: model.to_string(),
        temperature: 0.7,
        max_tokens: 4096,
        // cost_micros is USD-millionths per token
        cost_per_token: Decimal::new(cost_micros, 6),
        capabilities: caps.iter().copied().collect(),
        priority,
        complexity_level: complexity,
        tokens_per_minute: tpm,
        requests_per_minute: 500,
        categories: BTreeSet::new(),
    };

    vec![
        entry(
            "anthropic",
            "claude-sonnet-4",
            9,
            1,
            TaskComplexity::Complex,
            80_000,
            &[Chat, Analysis, LongContext, Streaming, StructuredOutput],
        ),
        entry(
            "openai",
            "gpt-4o",
            8,
            2,
            TaskComplexity::Complex,
            120_000,
            &[Chat, Analysis, Streaming, StructuredOutput],
        ),
        entry(
            "openai",
            "gpt-4o-mini",
            1,
            3,
            TaskComplexity::Medium,
            200_000,
            &[Chat, Streaming, StructuredOutput],
        ),
        entry(
            "groq",
            "llama-3.3-70b-versatile",
            1,
            4,
            TaskComplexity::Medium,
            300_000,
            &[Chat, Streaming],
        ),
        entry(
            "ollama",
            "llama3.2",
            0,
            5,
            TaskComplexity::Simple,
            60_000,
            &[Chat],
        ),
    ]
}
