//! Task complexity analysis
//!
//! Classifies a prompt (plus optional context) as Simple, Medium or Complex
//! so the router can pick an adequately capable model without overpaying.
//! The scoring is a pure function of the input text: fixed keyword tables,
//! bucketed signal scores, and a weighted sum.
//!
//! The weights and thresholds are hand-tuned and deliberately configurable
//! rather than derived; treat them as routing policy, not ground truth.

use serde::{Deserialize, Serialize};

/// Coarse classification of request difficulty
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskComplexity {
    /// Short factual or template work
    #[default]
    Simple,
    /// Moderate drafting or single-document analysis
    Medium,
    /// Multi-step reasoning, synthesis, or long-context work
    Complex,
}

impl TaskComplexity {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }

    /// Providers that historically handle this tier well, best first
    #[must_use]
    pub fn recommended_providers(&self) -> &'static [&'static str] {
        match self {
            Self::Simple => &["groq", "ollama", "openai"],
            Self::Medium => &["openai", "anthropic", "groq"],
            Self::Complex => &["anthropic", "openai"],
        }
    }

    /// Expected cost multiplier relative to a Simple task
    #[must_use]
    pub fn cost_multiplier(&self) -> f64 {
        match self {
            Self::Simple => 1.0,
            Self::Medium => 2.5,
            Self::Complex => 6.0,
        }
    }
}

impl std::fmt::Display for TaskComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terms that indicate technical subject matter
const TECHNICAL_TERMS: &[&str] = &[
    "algorithm",
    "architecture",
    "api",
    "database",
    "deploy",
    "distributed",
    "infrastructure",
    "kubernetes",
    "latency",
    "microservice",
    "optimization",
    "pipeline",
    "protocol",
    "scalability",
    "throughput",
];

/// Job-application domain concepts
const DOMAIN_CONCEPTS: &[&str] = &[
    "resume",
    "cv",
    "cover letter",
    "interview",
    "recruiter",
    "job description",
    "qualification",
    "salary",
    "negotiation",
    "portfolio",
    "application",
    "ats",
    "hiring",
];

/// Verbs that signal analysis rather than retrieval
const ANALYSIS_VERBS: &[&str] = &[
    "analyze",
    "assess",
    "compare",
    "critique",
    "evaluate",
    "justify",
    "prioritize",
    "recommend",
    "synthesize",
    "tailor",
];

/// Connectives that signal multi-step reasoning
const REASONING_CONNECTIVES: &[&str] = &[
    "because",
    "therefore",
    "however",
    "whereas",
    "consequently",
    "on the other hand",
    "trade-off",
    "given that",
];

/// Markers of structured or multi-step requests
const STRUCTURE_MARKERS: &[&str] = &[
    "step by step",
    "first,",
    "second,",
    "finally,",
    "1.",
    "2.",
    "- ",
    "* ",
    "then ",
];

/// Signal weights and classification thresholds.
///
/// Defaults sum to 1.0 so the combined score stays in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityWeights {
    /// Weight of prompt length
    pub length: f64,
    /// Weight of technical-term matches
    pub technical: f64,
    /// Weight of domain-concept matches
    pub domain: f64,
    /// Weight of analysis-verb matches
    pub analysis: f64,
    /// Weight of reasoning-connective matches
    pub reasoning: f64,
    /// Weight of structured/multi-step markers
    pub structure: f64,
    /// Weight of supplied context length
    pub context: f64,
    /// Score at or above this is Complex
    pub complex_threshold: f64,
    /// Score at or above this is Medium
    pub medium_threshold: f64,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            length: 0.20,
            technical: 0.15,
            domain: 0.10,
            analysis: 0.20,
            reasoning: 0.15,
            structure: 0.10,
            context: 0.10,
            complex_threshold: 0.5,
            medium_threshold: 0.2,
        }
    }
}

/// Deterministic prompt complexity analyzer
#[derive(Debug, Clone, Default)]
pub struct ComplexityAnalyzer {
    weights: ComplexityWeights,
}

impl ComplexityAnalyzer {
    /// Create an analyzer with default weights
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer with custom weights
    #[must_use]
    pub fn with_weights(weights: ComplexityWeights) -> Self {
        Self { weights }
    }

    /// Classify a prompt. Pure and total: empty input resolves to Simple.
    #[must_use]
    pub fn analyze(&self, prompt: &str, context: Option<&str>) -> TaskComplexity {
        let score = self.score(prompt, context);
        if score >= self.weights.complex_threshold {
            TaskComplexity::Complex
        } else if score >= self.weights.medium_threshold {
            TaskComplexity::Medium
        } else {
            TaskComplexity::Simple
        }
    }

    /// Combined weighted score in [0, 1]
    #[must_use]
    pub fn score(&self, prompt: &str, context: Option<&str>) -> f64 {
        if prompt.trim().is_empty() {
            return 0.0;
        }
        let lower = prompt.to_lowercase();
        let w = &self.weights;

        let word_count = lower.split_whitespace().count();
        let context_len = context.map_or(0, str::len);

        w.length * length_signal(word_count)
            + w.technical * match_signal(&lower, TECHNICAL_TERMS)
            + w.domain * match_signal(&lower, DOMAIN_CONCEPTS)
            + w.analysis * match_signal(&lower, ANALYSIS_VERBS)
            + w.reasoning * match_signal(&lower, REASONING_CONNECTIVES)
            + w.structure * match_signal(&lower, STRUCTURE_MARKERS)
            + w.context * context_signal(context_len)
    }
}

/// Bucketed score for prompt length (words)
fn length_signal(words: usize) -> f64 {
    match words {
        0..=20 => 0.0,
        21..=60 => 0.3,
        61..=150 => 0.6,
        _ => 1.0,
    }
}

/// Bucketed score for keyword table matches
fn match_signal(text: &str, table: &[&str]) -> f64 {
    let hits = table.iter().filter(|term| text.contains(*term)).count();
    match hits {
        0 => 0.0,
        1 => 0.4,
        2 => 0.7,
        _ => 1.0,
    }
}

/// Bucketed score for supplied context length (characters)
fn context_signal(len: usize) -> f64 {
    match len {
        0 => 0.0,
        1..=500 => 0.3,
        501..=2000 => 0.6,
        _ => 1.0,
    }
}
