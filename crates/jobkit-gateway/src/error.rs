//! Error types for jobkit-gateway

use rust_decimal::Decimal;
use thiserror::Error;

/// Classification of provider adapter failures.
///
/// Adapters map vendor-specific errors onto this closed set; routing
/// policy switches on the kind, never on vendor exception types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Invalid or missing credentials
    Authentication,
    /// Provider rate limit hit
    RateLimit,
    /// Account quota exhausted
    Quota,
    /// Requested model does not exist on the provider
    ModelNotFound,
    /// Request rejected as malformed
    InvalidRequest,
    /// Per-call timeout elapsed
    Timeout,
    /// Network-level failure
    Connection,
    /// Provider-side 5xx
    ServerError,
    /// Anything the adapter could not classify
    Unknown,
}

impl ProviderErrorKind {
    /// Whether this failure class is worth retrying with backoff.
    ///
    /// Authentication, ModelNotFound and InvalidRequest never recover on
    /// retry against the same provider; the router fails over instead.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit
                | Self::Timeout
                | Self::Connection
                | Self::ServerError
                | Self::Unknown
        )
    }

    /// Maximum attempts the router should spend on this failure class.
    #[must_use]
    pub fn max_attempts(&self, configured: u32) -> u32 {
        match self {
            Self::Authentication | Self::ModelNotFound | Self::InvalidRequest => 1,
            // Conservative cap for unclassified failures
            Self::Unknown => configured.min(2),
            _ => configured,
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Quota => "quota",
            Self::ModelNotFound => "model_not_found",
            Self::InvalidRequest => "invalid_request",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway error type
#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input; never retried
    #[error("validation error: {0}")]
    Validation(String),

    /// A single provider call failed
    #[error("provider {provider} failed ({kind}): {message}")]
    Provider {
        /// Provider that failed
        provider: String,
        /// Failure classification
        kind: ProviderErrorKind,
        /// Sanitized message
        message: String,
    },

    /// A hard budget limit would be breached; admission rejection
    #[error("budget exceeded for {scope}: projected {projected} over limit {limit}")]
    BudgetExceeded {
        /// Which limit scope rejected the request
        scope: String,
        /// Configured limit
        limit: Decimal,
        /// Current spend plus the estimate for this request
        projected: Decimal,
    },

    /// The token optimizer could not fit the messages into the budget
    #[error("cannot fit request into token budget: {actual} tokens estimated, {available} available")]
    OverTokenBudget {
        /// Estimated tokens after optimization
        actual: usize,
        /// max_total_tokens minus reserved_tokens
        available: usize,
    },

    /// Every candidate across every attempt failed
    #[error("all providers failed after {attempts} attempts: {last_error}")]
    AllProvidersFailed {
        /// Attempts consumed
        attempts: u32,
        /// Last underlying failure
        #[source]
        last_error: Box<Error>,
    },

    /// No model in the catalogue matches the request
    #[error("no model configured for category {0}")]
    NotConfigured(String),
}

impl Error {
    /// Build a provider error with a sanitized message.
    pub fn provider(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind,
            message: crate::util::sanitize_error_message(&message.into()),
        }
    }

    /// Failure classification, when this wraps a provider failure.
    #[must_use]
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            Self::AllProvidersFailed { last_error, .. } => last_error.provider_kind(),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ProviderErrorKind::RateLimit.is_retryable());
        assert!(ProviderErrorKind::Timeout.is_retryable());
        assert!(ProviderErrorKind::Connection.is_retryable());
        assert!(ProviderErrorKind::ServerError.is_retryable());

        assert!(!ProviderErrorKind::Authentication.is_retryable());
        assert!(!ProviderErrorKind::ModelNotFound.is_retryable());
        assert!(!ProviderErrorKind::InvalidRequest.is_retryable());
    }

    #[test]
    fn test_unknown_is_capped_at_two_attempts() {
        assert_eq!(ProviderErrorKind::Unknown.max_attempts(5), 2);
        assert_eq!(ProviderErrorKind::Unknown.max_attempts(1), 1);
        assert_eq!(ProviderErrorKind::ServerError.max_attempts(5), 5);
        assert_eq!(ProviderErrorKind::Authentication.max_attempts(5), 1);
    }

    #[test]
    fn test_provider_error_sanitizes_message() {
        let err = Error::provider(
            "openai",
            ProviderErrorKind::Authentication,
            "invalid api_key sk-12345",
        );
        let text = err.to_string();
        assert!(!text.contains("sk-12345"));
    }

    #[test]
    fn test_provider_kind_through_aggregate() {
        let inner = Error::provider("groq", ProviderErrorKind::Timeout, "deadline");
        let agg = Error::AllProvidersFailed {
            attempts: 3,
            last_error: Box::new(inner),
        };
        assert_eq!(agg.provider_kind(), Some(ProviderErrorKind::Timeout));
    }
}
