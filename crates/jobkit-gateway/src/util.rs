//! Shared helpers for provider error hygiene
//!
//! Vendor error strings can embed credentials or request headers; everything
//! that crosses the gateway boundary is filtered here first.

/// Substrings that mark an error message as unsafe to surface verbatim
const SENSITIVE_PATTERNS: &[&str] = &[
    "api_key",
    "api-key",
    "apikey",
    "authorization",
    "bearer",
    "token",
    "secret",
    "password",
    "credential",
];

/// Sanitize a vendor error message before it is attached to a gateway error.
///
/// Messages containing credential-like substrings are replaced wholesale; a
/// partial redaction is too easy to get wrong across vendors.
#[must_use]
pub fn sanitize_error_message(message: &str) -> String {
    let lower = message.to_lowercase();
    for pattern in SENSITIVE_PATTERNS {
        if lower.contains(pattern) {
            return "provider returned an error (details withheld)".to_string();
        }
    }
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_redacts_credentials() {
        let sanitized = sanitize_error_message("401: invalid api_key provided");
        assert_eq!(sanitized, "provider returned an error (details withheld)");
    }

    #[test]
    fn test_sanitize_redacts_bearer() {
        let sanitized = sanitize_error_message("Bearer token expired");
        assert_eq!(sanitized, "provider returned an error (details withheld)");
    }

    #[test]
    fn test_sanitize_keeps_safe_messages() {
        let msg = "connection reset by peer";
        assert_eq!(sanitize_error_message(msg), msg);
    }
}
