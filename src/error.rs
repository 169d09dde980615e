//! Error types for the Tenzir Platform CLI
//!
//! This module defines the error taxonomy used by the token lifecycle code,
//! using `thiserror` for ergonomic error handling. Core modules return
//! [`Result`] so that recoverable failures (an invalid cached token, a cache
//! miss) are visible branches at the call site. The command layer wraps these
//! errors with `anyhow` context before they are rendered to the operator.

use thiserror::Error;

/// Command that obtains a fresh token.
pub const LOGIN_COMMAND: &str = "tenzir-platform auth login";

/// Main error type for Tenzir Platform operations
#[derive(Error, Debug)]
pub enum PlatformError {
    /// The OIDC provider metadata or its key set could not be fetched or parsed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Signature, issuer, audience, or claim-shape validation failed
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// A grant exchange was rejected by the provider
    #[error("Authentication flow error: {0}")]
    AuthFlow(String),

    /// Connection-level network failure
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The platform API answered with a non-success status
    #[error("API request failed with status {status}: {body}")]
    Api {
        /// HTTP status code returned by the API
        status: u16,
        /// Response body, kept verbatim for diagnostics
        body: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlatformError {
    /// Returns a remediation hint for the operator, if one applies.
    pub fn hint(&self) -> Option<String> {
        match self {
            PlatformError::InvalidToken(_) => Some(format!(
                "run `{LOGIN_COMMAND}` to obtain a fresh token, or unset TENZIR_PLATFORM_CLI_ID_TOKEN"
            )),
            PlatformError::Api { status: 403, .. } => Some(format!(
                "the platform rejected the credentials; run `{LOGIN_COMMAND}` to re-authenticate"
            )),
            PlatformError::Discovery(_) => Some(
                "check that TENZIR_PLATFORM_CLI_ISSUER_URL points at a reachable OIDC provider"
                    .to_string(),
            ),
            PlatformError::Transport(_) => Some(
                "check your network connection and TENZIR_PLATFORM_CLI_API_ENDPOINT".to_string(),
            ),
            PlatformError::Config(_) => Some(
                "all settings are read from TENZIR_PLATFORM_CLI_* environment variables"
                    .to_string(),
            ),
            PlatformError::AuthFlow(_)
            | PlatformError::Api { .. }
            | PlatformError::Io(_)
            | PlatformError::Serialization(_) => None,
        }
    }

    /// Returns `true` for the variant that triggers re-authentication when it
    /// is raised on a cached token.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, PlatformError::InvalidToken(_))
    }
}

/// Result type alias for token lifecycle operations
pub type Result<T> = std::result::Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_error_display() {
        let error = PlatformError::Discovery("missing jwks_uri".to_string());
        assert_eq!(error.to_string(), "Discovery error: missing jwks_uri");
    }

    #[test]
    fn test_invalid_token_error_display() {
        let error = PlatformError::InvalidToken("issuer mismatch".to_string());
        assert_eq!(error.to_string(), "Invalid token: issuer mismatch");
        assert!(error.is_invalid_token());
    }

    #[test]
    fn test_auth_flow_error_display() {
        let error = PlatformError::AuthFlow("access_denied".to_string());
        assert_eq!(
            error.to_string(),
            "Authentication flow error: access_denied"
        );
        assert!(!error.is_invalid_token());
    }

    #[test]
    fn test_api_error_display() {
        let error = PlatformError::Api {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "API request failed with status 404: not found"
        );
    }

    #[test]
    fn test_forbidden_hints_reauthentication() {
        let error = PlatformError::Api {
            status: 403,
            body: String::new(),
        };
        let hint = error.hint().expect("403 carries a hint");
        assert!(hint.contains(LOGIN_COMMAND));
    }

    #[test]
    fn test_other_api_errors_have_no_hint() {
        let error = PlatformError::Api {
            status: 500,
            body: String::new(),
        };
        assert!(error.hint().is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: PlatformError = io_error.into();
        assert!(matches!(error, PlatformError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: PlatformError = json_error.into();
        assert!(matches!(error, PlatformError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PlatformError>();
    }
}
