//! Unified error type for the assistgate workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across assistgate crates.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// OAuth or credential authentication failure (including failed refreshes).
    #[error("authentication error: {0}")]
    Auth(String),

    /// The configured credential store holds no record.
    #[error("authentication error: credentials not found")]
    CredentialsNotFound,

    /// The client request cannot be expressed in the upstream dialect.
    #[error("translation error: {0}")]
    Translation(String),

    /// Transport-level failure talking to the upstream.
    #[error("http error: {0}")]
    Http(String),

    /// The upstream answered with a non-success status other than a
    /// recoverable 401. Status and body are passed through verbatim.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    /// The client went away while a stream was being written.
    #[error("stream write error: {0}")]
    StreamWrite(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "rquest")]
impl From<rquest::Error> for GatewayError {
    fn from(e: rquest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl GatewayError {
    /// Returns `true` if the failure was caused by the client side of the
    /// exchange and should be reported as a 4xx.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Translation(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_auth() {
        let err = GatewayError::Auth("bad credentials".to_string());
        assert_eq!(err.to_string(), "authentication error: bad credentials");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = GatewayError::CredentialsNotFound;
        assert!(err.to_string().contains("credentials not found"));
    }

    #[test]
    fn test_error_display_upstream() {
        let err = GatewayError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("429"));
        assert!(s.contains("rate limited"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid {{{").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::Serialization(_)));
    }

    #[test]
    fn test_is_client_error() {
        assert!(GatewayError::Translation("parity".into()).is_client_error());
        assert!(!GatewayError::Http("refused".into()).is_client_error());
    }
}
