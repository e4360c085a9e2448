//! OAuth credential record and expiry logic.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// A bearer credential for the upstream, in the JSON shape of the upstream
/// CLI's `oauth_creds.json`.
///
/// `expiry_date` is milliseconds since the epoch; `0` means "unknown" and is
/// treated as non-expiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: String,
    #[serde(default, alias = "expiryTimestampMillis", alias = "expiry")]
    pub expiry_date: u64,
    #[serde(default = "default_token_type", alias = "tokenType")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    /// Create a non-expiring credential with the given access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: String::new(),
            expiry_date: 0,
            token_type: default_token_type(),
            scope: None,
        }
    }

    /// Set the expiry to `expires_in_secs` seconds from now.
    #[must_use]
    pub fn with_expiry_in(mut self, expires_in_secs: u64) -> Self {
        self.expiry_date = now_millis().saturating_add(expires_in_secs.saturating_mul(1000));
        self
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    /// Returns `true` when a refresh token is present.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Returns `true` if the credential expires within `buffer` of now.
    ///
    /// Credentials with an unknown expiry never report as expiring.
    #[must_use]
    pub fn expires_within(&self, buffer: Duration) -> bool {
        if self.expiry_date == 0 {
            return false;
        }
        let buffer_ms = u64::try_from(buffer.as_millis()).unwrap_or(u64::MAX);
        now_millis().saturating_add(buffer_ms) >= self.expiry_date
    }

    /// Classify the credential against an expiry buffer.
    #[must_use]
    pub fn status(&self, buffer: Duration) -> CredentialStatus {
        if self.expires_within(buffer) {
            CredentialStatus::Expiring
        } else {
            CredentialStatus::Valid
        }
    }

    /// The value of an `Authorization` header carrying this credential.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Describes the usability of the current credential snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    /// Inside the refresh buffer (or already past expiry).
    Expiring,
    /// No credential has been loaded.
    Missing,
}

impl std::fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Expiring => write!(f, "expiring"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUFFER: Duration = Duration::from_secs(300);

    #[test]
    fn test_unknown_expiry_never_expires() {
        let c = Credential::new("tok");
        assert!(!c.expires_within(BUFFER));
        assert_eq!(c.status(BUFFER), CredentialStatus::Valid);
    }

    #[test]
    fn test_future_expiry_valid() {
        let c = Credential::new("tok").with_expiry_in(3600);
        assert!(!c.expires_within(BUFFER));
    }

    #[test]
    fn test_within_buffer_is_expiring() {
        let c = Credential::new("tok").with_expiry_in(120);
        assert!(c.expires_within(BUFFER));
        assert_eq!(c.status(BUFFER), CredentialStatus::Expiring);
    }

    #[test]
    fn test_past_expiry_is_expiring() {
        let mut c = Credential::new("tok");
        c.expiry_date = now_millis() - 10_000;
        assert!(c.expires_within(Duration::ZERO));
    }

    #[test]
    fn test_expiry_is_milliseconds() {
        let before = now_millis();
        let c = Credential::new("tok").with_expiry_in(60);
        assert!(c.expiry_date >= before + 60_000);
        assert!(c.expiry_date <= now_millis() + 60_000);
    }

    #[test]
    fn test_deserialize_cli_shape() {
        let json = r#"{
            "access_token": "ya29.a",
            "refresh_token": "1//r",
            "expiry_date": 1700000000000,
            "token_type": "Bearer",
            "scope": "openid"
        }"#;
        let c: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(c.access_token, "ya29.a");
        assert_eq!(c.refresh_token, "1//r");
        assert_eq!(c.expiry_date, 1_700_000_000_000);
        assert_eq!(c.scope.as_deref(), Some("openid"));
    }

    #[test]
    fn test_deserialize_camel_case_aliases() {
        let json = r#"{"accessToken": "a", "refreshToken": "r", "expiryTimestampMillis": 5}"#;
        let c: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(c.access_token, "a");
        assert_eq!(c.refresh_token, "r");
        assert_eq!(c.expiry_date, 5);
        assert_eq!(c.token_type, "Bearer");
    }

    #[test]
    fn test_serialize_skips_missing_scope() {
        let json = serde_json::to_string(&Credential::new("tok")).unwrap();
        assert!(!json.contains("scope"));
        assert!(json.contains("expiry_date"));
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(Credential::new("abc").authorization(), "Bearer abc");
    }
}
