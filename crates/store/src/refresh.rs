//! OAuth 2.0 refresh-token grant shared by every credential backend.

use assistgate_config::OAuthConfig;
use assistgate_types::{
    Credential, CredentialsProvider, GatewayError, credential::now_millis, error::Result,
};
use serde::Deserialize;

/// Token endpoint reply for the `refresh_token` grant.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchanges refresh tokens for access tokens at the OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    http: rquest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl TokenRefresher {
    #[must_use]
    pub fn new(http: rquest::Client, oauth: &OAuthConfig) -> Self {
        Self {
            http,
            token_url: oauth.token_url.clone(),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
        }
    }

    /// Form fields for the refresh grant.
    #[must_use]
    pub fn form_params<'a>(&'a self, refresh_token: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]
    }

    /// Exchange `current.refresh_token` for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] when no refresh token is present or the
    /// endpoint rejects the grant, and [`GatewayError::Http`] on transport
    /// failure.
    pub async fn exchange(&self, current: &Credential) -> Result<Credential> {
        if !current.can_refresh() {
            return Err(GatewayError::Auth("no refresh token available".into()));
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&self.form_params(&current.refresh_token))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!(
                "token refresh failed ({status}): {body}"
            )));
        }

        let reply: TokenResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Auth(format!("failed to parse token response: {e}")))?;
        Ok(apply_token_response(current, reply))
    }
}

fn apply_token_response(current: &Credential, reply: TokenResponse) -> Credential {
    let expiry_date = reply.expires_in.map_or(0, |secs| {
        now_millis().saturating_add(secs.saturating_mul(1000))
    });
    Credential {
        access_token: reply.access_token,
        refresh_token: reply
            .refresh_token
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| current.refresh_token.clone()),
        expiry_date,
        token_type: reply
            .token_type
            .unwrap_or_else(|| current.token_type.clone()),
        scope: reply.scope.or_else(|| current.scope.clone()),
    }
}

/// Load, exchange and persist. A save failure is logged and the refreshed
/// credential is still returned.
pub(crate) async fn refresh_and_save<P>(store: &P, refresher: &TokenRefresher) -> Result<Credential>
where
    P: CredentialsProvider + ?Sized,
{
    let current = store.get_credentials().await?;
    let refreshed = refresher.exchange(&current).await?;
    if let Err(e) = store.save_credentials(&refreshed).await {
        tracing::warn!(store = store.name(), error = %e, "refreshed credential not persisted");
    }
    tracing::info!(
        store = store.name(),
        expiry_date = refreshed.expiry_date,
        "access token refreshed"
    );
    Ok(refreshed)
}
