//! Credential record stored in a Cloudflare Workers KV namespace.

use crate::refresh::{TokenRefresher, refresh_and_save};
use assistgate_config::KvConfig;
use assistgate_types::{Credential, CredentialsProvider, GatewayError, error::Result};
use async_trait::async_trait;

/// A [`CredentialsProvider`] using the KV REST API:
/// `{base}/accounts/{account}/storage/kv/namespaces/{namespace}/values/{key}`.
pub struct KvCredentials {
    http: rquest::Client,
    config: KvConfig,
    refresher: TokenRefresher,
}

impl KvCredentials {
    #[must_use]
    pub fn new(http: rquest::Client, config: KvConfig, refresher: TokenRefresher) -> Self {
        Self {
            http,
            config,
            refresher,
        }
    }

    fn value_url(&self) -> String {
        let c = &self.config;
        format!(
            "{}/accounts/{}/storage/kv/namespaces/{}/values/{}",
            c.base_url.trim_end_matches('/'),
            c.account_id,
            c.namespace_id,
            c.key
        )
    }
}

#[async_trait]
impl CredentialsProvider for KvCredentials {
    async fn get_credentials(&self) -> Result<Credential> {
        let resp = self
            .http
            .get(self.value_url())
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;

        let status = resp.status();
        if status == rquest::StatusCode::NOT_FOUND {
            return Err(GatewayError::CredentialsNotFound);
        }
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Storage(format!("kv read failed ({status}): {body}")));
        }
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::Storage(format!("invalid credential in kv: {e}")))
    }

    async fn save_credentials(&self, credential: &Credential) -> Result<()> {
        let body = serde_json::to_string(credential)?;
        let resp = self
            .http
            .put(self.value_url())
            .bearer_auth(&self.config.api_token)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(GatewayError::Storage(format!("kv write failed ({status}): {text}")))
    }

    async fn refresh_token(&self) -> Result<Credential> {
        refresh_and_save(self, &self.refresher).await
    }

    fn name(&self) -> &'static str {
        "kv"
    }
}
