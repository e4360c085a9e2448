//! In-memory credential store behind a `Mutex`.

use crate::refresh::{TokenRefresher, refresh_and_save};
use async_trait::async_trait;
use assistgate_types::{Credential, CredentialsProvider, GatewayError, error::Result};
use std::sync::Mutex;

/// An in-memory [`CredentialsProvider`] for tests and ephemeral use.
#[derive(Default)]
pub struct InMemoryCredentials {
    data: Mutex<Option<Credential>>,
    refresher: Option<TokenRefresher>,
}

impl InMemoryCredentials {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `credential`.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            data: Mutex::new(Some(credential)),
            refresher: None,
        }
    }

    /// Enables [`CredentialsProvider::refresh_token`] through `refresher`.
    #[must_use]
    pub fn with_refresher(mut self, refresher: TokenRefresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.data.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialsProvider for InMemoryCredentials {
    async fn get_credentials(&self) -> Result<Credential> {
        self.lock().clone().ok_or(GatewayError::CredentialsNotFound)
    }

    async fn save_credentials(&self, credential: &Credential) -> Result<()> {
        *self.lock() = Some(credential.clone());
        Ok(())
    }

    async fn refresh_token(&self) -> Result<Credential> {
        let refresher = self
            .refresher
            .as_ref()
            .ok_or_else(|| GatewayError::Auth("no token endpoint configured".into()))?;
        refresh_and_save(self, refresher).await
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::tests::mock_refresher;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryCredentials::new();
        store.save_credentials(&Credential::new("test-access")).await.unwrap();
        let loaded = store.get_credentials().await.unwrap();
        assert_eq!(loaded.access_token, "test-access");
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = InMemoryCredentials::new();
        let err = store.get_credentials().await.unwrap_err();
        assert!(matches!(err, GatewayError::CredentialsNotFound));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = InMemoryCredentials::with_credential(Credential::new("first"));
        store.save_credentials(&Credential::new("second")).await.unwrap();
        assert_eq!(store.get_credentials().await.unwrap().access_token, "second");
    }

    #[tokio::test]
    async fn test_refresh_without_refresher() {
        let store = InMemoryCredentials::with_credential(Credential::new("a").with_refresh("r"));
        assert!(matches!(
            store.refresh_token().await,
            Err(GatewayError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_persists_new_token() {
        let refresher = mock_refresher(
            serde_json::json!({"access_token": "renewed", "expires_in": 3600}),
            StatusCode::OK,
        )
        .await;
        let store = InMemoryCredentials::with_credential(Credential::new("old").with_refresh("rt"))
            .with_refresher(refresher);

        let refreshed = store.refresh_token().await.unwrap();
        assert_eq!(refreshed.access_token, "renewed");
        assert_eq!(store.get_credentials().await.unwrap().access_token, "renewed");
        assert_eq!(store.get_credentials().await.unwrap().refresh_token, "rt");
    }
}
