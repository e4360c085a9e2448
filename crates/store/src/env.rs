//! Credential record supplied through an environment variable.

use crate::refresh::{TokenRefresher, refresh_and_save};
use async_trait::async_trait;
use assistgate_types::{Credential, CredentialsProvider, GatewayError, error::Result};
use std::sync::RwLock;

/// A [`CredentialsProvider`] reading the JSON record from an environment
/// variable.
///
/// The process environment cannot be written back, so saved credentials are
/// held as an in-process override that shadows the variable from then on.
pub struct EnvCredentials {
    var: String,
    saved: RwLock<Option<Credential>>,
    refresher: TokenRefresher,
}

impl EnvCredentials {
    #[must_use]
    pub fn new(var: String, refresher: TokenRefresher) -> Self {
        Self {
            var,
            saved: RwLock::new(None),
            refresher,
        }
    }

    fn saved(&self) -> Option<Credential> {
        self.saved
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CredentialsProvider for EnvCredentials {
    async fn get_credentials(&self) -> Result<Credential> {
        if let Some(c) = self.saved() {
            return Ok(c);
        }
        let raw = std::env::var(&self.var).map_err(|_| GatewayError::CredentialsNotFound)?;
        serde_json::from_str(&raw)
            .map_err(|e| GatewayError::Storage(format!("invalid credential in ${}: {e}", self.var)))
    }

    async fn save_credentials(&self, credential: &Credential) -> Result<()> {
        *self
            .saved
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    async fn refresh_token(&self) -> Result<Credential> {
        refresh_and_save(self, &self.refresher).await
    }

    fn name(&self) -> &'static str {
        "env"
    }
}
