//! Lifecycle manager for the single upstream bearer credential.
//!
//! Responsibilities:
//! - Load the credential from a [`CredentialsProvider`] at startup.
//! - Refresh proactively when it enters the expiry buffer (on load and from
//!   a background schedule).
//! - Refresh reactively once when the upstream answers 401.
//! - Publish every loaded or refreshed credential as a new immutable
//!   snapshot, so request handlers never observe a partial update.
use arc_swap::ArcSwapOption;
use assistgate_types::{Credential, CredentialStatus, CredentialsProvider, GatewayError, error::Result};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

/// Default window before expiry in which a credential is refreshed.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Instruction to rebuild and resend a request after a reactive refresh.
#[derive(Debug, Clone)]
pub struct Retry {
    /// The original request body, unchanged.
    pub body: Bytes,
    /// The freshly published credential to send it with.
    pub credential: Arc<Credential>,
}

pub struct CredentialManager {
    provider: Arc<dyn CredentialsProvider>,
    snapshot: ArcSwapOption<Credential>,
    expiry_buffer: Duration,
    /// Serialises refreshes so concurrent 401s do not stampede the token endpoint.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CredentialManager {
    pub fn new(provider: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            provider,
            snapshot: ArcSwapOption::empty(),
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Name of the backing store.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// The current credential, if one has been published.
    pub fn snapshot(&self) -> Option<Arc<Credential>> {
        self.snapshot.load_full()
    }

    pub fn status(&self) -> CredentialStatus {
        self.snapshot
            .load()
            .as_deref()
            .map_or(CredentialStatus::Missing, |c| c.status(self.expiry_buffer))
    }

    fn publish(&self, credential: Credential) -> Arc<Credential> {
        let credential = Arc::new(credential);
        self.snapshot.store(Some(Arc::clone(&credential)));
        credential
    }

    /// Load the stored credential and publish it.
    ///
    /// A credential inside the expiry buffer is refreshed first; if that
    /// refresh fails the stale credential is published anyway and callers
    /// must tolerate a later 401.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CredentialsNotFound`] when the store is empty,
    /// or the store's own read error.
    pub async fn load(&self) -> Result<Arc<Credential>> {
        let credential = self.provider.get_credentials().await?;
        if !credential.expires_within(self.expiry_buffer) {
            tracing::info!(store = self.provider.name(), "credential loaded");
            return Ok(self.publish(credential));
        }

        tracing::info!(store = self.provider.name(), "credential near expiry, refreshing");
        match self.refresh().await {
            Ok(fresh) => Ok(fresh),
            Err(e) => {
                tracing::warn!(error = %e, "refresh on load failed, using stale credential");
                Ok(self.publish(credential))
            }
        }
    }

    /// Refresh through the provider and publish the result.
    ///
    /// # Errors
    ///
    /// Propagates the provider's refresh error; the snapshot is untouched.
    pub async fn refresh(&self) -> Result<Arc<Credential>> {
        let _guard = self.refresh_lock.lock().await;
        let fresh = self.provider.refresh_token().await?;
        Ok(self.publish(fresh))
    }

    /// One tick of the background schedule: re-read the store (it may have
    /// been updated externally) and refresh if inside the buffer.
    ///
    /// A stored record that expires before the current snapshot is ignored,
    /// so a refresh whose save failed is not rolled back.
    ///
    /// # Errors
    ///
    /// Returns the read or refresh error.
    pub async fn refresh_if_needed(&self) -> Result<Arc<Credential>> {
        let stored = self.provider.get_credentials().await?;
        let newer = self
            .snapshot()
            .filter(|current| stored.expiry_date < current.expiry_date);
        let expiring = newer
            .as_deref()
            .unwrap_or(&stored)
            .expires_within(self.expiry_buffer);
        if expiring {
            return self.refresh().await;
        }
        match newer {
            Some(current) => {
                tracing::debug!(
                    stored_expiry = stored.expiry_date,
                    snapshot_expiry = current.expiry_date,
                    "stored credential is older than the snapshot, keeping snapshot"
                );
                Ok(current)
            }
            None => Ok(self.publish(stored)),
        }
    }

    /// Spawn the periodic expiry check. Failures are logged and the schedule
    /// continues; abort the handle to stop it.
    pub fn start_background_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; `load` has just run.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match manager.refresh_if_needed().await {
                    Ok(c) => tracing::debug!(expiry_date = c.expiry_date, "credential check ok"),
                    Err(e) => tracing::warn!(error = %e, "background credential refresh failed"),
                }
            }
        })
    }

    /// The `Authorization` header value for an outbound request.
    ///
    /// A caller-supplied authorization passes through unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] when no credential has been published.
    pub fn authorization(&self, caller_auth: Option<&str>) -> Result<String> {
        if let Some(auth) = caller_auth {
            return Ok(auth.to_string());
        }
        self.snapshot
            .load()
            .as_deref()
            .map(Credential::authorization)
            .ok_or_else(|| GatewayError::Auth("no credential loaded".into()))
    }

    /// Attach the `Authorization` header to an outbound request, passing a
    /// caller-supplied one through unmodified.
    ///
    /// # Errors
    ///
    /// See [`Self::authorization`].
    pub fn with_auth(
        &self,
        request: rquest::RequestBuilder,
        caller_auth: Option<&str>,
    ) -> Result<rquest::RequestBuilder> {
        Ok(request.header("authorization", self.authorization(caller_auth)?))
    }

    /// React to an upstream 401: refresh exactly once and tell the caller to
    /// resend `original_body` with the new credential.
    ///
    /// # Errors
    ///
    /// Returns the refresh error. The caller then surfaces the original 401
    /// and must not retry again.
    pub async fn handle_unauthorized(&self, original_body: Bytes) -> Result<Retry> {
        tracing::info!("upstream rejected credential, refreshing");
        let credential = self.refresh().await.inspect_err(|e| {
            tracing::warn!(error = %e, "reactive refresh failed");
        })?;
        Ok(Retry {
            body: original_body,
            credential,
        })
    }
}
