//! Async traits shared across all assistgate crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `assistgate-types`, not on each other.

use crate::Credential;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use serde_json::Value;
use std::pin::Pin;

/// A pinned, sendable stream of raw upstream byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Pluggable storage for the upstream bearer credential.
///
/// Implementations are interchangeable: the lifecycle manager never inspects
/// which one is active.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Load the stored credential.
    ///
    /// Returns [`crate::GatewayError::CredentialsNotFound`] when nothing is stored.
    async fn get_credentials(&self) -> Result<Credential>;

    /// Persist a credential, replacing whatever was stored.
    async fn save_credentials(&self, credential: &Credential) -> Result<()>;

    /// Exchange the stored refresh token for a new access token, persist the
    /// result and return it.
    ///
    /// A persistence failure after a successful exchange is not an error.
    async fn refresh_token(&self) -> Result<Credential>;

    /// Short, stable name of the backend (for logs).
    fn name(&self) -> &'static str;
}

/// Translates an `OpenAI`-format request into the upstream's native format.
///
/// Implementations must be pure (no I/O).
pub trait RequestTranslator: Send + Sync {
    /// Convert an `OpenAI`-compatible JSON request body to the upstream format.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Translation`] if the request cannot be translated.
    fn translate_request(&self, req: Value) -> Result<Value>;
}

/// Translates the upstream's native response back to `OpenAI` format.
///
/// Implementations must be pure (no I/O).
pub trait ResponseTranslator: Send + Sync {
    /// Convert an upstream JSON response body to `OpenAI` format.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Translation`] if the response cannot be translated.
    fn translate_response(&self, res: Value) -> Result<Value>;
}
