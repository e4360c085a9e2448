//! Core types and traits for the assistgate workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! gateway: the error taxonomy, the OAuth credential record, the
//! OpenAI-compatible request body, and the credential provider trait that
//! every storage backend implements.

pub mod chat;
pub mod credential;
pub mod error;
pub mod traits;

pub use chat::ChatRequest;
pub use credential::{Credential, CredentialStatus};
pub use error::GatewayError;
pub use traits::{ByteStream, CredentialsProvider, RequestTranslator, ResponseTranslator};
