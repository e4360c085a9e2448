//! Credential lifecycle management for outbound upstream calls.
//!
//! The [`CredentialManager`] owns the current bearer credential, keeps it
//! fresh proactively, and recovers from upstream 401s reactively.

pub mod manager;

pub use manager::{CredentialManager, DEFAULT_EXPIRY_BUFFER, Retry};
