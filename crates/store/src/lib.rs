//! Credential storage backends for the upstream OAuth credential.
//!
//! Every backend implements [`CredentialsProvider`] and delegates the
//! refresh-token grant to a shared [`TokenRefresher`].

pub mod env;
pub mod file;
pub mod kv;
pub mod memory;
pub mod refresh;

pub use env::EnvCredentials;
pub use file::FileCredentials;
pub use kv::KvCredentials;
pub use memory::InMemoryCredentials;
pub use refresh::TokenRefresher;

use assistgate_config::{CredentialSource, CredentialsConfig};
use assistgate_types::CredentialsProvider;
use std::sync::Arc;

/// Build the provider selected by `credentials.source`.
#[must_use]
pub fn from_config(
    config: &CredentialsConfig,
    http: rquest::Client,
    refresher: TokenRefresher,
) -> Arc<dyn CredentialsProvider> {
    match config.source {
        CredentialSource::File => Arc::new(FileCredentials::new(config.resolved_path(), refresher)),
        CredentialSource::Env => Arc::new(EnvCredentials::new(config.env_var.clone(), refresher)),
        CredentialSource::Kv => Arc::new(KvCredentials::new(http, config.kv.clone(), refresher)),
    }
}
