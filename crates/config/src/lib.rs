//! Configuration loading and hot-reloading for the assistgate gateway.
//!
//! Uses figment for YAML and environment configuration layered over
//! defaults, and notify + arc-swap for live file watching.

pub mod schema;
pub mod watcher;

pub use schema::{
    Config, CredentialSource, CredentialsConfig, KvConfig, LogConfig, ModelRuleConfig,
    ModelsConfig, OAuthConfig, RefreshConfig, StreamingConfig, UpstreamConfig,
};
pub use watcher::ConfigWatcher;
