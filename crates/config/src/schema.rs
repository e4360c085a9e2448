use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    8018
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 8018).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    /// Let a client-supplied `Authorization` header reach the upstream
    /// instead of the managed credential.
    #[serde(default)]
    pub forward_client_auth: bool,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            upstream: UpstreamConfig::default(),
            credentials: CredentialsConfig::default(),
            oauth: OAuthConfig::default(),
            refresh: RefreshConfig::default(),
            streaming: StreamingConfig::default(),
            models: ModelsConfig::default(),
            forward_client_auth: false,
            log: LogConfig::default(),
        }
    }
}

/// Where the Cloud Code Assist API lives and how to identify to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Tenant (GCP project) id. When unset it is discovered at startup.
    pub project: Option<String>,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cloudcode-pa.googleapis.com".to_string(),
            project: None,
            user_agent: concat!("assistgate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Which credential store backs the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    #[default]
    File,
    Env,
    Kv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub source: CredentialSource,
    /// Credential file for the `file` source. `~` expands to the home dir.
    pub path: String,
    /// Environment variable holding the JSON record for the `env` source.
    pub env_var: String,
    pub kv: KvConfig,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            source: CredentialSource::File,
            path: "~/.gemini/oauth_creds.json".to_string(),
            env_var: "ASSISTGATE_OAUTH_CREDS".to_string(),
            kv: KvConfig::default(),
        }
    }
}

impl CredentialsConfig {
    /// The credential file path with a leading `~` expanded.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

/// Cloudflare Workers KV namespace holding the credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    pub base_url: String,
    pub account_id: String,
    pub namespace_id: String,
    pub key: String,
    pub api_token: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cloudflare.com/client/v4".to_string(),
            account_id: String::new(),
            namespace_id: String::new(),
            key: "oauth_creds".to_string(),
            api_token: String::new(),
        }
    }
}

/// OAuth client used for the refresh-token grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Period of the background expiry check.
    pub interval_secs: u64,
    /// A credential this close to expiry is refreshed.
    pub expiry_buffer_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            expiry_buffer_secs: 300,
        }
    }
}

/// Knobs for the streaming pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Capacity of each inter-stage queue.
    pub queue_depth: usize,
    /// Interval between keepalive comments before the first upstream byte.
    /// `0` disables keepalives.
    pub keepalive_secs: u64,
    /// Log every raw upstream payload at debug level.
    pub debug: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            queue_depth: 2,
            keepalive_secs: 15,
            debug: false,
        }
    }
}

/// One entry of the model normalization table.
///
/// `pattern` is an exact name, a prefix (`gemini-3*`) or a substring
/// (`*flash*`). A rule with no `target` passes the name through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRuleConfig {
    pub pattern: String,
    #[serde(default)]
    pub target: Option<String>,
}

impl ModelRuleConfig {
    fn new(pattern: &str, target: Option<&str>) -> Self {
        Self {
            pattern: pattern.to_string(),
            target: target.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Ordered most-specific-first; the first match wins.
    #[serde(default = "default_model_rules")]
    pub rules: Vec<ModelRuleConfig>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            rules: default_model_rules(),
        }
    }
}

fn default_model_rules() -> Vec<ModelRuleConfig> {
    vec![
        ModelRuleConfig::new("gemini-3*", None),
        ModelRuleConfig::new("*lite*", Some("gemini-2.5-flash-lite")),
        ModelRuleConfig::new("*flash*", Some("gemini-2.5-flash")),
        ModelRuleConfig::new("*pro*", Some("gemini-2.5-pro")),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of the human format.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    fn figment() -> figment::Figment {
        figment::Figment::from(figment::providers::Serialized::defaults(Config::default()))
    }

    fn env() -> figment::providers::Env {
        figment::providers::Env::prefixed("ASSISTGATE_").split("__")
    }

    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::providers::{Format as _, Yaml};
        Self::figment().merge(Yaml::string(yaml)).extract()
    }

    /// Loads configuration from a file path, merged with defaults and then
    /// `ASSISTGATE_`-prefixed environment variables (`__` separates levels).
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &Path) -> Result<Self, figment::Error> {
        use figment::providers::{Format as _, Yaml};
        Self::figment()
            .merge(Yaml::file(path))
            .merge(Self::env())
            .extract()
    }

    /// Loads configuration from defaults and the environment only.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if an environment value has the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self, figment::Error> {
        Self::figment().merge(Self::env()).extract()
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}
