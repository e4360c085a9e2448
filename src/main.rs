use anyhow::{Context as _, Result};
use arc_swap::ArcSwap;
use assistgate_auth::CredentialManager;
use assistgate_config::{Config, ConfigWatcher};
use assistgate_provider::CodeAssistClient;
use assistgate_proxy::AppState;
use assistgate_store::TokenRefresher;
use assistgate_types::{Credential, CredentialStatus, CredentialsProvider};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Duration};

#[derive(Parser, Debug)]
#[command(
    name = "assistgate",
    version,
    about = "assistgate: OpenAI-compatible gateway for the Cloud Code Assist API"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server.
    Serve {
        /// Path to the YAML configuration file (hot-reloaded).
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Override the listening port (default: 8018).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },
    /// Show the state of the stored credential.
    Status {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Force a refresh-token exchange and persist the result.
    Refresh {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, host } => cmd_serve(config, port, host).await,
        Commands::Status { config } => cmd_status(config).await,
        Commands::Refresh { config } => cmd_refresh(config).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::from_file(p)
            .map_err(|e| anyhow::anyhow!("config error in {}: {e}", p.display())),
        None => Config::from_env().map_err(|e| anyhow::anyhow!("config error: {e}")),
    }
}

/// Install the tracing subscriber, plus Sentry when `SENTRY_DSN` is set.
///
/// `RUST_LOG` wins over `log.level`. The returned guard flushes Sentry on drop.
fn init_telemetry(config: &Config) -> Option<sentry::ClientInitGuard> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

    let sentry = std::env::var("SENTRY_DSN")
        .ok()
        .filter(|dsn| !dsn.is_empty())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log.json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true)))
        .with(sentry.is_some().then(|| sentry::integrations::tracing::layer()))
        .init();

    sentry
}

fn credential_manager(config: &Config, http: &rquest::Client) -> Arc<CredentialManager> {
    let refresher = TokenRefresher::new(http.clone(), &config.oauth);
    let store = assistgate_store::from_config(&config.credentials, http.clone(), refresher);
    Arc::new(
        CredentialManager::new(store)
            .with_expiry_buffer(Duration::from_secs(config.refresh.expiry_buffer_secs)),
    )
}

async fn cmd_serve(config_path: Option<PathBuf>, port: Option<u16>, host: Option<String>) -> Result<()> {
    let (shared, watcher) = match &config_path {
        Some(path) => {
            let watcher = Arc::new(
                ConfigWatcher::new(path.clone())
                    .map_err(|e| anyhow::anyhow!("config error in {}: {e}", path.display()))?,
            );
            (watcher.arc(), Some(watcher))
        }
        None => (Arc::new(ArcSwap::from_pointee(load_config(None)?)), None),
    };
    let config = shared.load_full();
    let _sentry = init_telemetry(&config);

    let http = rquest::Client::new();
    let manager = credential_manager(&config, &http);
    let credential = manager
        .load()
        .await
        .with_context(|| format!("loading credentials from the {} store", manager.provider_name()))?;
    tracing::info!(
        store = manager.provider_name(),
        status = %manager.status(),
        expiry_date = credential.expiry_date,
        "credentials loaded"
    );
    let _refresh = manager.start_background_refresh(Duration::from_secs(config.refresh.interval_secs.max(1)));

    let client = Arc::new(CodeAssistClient::new(http, &config.upstream, Arc::clone(&manager)));
    let project_override = config
        .upstream
        .project
        .clone()
        .or_else(|| std::env::var("GOOGLE_CLOUD_PROJECT").ok());
    let project = assistgate_provider::discover(&client, project_override.as_deref())
        .await
        .context("project discovery failed")?;

    if let Some(watcher) = watcher {
        watcher.watch();
    }

    let state = AppState::new(shared, client, project);
    let app = assistgate_proxy::make_router(state);

    let host = host.unwrap_or_else(|| config.host.clone());
    let port = port.unwrap_or(config.port);
    let addr = format!("{host}:{port}");

    let mut listenfd = listenfd::ListenFd::from_env();
    let listener = if let Some(std_listener) = listenfd.take_tcp_listener(0)? {
        std_listener.set_nonblocking(true)?;
        tracing::info!("using inherited socket");
        tokio::net::TcpListener::from_std(std_listener)?
    } else {
        tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?
    };
    tracing::info!(addr = %listener.local_addr()?, "assistgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

fn describe(credential: &Credential) -> String {
    if credential.expiry_date == 0 {
        return "expiry unknown".to_string();
    }
    let now = assistgate_types::credential::now_millis();
    if credential.expiry_date <= now {
        "expired".to_string()
    } else {
        format!("expires in {}s", (credential.expiry_date - now) / 1000)
    }
}

/// Summarise the stored credential. Reads the store only; never refreshes.
async fn status_report(store: &dyn CredentialsProvider, buffer: Duration) -> String {
    let name = store.name();
    match store.get_credentials().await {
        Ok(credential) => format!(
            "{name}: {} ({})\nrefresh token: {}",
            credential.status(buffer),
            describe(&credential),
            if credential.can_refresh() { "present" } else { "absent" }
        ),
        Err(e) => format!("{name}: {} ({e})", CredentialStatus::Missing),
    }
}

async fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_ref())?;
    let http = rquest::Client::new();
    let refresher = TokenRefresher::new(http.clone(), &config.oauth);
    let store = assistgate_store::from_config(&config.credentials, http, refresher);
    let buffer = Duration::from_secs(config.refresh.expiry_buffer_secs);
    println!("{}", status_report(store.as_ref(), buffer).await);
    Ok(())
}

async fn cmd_refresh(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_ref())?;
    let manager = credential_manager(&config, &rquest::Client::new());
    manager
        .load()
        .await
        .with_context(|| format!("loading credentials from the {} store", manager.provider_name()))?;
    let credential = manager.refresh().await.context("refresh failed")?;
    println!("refreshed: {}", describe(&credential));
    Ok(())
}
