//! HTTP proxy layer: axum router, route handlers, and error mapping.
//!
//! Exposes an OpenAI-compatible `/v1/chat/completions` endpoint, the
//! public-dialect `models/{model}:{action}` routes, a `/v1/models`
//! listing, and `/health`.

mod chat;
mod error;
mod models;
mod native;

pub use error::ApiError;

use arc_swap::ArcSwap;
use assistgate_config::Config;
use assistgate_provider::{CodeAssistClient, PipelineOptions};
use assistgate_translate::ModelRules;
use axum::{
    Json, Router,
    body::Body,
    http::{HeaderMap, HeaderName, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use assistgate_types::ByteStream;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Server configuration. Atomically swappable for hot-reloading.
    pub config: Arc<ArcSwap<Config>>,
    /// Upstream client holding the credential manager.
    pub client: Arc<CodeAssistClient>,
    /// Tenant id resolved at startup.
    pub project: String,
}

impl AppState {
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        client: Arc<CodeAssistClient>,
        project: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            client,
            project: project.into(),
        })
    }
}

/// The model normalization table currently configured.
fn model_rules(config: &Config) -> ModelRules {
    ModelRules::from_patterns(
        config
            .models
            .rules
            .iter()
            .map(|r| (r.pattern.as_str(), r.target.as_deref())),
    )
}

/// The caller's `Authorization` header, when forwarding is enabled.
fn caller_auth(config: &Config, headers: &HeaderMap) -> Option<String> {
    if !config.forward_client_auth {
        return None;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn pipeline_options(config: &Config) -> PipelineOptions {
    PipelineOptions::from(&config.streaming)
}

/// Wrap a rendered frame stream as an SSE response.
fn sse_response(frames: ByteStream) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Build the full axum router.
///
/// Routes:
/// - POST /v1/chat/completions           OpenAI-compatible
/// - POST /v1beta/models/{model}:{action} public dialect
/// - POST /v1/models/{model}:{action}     public dialect
/// - GET  /v1/models
/// - GET  /health
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1beta/models/{target}", post(native::generate))
        .route("/v1/models/{target}", post(native::generate))
        .route("/v1/models", get(models::list_models))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assistgate_auth::CredentialManager;
    use assistgate_config::UpstreamConfig;
    use assistgate_store::InMemoryCredentials;
    use assistgate_types::Credential;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    pub(crate) const PROJECT: &str = "test-project";

    /// Serve `app` on an ephemeral port and return its base URL.
    pub(crate) async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    pub(crate) async fn state_with(base_url: String, config: Config) -> Arc<AppState> {
        let store = Arc::new(InMemoryCredentials::with_credential(Credential::new("server-token")));
        let manager = Arc::new(CredentialManager::new(store));
        manager.load().await.unwrap();
        let upstream = UpstreamConfig {
            base_url,
            ..config.upstream.clone()
        };
        let client = CodeAssistClient::new(rquest::Client::new(), &upstream, manager);
        AppState::new(
            Arc::new(ArcSwap::from_pointee(config)),
            Arc::new(client),
            PROJECT,
        )
    }

    /// State whose upstream is unreachable; for requests that must fail
    /// before any network call.
    pub(crate) async fn offline_state() -> Arc<AppState> {
        state_with("http://127.0.0.1:9".into(), Config::default()).await
    }

    pub(crate) fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    pub(crate) async fn body_string(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub(crate) async fn body_json(resp: Response) -> Value {
        serde_json::from_str(&body_string(resp).await).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = make_router(offline_state().await);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = make_router(offline_state().await);
        let resp = app
            .oneshot(Request::builder().uri("/v2/whatever").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_model_rules_follow_config() {
        let mut config = Config::default();
        assert_eq!(model_rules(&config).normalize("gemini-1.5-pro"), "gemini-2.5-pro");
        config.models.rules = vec![assistgate_config::ModelRuleConfig {
            pattern: "*".into(),
            target: Some("gemini-2.5-flash".into()),
        }];
        assert_eq!(model_rules(&config).normalize("anything"), "gemini-2.5-flash");
    }

    #[test]
    fn test_caller_auth_requires_opt_in() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer theirs".parse().unwrap());
        let mut config = Config::default();
        assert_eq!(caller_auth(&config, &headers), None);
        config.forward_client_auth = true;
        assert_eq!(caller_auth(&config, &headers).as_deref(), Some("Bearer theirs"));
        assert_eq!(caller_auth(&config, &HeaderMap::new()), None);
    }
}
