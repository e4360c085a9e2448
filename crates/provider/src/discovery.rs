//! Tenant (project) discovery and onboarding.
//!
//! The upstream scopes every generation call to a tenant id. It is taken
//! from configuration when set; otherwise `loadCodeAssist` reports the
//! caller's tenant, and a caller without one is onboarded onto the default
//! tier.

use crate::client::{Action, CodeAssistClient};
use assistgate_types::{GatewayError, error::Result};
use serde_json::{Value, json};
use std::time::Duration;

const FALLBACK_TIER: &str = "free-tier";

/// How long to wait for the `onboardUser` long-running operation.
#[derive(Debug, Clone, Copy)]
pub struct OnboardPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for OnboardPolicy {
    fn default() -> Self {
        Self {
            attempts: 12,
            delay: Duration::from_secs(5),
        }
    }
}

fn client_metadata() -> Value {
    json!({
        "ideType": "IDE_UNSPECIFIED",
        "platform": "PLATFORM_UNSPECIFIED",
        "pluginType": "GEMINI",
    })
}

/// The tenant id from a `cloudaicompanionProject` field, which is either a
/// bare string or an object with an `id`.
fn project_id(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(o) => o
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn default_tier(load: &Value) -> String {
    load.get("allowedTiers")
        .and_then(Value::as_array)
        .and_then(|tiers| {
            tiers
                .iter()
                .find(|t| t.get("isDefault").and_then(Value::as_bool) == Some(true))
        })
        .and_then(|t| t.get("id").and_then(Value::as_str))
        .unwrap_or(FALLBACK_TIER)
        .to_string()
}

/// Resolve the tenant id once at startup.
///
/// # Errors
///
/// Returns the upstream error of either call, or [`GatewayError::Config`]
/// when onboarding never yields a tenant.
pub async fn discover(client: &CodeAssistClient, env_override: Option<&str>) -> Result<String> {
    discover_with(client, env_override, OnboardPolicy::default()).await
}

/// [`discover`] with an explicit onboarding poll policy.
///
/// # Errors
///
/// See [`discover`].
pub async fn discover_with(
    client: &CodeAssistClient,
    env_override: Option<&str>,
    policy: OnboardPolicy,
) -> Result<String> {
    if let Some(project) = env_override.filter(|p| !p.is_empty()) {
        tracing::info!(project, "using configured project");
        return Ok(project.to_string());
    }

    let load = client
        .send_json(
            Action::LoadCodeAssist,
            &json!({ "metadata": client_metadata() }),
            None,
        )
        .await?;
    if let Some(project) = project_id(load.get("cloudaicompanionProject")) {
        tracing::info!(%project, "discovered project");
        return Ok(project);
    }

    let tier = default_tier(&load);
    tracing::info!(%tier, "no project assigned, onboarding");
    let request = json!({ "tierId": tier, "metadata": client_metadata() });
    for attempt in 1..=policy.attempts.max(1) {
        let op = client
            .send_json(Action::OnboardUser, &request, None)
            .await?;
        if op.get("done").and_then(Value::as_bool) == Some(true) {
            return project_id(op.pointer("/response/cloudaicompanionProject")).ok_or_else(|| {
                GatewayError::Config("onboarding finished without a project id".into())
            });
        }
        tracing::debug!(attempt, "onboarding in progress");
        tokio::time::sleep(policy.delay).await;
    }
    Err(GatewayError::Config(format!(
        "onboarding did not complete after {} attempts; set upstream.project",
        policy.attempts.max(1)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client_for, serve};
    use axum::{Json, Router, routing::post};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    const FAST: OnboardPolicy = OnboardPolicy {
        attempts: 3,
        delay: Duration::from_millis(1),
    };

    #[test]
    fn test_project_id_shapes() {
        assert_eq!(project_id(Some(&json!("p-1"))), Some("p-1".into()));
        assert_eq!(project_id(Some(&json!({"id": "p-2", "name": "x"}))), Some("p-2".into()));
        assert_eq!(project_id(Some(&json!(""))), None);
        assert_eq!(project_id(None), None);
    }

    #[test]
    fn test_default_tier() {
        let load = json!({"allowedTiers": [{"id": "legacy-tier"}, {"id": "standard-tier", "isDefault": true}]});
        assert_eq!(default_tier(&load), "standard-tier");
        assert_eq!(default_tier(&json!({})), "free-tier");
    }

    #[tokio::test]
    async fn test_override_skips_network() {
        let client = client_for("http://127.0.0.1:9".into(), "t").await;
        assert_eq!(discover(&client, Some("pinned")).await.unwrap(), "pinned");
    }

    #[tokio::test]
    async fn test_load_returns_project() {
        let base = serve(Router::new().route(
            "/v1internal:loadCodeAssist",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["metadata"]["pluginType"], "GEMINI");
                Json(json!({"cloudaicompanionProject": "found-123", "currentTier": {"id": "free-tier"}}))
            }),
        ))
        .await;
        let client = client_for(base, "t").await;
        assert_eq!(discover_with(&client, None, FAST).await.unwrap(), "found-123");
    }

    #[tokio::test]
    async fn test_onboarding_polls_until_done() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let base = serve(
            Router::new()
                .route(
                    "/v1internal:loadCodeAssist",
                    post(|| async {
                        Json(json!({"allowedTiers": [{"id": "free-tier", "isDefault": true}]}))
                    }),
                )
                .route(
                    "/v1internal:onboardUser",
                    post(move |Json(body): Json<Value>| {
                        let counter = Arc::clone(&counter);
                        async move {
                            assert_eq!(body["tierId"], "free-tier");
                            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                                Json(json!({"done": false}))
                            } else {
                                Json(json!({"done": true, "response": {"cloudaicompanionProject": {"id": "onboarded-7"}}}))
                            }
                        }
                    }),
                ),
        )
        .await;
        let client = client_for(base, "t").await;
        assert_eq!(discover_with(&client, None, FAST).await.unwrap(), "onboarded-7");
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_onboarding_gives_up() {
        let base = serve(
            Router::new()
                .route("/v1internal:loadCodeAssist", post(|| async { Json(json!({})) }))
                .route(
                    "/v1internal:onboardUser",
                    post(|| async { Json(json!({"done": false})) }),
                ),
        )
        .await;
        let client = client_for(base, "t").await;
        let err = discover_with(&client, None, FAST).await.unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
