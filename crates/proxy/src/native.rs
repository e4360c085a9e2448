//! Public-dialect passthrough: `models/{model}:{action}`.
//!
//! The body is already in the upstream's public format; only the model is
//! normalized, the tenant injected, and the reply envelope removed.

use assistgate_provider::{Action, pipeline};
use assistgate_translate::{EnvelopeClassifier, NativeSseRenderer, envelope};
use assistgate_types::GatewayError;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;

use crate::{AppState, caller_auth, error::ApiError, model_rules, pipeline_options, sse_response};

/// Split `gemini-2.5-pro:generateContent` into model and action.
fn parse_target(target: &str) -> Result<(&str, Action), GatewayError> {
    let (model, action) = target
        .rsplit_once(':')
        .ok_or_else(|| GatewayError::Translation(format!("expected '{{model}}:{{action}}', got '{target}'")))?;
    if model.is_empty() {
        return Err(GatewayError::Translation("missing model".into()));
    }
    Ok((model, action.parse()?))
}

/// Handles `POST /v1beta/models/{model}:{action}` and its `/v1` twin.
///
/// # Errors
///
/// Returns [`ApiError`] for an unknown action, a body that is not JSON, or
/// a failed upstream call.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let config = state.config.load_full();
    let (client_model, action) = parse_target(&target)?;
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::Translation(format!("invalid request body: {e}")))?;
    let rules = model_rules(&config);
    let model = rules.normalize(client_model);
    let auth = caller_auth(&config, &headers);

    tracing::info!(
        model = %client_model,
        upstream_model = %model,
        %action,
        "native request"
    );

    match action {
        Action::StreamGenerateContent => {
            let wrapped = envelope::wrap_generate(&model, &state.project, body);
            let raw = state
                .client
                .open_stream(query.as_deref(), &wrapped, auth.as_deref())
                .await?;
            let frames = pipeline::spawn(
                raw,
                EnvelopeClassifier,
                NativeSseRenderer,
                &pipeline_options(&config),
            );
            Ok(sse_response(frames))
        }
        Action::CountTokens => {
            let wrapped = envelope::wrap_count_tokens(&model, body);
            let reply = state
                .client
                .send_json(Action::CountTokens, &wrapped, auth.as_deref())
                .await?;
            Ok(Json(envelope::unwrap(reply)).into_response())
        }
        _ => {
            let wrapped = envelope::wrap_generate(&model, &state.project, body);
            let reply = state
                .client
                .send_json(Action::GenerateContent, &wrapped, auth.as_deref())
                .await?;
            Ok(Json(envelope::unwrap(reply)).into_response())
        }
    }
}
