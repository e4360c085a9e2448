//! Chat completions handler: OpenAI-compatible requests to the upstream.

use assistgate_provider::{Action, pipeline};
use assistgate_translate::{CodeAssistToOpenAI, EventClassifier, OpenAISseRenderer, to_upstream};
use assistgate_types::{ChatRequest, ResponseTranslator as _};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::{AppState, caller_auth, error::ApiError, model_rules, pipeline_options, sse_response};

/// Handles `POST /v1/chat/completions` requests.
///
/// Translates the request (rejecting tool-call pairing violations before
/// any upstream call), forwards it, and returns either a complete JSON
/// response or an SSE stream.
///
/// # Errors
///
/// Returns [`ApiError`] if translation or the upstream call fails.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let config = state.config.load_full();
    let request = ChatRequest::from_slice(&body)?;
    let client_model = request.model.clone();
    let upstream = to_upstream(request.into_body(), &model_rules(&config), &state.project)?;
    let auth = caller_auth(&config, &headers);

    tracing::info!(
        model = %client_model,
        upstream_model = %upstream.model,
        stream = upstream.stream,
        "chat completion request"
    );

    if upstream.stream {
        let raw = state
            .client
            .open_stream(None, &upstream.body, auth.as_deref())
            .await?;
        let frames = pipeline::spawn(
            raw,
            EventClassifier,
            OpenAISseRenderer::new(upstream.model),
            &pipeline_options(&config),
        );
        return Ok(sse_response(frames));
    }

    let reply = state
        .client
        .send_json(Action::GenerateContent, &upstream.body, auth.as_deref())
        .await?;
    let out = CodeAssistToOpenAI::new(upstream.model).translate_response(reply)?;
    tracing::debug!(model = %client_model, "chat completion complete");
    Ok(Json(out).into_response())
}
