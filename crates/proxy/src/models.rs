//! Models listing handler: the canonical upstream ids in `OpenAI` format.

use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{AppState, model_rules};

/// Handles `GET /v1/models` requests.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.config.load();
    let rules = model_rules(&config);
    let data: Vec<Value> = rules
        .canonical_ids()
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": 0,
                "owned_by": "google",
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
    }))
}
