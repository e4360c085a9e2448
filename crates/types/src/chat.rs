//! The OpenAI-compatible chat completion request as accepted at the HTTP edge.
//!
//! Only the fields the gateway routes on are typed. Everything else is kept
//! verbatim in `extra` and handed to the translator untouched.

use crate::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An OpenAI-compatible `/v1/chat/completions` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Client-facing model name, before the rule table maps it.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Parse a raw request body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Translation`] when the body is not a chat
    /// request (missing `model`, wrong field types) or carries no messages.
    pub fn from_slice(body: &[u8]) -> Result<Self, GatewayError> {
        let req: Self = serde_json::from_slice(body)
            .map_err(|e| GatewayError::Translation(format!("invalid chat request: {e}")))?;
        if req.messages.is_empty() {
            return Err(GatewayError::Translation(
                "messages must contain at least one entry".into(),
            ));
        }
        Ok(req)
    }

    /// Rebuild the full body for the translator.
    #[must_use]
    pub fn into_body(self) -> Value {
        let mut map = self.extra;
        map.insert("model".into(), Value::String(self.model));
        map.insert("stream".into(), Value::Bool(self.stream));
        map.insert("messages".into(), Value::Array(self.messages));
        Value::Object(map)
    }
}
