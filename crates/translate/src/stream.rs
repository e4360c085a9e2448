//! Classification of upstream stream payloads into canonical events.
//!
//! Each upstream SSE payload is an enveloped public-dialect chunk. It is
//! unwrapped, then broken into a request-scoped sequence of
//! [`StreamEvent`]s that renderers turn into client frames.

use crate::envelope;
use serde_json::{Map, Value, json};

/// Token accounting reported by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub candidates_tokens: u64,
    pub total_tokens: u64,
    pub thoughts_tokens: u64,
}

impl Usage {
    fn from_metadata(meta: &Value) -> Self {
        let field = |k: &str| meta.get(k).and_then(Value::as_u64).unwrap_or(0);
        let prompt_tokens = field("promptTokenCount");
        let candidates_tokens = field("candidatesTokenCount");
        let thoughts_tokens = field("thoughtsTokenCount");
        let total_tokens = match field("totalTokenCount") {
            0 => prompt_tokens + candidates_tokens + thoughts_tokens,
            n => n,
        };
        Self {
            prompt_tokens,
            candidates_tokens,
            total_tokens,
            thoughts_tokens,
        }
    }

    /// `OpenAI` `usage` object. Thought tokens count as completion tokens.
    #[must_use]
    pub fn to_openai(&self) -> Value {
        json!({
            "prompt_tokens": self.prompt_tokens,
            "completion_tokens": self.candidates_tokens + self.thoughts_tokens,
            "total_tokens": self.total_tokens,
            "completion_tokens_details": { "reasoning_tokens": self.thoughts_tokens },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    Thinking(String),
    ToolCall { name: String, args: Value },
    /// Output of a tool the upstream ran itself, shown to the client as text.
    ToolResultPassthrough(String),
    Usage(Usage),
    Grounding(Value),
}

/// Ordered strategies for recovering `functionCall` arguments. The first
/// one that yields an object wins.
const ARG_EXTRACTORS: &[fn(&Map<String, Value>) -> Option<Value>] =
    &[object_args, string_args, string_arguments, string_args_json];

fn object_args(fc: &Map<String, Value>) -> Option<Value> {
    fc.get("args").filter(|a| a.is_object()).cloned()
}

fn string_args(fc: &Map<String, Value>) -> Option<Value> {
    json_string_arg(fc, "args")
}

fn string_arguments(fc: &Map<String, Value>) -> Option<Value> {
    json_string_arg(fc, "arguments")
}

fn string_args_json(fc: &Map<String, Value>) -> Option<Value> {
    json_string_arg(fc, "argsJson")
}

fn json_string_arg(fc: &Map<String, Value>, key: &str) -> Option<Value> {
    let raw = fc.get(key)?.as_str()?;
    serde_json::from_str::<Value>(raw).ok().filter(Value::is_object)
}

/// Resolve call arguments, falling back to an empty object.
#[must_use]
pub fn extract_args(function_call: &Map<String, Value>) -> Value {
    ARG_EXTRACTORS
        .iter()
        .find_map(|extract| extract(function_call))
        .unwrap_or_else(|| json!({}))
}

/// Classify one already-unwrapped chunk.
///
/// Parts of the first candidate come first, in order, then grounding
/// metadata of every candidate, then usage.
#[must_use]
pub fn classify(chunk: &Value) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let candidates = chunk
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let parts = candidates
        .first()
        .and_then(|c| c.pointer("/content/parts"))
        .and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        if let Some(event) = classify_part(part) {
            events.push(event);
        }
    }

    for candidate in candidates {
        if let Some(grounding) = candidate.get("groundingMetadata") {
            events.push(StreamEvent::Grounding(grounding.clone()));
        }
    }

    if let Some(meta) = chunk.get("usageMetadata") {
        events.push(StreamEvent::Usage(Usage::from_metadata(meta)));
    }
    events
}

fn classify_part(part: &Value) -> Option<StreamEvent> {
    let text = part.get("text").and_then(Value::as_str);
    if is_thought(part) {
        return text
            .filter(|t| !t.is_empty())
            .map(|t| StreamEvent::Thinking(t.to_string()));
    }
    if let Some(t) = text {
        return (!t.is_empty()).then(|| StreamEvent::Text(t.to_string()));
    }
    if let Some(fc) = part.get("functionCall").and_then(Value::as_object) {
        let name = fc.get("name").and_then(Value::as_str).unwrap_or_default();
        return Some(StreamEvent::ToolCall {
            name: name.to_string(),
            args: extract_args(fc),
        });
    }
    if let Some(fr) = part.get("functionResponse") {
        let body = fr.get("response").unwrap_or(fr);
        return Some(StreamEvent::ToolResultPassthrough(body.to_string()));
    }
    if let Some(output) = part.pointer("/codeExecutionResult/output").and_then(Value::as_str) {
        return Some(StreamEvent::ToolResultPassthrough(output.to_string()));
    }
    None
}

fn is_thought(part: &Value) -> bool {
    match part.get("thought") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) | None => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Turns raw upstream payloads into items for a renderer.
pub trait Classify: Send {
    type Item: Send + 'static;

    /// Classify one SSE `data:` payload.
    fn classify(&mut self, payload: &str) -> Vec<Self::Item>;
}

/// Classifier for the `OpenAI` dialect: unwrap then split into events.
/// Payloads that are not JSON become a best-effort text event.
#[derive(Debug, Default)]
pub struct EventClassifier;

impl Classify for EventClassifier {
    type Item = StreamEvent;

    fn classify(&mut self, payload: &str) -> Vec<StreamEvent> {
        match serde_json::from_str::<Value>(payload) {
            Ok(v) => classify(&envelope::unwrap(v)),
            Err(_) if payload.trim().is_empty() => Vec::new(),
            Err(_) => vec![StreamEvent::Text(payload.to_string())],
        }
    }
}

/// Classifier for the public dialect: unwrap only.
#[derive(Debug, Default)]
pub struct EnvelopeClassifier;

impl Classify for EnvelopeClassifier {
    type Item = Value;

    fn classify(&mut self, payload: &str) -> Vec<Value> {
        match serde_json::from_str::<Value>(payload) {
            Ok(v) => vec![envelope::unwrap(v)],
            Err(e) => {
                tracing::debug!(error = %e, "dropping unparseable upstream payload");
                Vec::new()
            }
        }
    }
}
