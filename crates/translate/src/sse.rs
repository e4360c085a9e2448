//! Rendering canonical events into client SSE frames.

use crate::stream::{StreamEvent, Usage};
use bytes::Bytes;
use serde_json::{Value, json};
use std::time::{SystemTime, UNIX_EPOCH};

/// Terminal sentinel of an `OpenAI` stream.
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";
/// SSE comment frame sent while waiting for the upstream's first byte.
pub const KEEPALIVE_FRAME: &[u8] = b": keepalive\n\n";

/// Encode one `data:` frame.
#[must_use]
pub fn data_frame(payload: &Value) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

/// Turns classified items into wire frames.
pub trait Render: Send {
    type Item: Send + 'static;

    /// Frames for one item. May be empty (for buffered items).
    fn render(&mut self, item: Self::Item) -> Vec<Bytes>;

    /// Closing frames. Called exactly once, also after upstream errors.
    fn finish(&mut self) -> Vec<Bytes>;
}

/// Renders [`StreamEvent`]s as `chat.completion.chunk` frames.
pub struct OpenAISseRenderer {
    id: String,
    created: u64,
    model: String,
    role_sent: bool,
    tool_calls: usize,
    usage: Option<Usage>,
}

impl OpenAISseRenderer {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            created: unix_now(),
            model: model.into(),
            role_sent: false,
            tool_calls: 0,
            usage: None,
        }
    }

    fn chunk(&self, delta: Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        })
    }

    /// A visible delta, carrying the assistant role the first time.
    fn visible(&mut self, mut delta: Value) -> Bytes {
        if !self.role_sent {
            delta["role"] = json!("assistant");
            self.role_sent = true;
        }
        data_frame(&self.chunk(delta, None))
    }
}

impl Render for OpenAISseRenderer {
    type Item = StreamEvent;

    fn render(&mut self, event: StreamEvent) -> Vec<Bytes> {
        let frame = match event {
            StreamEvent::Text(text) | StreamEvent::ToolResultPassthrough(text) => {
                self.visible(json!({ "content": text }))
            }
            StreamEvent::Thinking(text) => {
                data_frame(&self.chunk(json!({ "reasoning_content": text }), None))
            }
            StreamEvent::ToolCall { name, args } => {
                let index = self.tool_calls;
                self.tool_calls += 1;
                self.visible(json!({
                    "tool_calls": [{
                        "index": index,
                        "id": new_call_id(),
                        "type": "function",
                        "function": { "name": name, "arguments": args.to_string() },
                    }]
                }))
            }
            StreamEvent::Grounding(meta) => {
                let mut chunk = self.chunk(json!({}), None);
                chunk["grounding_metadata"] = meta;
                data_frame(&chunk)
            }
            StreamEvent::Usage(usage) => {
                self.usage = Some(usage);
                return Vec::new();
            }
        };
        vec![frame]
    }

    fn finish(&mut self) -> Vec<Bytes> {
        let reason = if self.tool_calls > 0 { "tool_calls" } else { "stop" };
        let mut last = self.chunk(json!({}), Some(reason));
        if let Some(usage) = self.usage.take() {
            last["usage"] = usage.to_openai();
        }
        vec![data_frame(&last), Bytes::from_static(DONE_FRAME)]
    }
}

/// Re-emits unwrapped public-dialect chunks. The public dialect has no
/// `[DONE]` sentinel.
#[derive(Debug, Default)]
pub struct NativeSseRenderer;

impl Render for NativeSseRenderer {
    type Item = Value;

    fn render(&mut self, chunk: Value) -> Vec<Bytes> {
        vec![data_frame(&chunk)]
    }

    fn finish(&mut self) -> Vec<Bytes> {
        Vec::new()
    }
}

/// A fresh `call_<hex>` tool call id.
#[must_use]
pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
