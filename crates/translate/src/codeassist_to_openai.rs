//! Translates whole (non-streaming) upstream responses into `OpenAI` chat
//! completions.

use crate::{
    envelope,
    sse::{new_call_id, unix_now},
    stream::{StreamEvent, classify},
};
use assistgate_types::{ResponseTranslator, error::Result};
use serde_json::{Value, json};

/// Translator from an enveloped `generateContent` reply to `OpenAI` format.
pub struct CodeAssistToOpenAI {
    model: String,
}

impl CodeAssistToOpenAI {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl ResponseTranslator for CodeAssistToOpenAI {
    fn translate_response(&self, res: Value) -> Result<Value> {
        let res = envelope::unwrap(res);

        let mut content = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = None;
        let mut grounding = None;
        for event in classify(&res) {
            match event {
                StreamEvent::Text(t) | StreamEvent::ToolResultPassthrough(t) => {
                    content.push_str(&t);
                }
                StreamEvent::Thinking(t) => reasoning.push_str(&t),
                StreamEvent::ToolCall { name, args } => tool_calls.push(json!({
                    "id": new_call_id(),
                    "type": "function",
                    "function": { "name": name, "arguments": args.to_string() },
                })),
                StreamEvent::Usage(u) => usage = Some(u),
                StreamEvent::Grounding(g) => grounding = Some(g),
            }
        }

        let finish_reason = if !tool_calls.is_empty() {
            "tool_calls"
        } else if res.pointer("/candidates/0/finishReason").and_then(Value::as_str)
            == Some("MAX_TOKENS")
        {
            "length"
        } else {
            "stop"
        };

        let mut message = json!({ "role": "assistant", "content": content });
        if content.is_empty() && !tool_calls.is_empty() {
            message["content"] = Value::Null;
        }
        if !reasoning.is_empty() {
            message["reasoning_content"] = json!(reasoning);
        }
        if !tool_calls.is_empty() {
            message["tool_calls"] = Value::Array(tool_calls);
        }

        let mut out = json!({
            "id": format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            "object": "chat.completion",
            "created": unix_now(),
            "model": self.model,
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": finish_reason,
            }],
            "usage": usage.unwrap_or_default().to_openai(),
        });
        if let Some(g) = grounding {
            out["grounding_metadata"] = g;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enveloped(parts: Value, finish: &str) -> Value {
        json!({
            "traceId": "abc",
            "response": {
                "candidates": [{
                    "content": { "role": "model", "parts": parts },
                    "finishReason": finish
                }],
                "usageMetadata": { "promptTokenCount": 8, "candidatesTokenCount": 4, "totalTokenCount": 12 }
            }
        })
    }

    fn translate(v: Value) -> Value {
        CodeAssistToOpenAI::new("gemini-2.5-pro").translate_response(v).unwrap()
    }

    #[test]
    fn test_text_response() {
        let out = translate(enveloped(json!([{"text": "Hi "}, {"text": "there!"}]), "STOP"));
        assert_eq!(out["object"], "chat.completion");
        assert_eq!(out["model"], "gemini-2.5-pro");
        assert_eq!(out["choices"][0]["message"]["role"], "assistant");
        assert_eq!(out["choices"][0]["message"]["content"], "Hi there!");
        assert_eq!(out["choices"][0]["finish_reason"], "stop");
        assert_eq!(out["usage"]["prompt_tokens"], 8);
        assert_eq!(out["usage"]["completion_tokens"], 4);
        assert_eq!(out["usage"]["total_tokens"], 12);
    }

    #[test]
    fn test_thought_text_separated() {
        let out = translate(enveloped(
            json!([{"text": "let me think", "thought": true}, {"text": "42"}]),
            "STOP",
        ));
        assert_eq!(out["choices"][0]["message"]["content"], "42");
        assert_eq!(out["choices"][0]["message"]["reasoning_content"], "let me think");
    }

    #[test]
    fn test_tool_calls_response() {
        let out = translate(enveloped(
            json!([{"functionCall": {"name": "get_weather", "args": {"city": "Oslo"}}}]),
            "STOP",
        ));
        let msg = &out["choices"][0]["message"];
        assert!(msg["content"].is_null());
        assert_eq!(msg["tool_calls"][0]["function"]["name"], "get_weather");
        assert_eq!(msg["tool_calls"][0]["function"]["arguments"], r#"{"city":"Oslo"}"#);
        assert!(msg["tool_calls"][0]["id"].as_str().unwrap().starts_with("call_"));
        assert_eq!(out["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn test_max_tokens_is_length() {
        let out = translate(enveloped(json!([{"text": "trunc"}]), "MAX_TOKENS"));
        assert_eq!(out["choices"][0]["finish_reason"], "length");
    }

    #[test]
    fn test_unwrapped_input_accepted() {
        let out = translate(json!({"candidates": [{"content": {"parts": [{"text": "plain"}]}}]}));
        assert_eq!(out["choices"][0]["message"]["content"], "plain");
        assert_eq!(out["usage"]["total_tokens"], 0);
    }
}
