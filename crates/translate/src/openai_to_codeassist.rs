//! Translates `OpenAI` chat completion requests into the Cloud Code Assist
//! generation request.
//!
//! Besides the field mapping, the translator guarantees the pairing rule the
//! upstream enforces: a `model` turn with N `functionCall` parts is followed
//! by exactly one `user` turn holding N `functionResponse` parts, in call
//! order. Requests that cannot satisfy it are rejected before any network
//! call is made.

use crate::{envelope, model::ModelRules, schema};
use assistgate_types::{GatewayError, RequestTranslator, error::Result};
use serde_json::{Map, Value, json};

/// Translator from `OpenAI` chat completion format to the public-dialect
/// request that goes inside the upstream envelope.
pub struct OpenAIToCodeAssist;

/// A translated request ready for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Upstream model id after normalization.
    pub model: String,
    pub stream: bool,
    /// The enveloped body `{model, project, request}`.
    pub body: Value,
}

/// Translate, normalize the model and wrap for the tenant.
///
/// # Errors
///
/// Returns [`GatewayError::Translation`] for malformed requests and for
/// tool-call / tool-result pairing violations.
pub fn to_upstream(req: Value, rules: &ModelRules, project: &str) -> Result<UpstreamRequest> {
    let client_model = req
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::Translation("missing 'model'".into()))?;
    let model = rules.normalize(client_model).into_owned();
    let stream = req.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let inner = OpenAIToCodeAssist.translate_request(req)?;
    Ok(UpstreamRequest {
        body: envelope::wrap_generate(&model, project, inner),
        model,
        stream,
    })
}

impl RequestTranslator for OpenAIToCodeAssist {
    fn translate_request(&self, req: Value) -> Result<Value> {
        let messages = req
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::Translation("missing 'messages'".into()))?;

        let Conversation { system, contents } = build_contents(messages)?;
        validate_parity(&contents)?;

        let mut out = json!({ "contents": contents });
        if !system.is_empty() {
            out["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n") }] });
        }
        let generation_config = generation_config(&req);
        if !generation_config.is_empty() {
            out["generationConfig"] = Value::Object(generation_config);
        }
        if let Some(decls) = function_declarations(&req) {
            out["tools"] = json!([{ "functionDeclarations": decls }]);
        }
        if let Some(tc) = req.get("tool_choice").and_then(tool_config) {
            out["toolConfig"] = tc;
        }
        Ok(out)
    }
}

struct Conversation {
    system: Vec<String>,
    contents: Vec<Value>,
}

/// A tool result waiting to be grouped into the next `user` turn.
struct PendingResponse {
    /// Position of the matching call in the preceding model turn.
    order: usize,
    part: Value,
}

fn build_contents(messages: &[Value]) -> Result<Conversation> {
    let mut system = Vec::new();
    let mut contents = Vec::new();
    // (id, name) of the calls made by the most recent assistant turn.
    let mut calls: Vec<(String, String)> = Vec::new();
    let mut responses: Vec<PendingResponse> = Vec::new();

    for (i, m) in messages.iter().enumerate() {
        let role = m.get("role").and_then(Value::as_str).unwrap_or("user");
        if role != "tool" {
            flush_responses(&mut responses, &mut contents);
        }
        match role {
            "system" | "developer" => {
                let text = content_text(m.get("content"));
                if !text.is_empty() {
                    system.push(text);
                }
            }
            "assistant" => {
                let (parts, made) = assistant_parts(m);
                calls = made;
                if !parts.is_empty() {
                    contents.push(json!({ "role": "model", "parts": parts }));
                }
            }
            "tool" => {
                let pending = tool_response(i, m, &calls, responses.len())?;
                responses.push(pending);
            }
            _ => {
                calls.clear();
                let text = content_text(m.get("content"));
                if !text.is_empty() {
                    contents.push(json!({ "role": "user", "parts": [{ "text": text }] }));
                }
            }
        }
    }
    flush_responses(&mut responses, &mut contents);
    Ok(Conversation { system, contents })
}

fn flush_responses(responses: &mut Vec<PendingResponse>, contents: &mut Vec<Value>) {
    if responses.is_empty() {
        return;
    }
    responses.sort_by_key(|r| r.order);
    let parts: Vec<Value> = responses.drain(..).map(|r| r.part).collect();
    contents.push(json!({ "role": "user", "parts": parts }));
}

/// Text of a string content or the concatenated `text` parts of an array
/// content. Other part types are ignored.
fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn assistant_parts(m: &Value) -> (Vec<Value>, Vec<(String, String)>) {
    let mut parts = Vec::new();
    let text = content_text(m.get("content"));
    if !text.is_empty() {
        parts.push(json!({ "text": text }));
    }

    let mut calls = Vec::new();
    for tc in m.get("tool_calls").and_then(Value::as_array).into_iter().flatten() {
        let id = tc.get("id").and_then(Value::as_str).unwrap_or_default();
        let name = tc
            .pointer("/function/name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let args = tc
            .pointer("/function/arguments")
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        parts.push(json!({ "functionCall": { "name": name, "args": args } }));
        calls.push((id.to_string(), name.to_string()));
    }
    (parts, calls)
}

fn tool_response(
    index: usize,
    m: &Value,
    calls: &[(String, String)],
    seen: usize,
) -> Result<PendingResponse> {
    let id = m.get("tool_call_id").and_then(Value::as_str).unwrap_or_default();
    let fallback_name = m
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty());

    let (order, name) = match calls.iter().position(|(call_id, _)| call_id == id) {
        Some(pos) => (pos, calls[pos].1.as_str()),
        None => match fallback_name {
            Some(n) => (calls.len() + seen, n),
            None => {
                return Err(GatewayError::Translation(format!(
                    "tool message {index} references unknown tool_call_id '{id}'"
                )));
            }
        },
    };

    let content = content_text(m.get("content"));
    let response = match serde_json::from_str::<Value>(&content) {
        Ok(obj @ Value::Object(_)) => obj,
        _ => json!({ "result": content }),
    };
    Ok(PendingResponse {
        order,
        part: json!({ "functionResponse": { "name": name, "response": response } }),
    })
}

fn count_parts(turn: &Value, kind: &str) -> usize {
    turn.get("parts")
        .and_then(Value::as_array)
        .map_or(0, |parts| parts.iter().filter(|p| p.get(kind).is_some()).count())
}

fn role(turn: &Value) -> &str {
    turn.get("role").and_then(Value::as_str).unwrap_or_default()
}

/// Enforce call/response pairing across adjacent turns.
fn validate_parity(contents: &[Value]) -> Result<()> {
    for (i, turn) in contents.iter().enumerate() {
        let responses = count_parts(turn, "functionResponse");
        if responses > 0 {
            let matched = i
                .checked_sub(1)
                .map(|p| &contents[p])
                .is_some_and(|prev| role(prev) == "model" && count_parts(prev, "functionCall") > 0);
            if !matched {
                return Err(GatewayError::Translation(format!(
                    "user turn {i} has {responses} function responses without preceding function calls"
                )));
            }
        }

        let calls = count_parts(turn, "functionCall");
        if role(turn) != "model" || calls == 0 {
            continue;
        }
        let msg = match contents.get(i + 1) {
            None => format!(
                "model turn {i} emitted {calls} function calls, but no user turn follows with their responses"
            ),
            Some(next) if role(next) != "user" => format!(
                "model turn {i} emitted {calls} function calls, but is followed by another model turn"
            ),
            Some(next) => {
                let got = count_parts(next, "functionResponse");
                if got == calls {
                    continue;
                }
                format!(
                    "model turn {i} emitted {calls} function calls, but following user turn has {got} function responses"
                )
            }
        };
        return Err(GatewayError::Translation(msg));
    }
    Ok(())
}

fn generation_config(req: &Value) -> Map<String, Value> {
    let mut cfg = Map::new();
    let copy = |cfg: &mut Map<String, Value>, from: &str, to: &str| {
        if let Some(v) = req.get(from).filter(|v| !v.is_null()) {
            cfg.insert(to.into(), v.clone());
        }
    };
    copy(&mut cfg, "temperature", "temperature");
    copy(&mut cfg, "top_p", "topP");
    copy(&mut cfg, "top_k", "topK");
    copy(&mut cfg, "max_completion_tokens", "maxOutputTokens");
    copy(&mut cfg, "max_tokens", "maxOutputTokens");
    copy(&mut cfg, "presence_penalty", "presencePenalty");
    copy(&mut cfg, "frequency_penalty", "frequencyPenalty");
    copy(&mut cfg, "seed", "seed");
    copy(&mut cfg, "n", "candidateCount");

    match req.get("stop") {
        Some(Value::String(s)) => {
            cfg.insert("stopSequences".into(), json!([s]));
        }
        Some(Value::Array(list)) if !list.is_empty() => {
            cfg.insert("stopSequences".into(), Value::Array(list.clone()));
        }
        _ => {}
    }

    if let Some(format) = req.get("response_format") {
        match format.get("type").and_then(Value::as_str) {
            Some("json_object") => {
                cfg.insert("responseMimeType".into(), json!("application/json"));
            }
            Some("json_schema") => {
                cfg.insert("responseMimeType".into(), json!("application/json"));
                if let Some(s) = format.pointer("/json_schema/schema") {
                    cfg.insert("responseSchema".into(), schema::convert(s));
                }
            }
            _ => {}
        }
    }

    if req.get("reasoning_effort").is_some_and(|v| !v.is_null()) {
        cfg.insert("thinkingConfig".into(), json!({ "includeThoughts": true }));
    }
    cfg
}

fn function_declarations(req: &Value) -> Option<Vec<Value>> {
    let decls: Vec<Value> = req
        .get("tools")?
        .as_array()?
        .iter()
        .filter_map(|t| t.get("function"))
        .map(|f| {
            let mut decl = json!({ "name": f.get("name").cloned().unwrap_or(Value::Null) });
            if let Some(desc) = f.get("description") {
                decl["description"] = desc.clone();
            }
            if let Some(params) = f.get("parameters") {
                decl["parameters"] = schema::convert(params);
            }
            decl
        })
        .collect();
    (!decls.is_empty()).then_some(decls)
}

fn tool_config(choice: &Value) -> Option<Value> {
    let config = match choice.as_str() {
        Some("auto") => json!({ "mode": "AUTO" }),
        Some("none") => json!({ "mode": "NONE" }),
        Some("required") => json!({ "mode": "ANY" }),
        Some(_) => return None,
        None => {
            let name = choice.pointer("/function/name").and_then(Value::as_str)?;
            json!({ "mode": "ANY", "allowedFunctionNames": [name] })
        }
    };
    Some(json!({ "functionCallingConfig": config }))
}
