//! The Cloud Code Assist request/response envelope.
//!
//! Requests carry the public-dialect body under `request`, next to the
//! model and tenant. Responses carry it under `response`, alongside
//! bookkeeping fields such as `traceId`.

use serde_json::{Map, Value, json};

/// Flatten a response envelope: every top-level field except `response`,
/// overlaid with the fields of `response` (nested wins on collision).
///
/// Values without an object under `response` are returned unchanged, so
/// unwrapping is idempotent.
#[must_use]
pub fn unwrap(value: Value) -> Value {
    let Value::Object(mut outer) = value else {
        return value;
    };
    match outer.remove("response") {
        Some(Value::Object(inner)) => {
            let mut merged: Map<String, Value> = outer;
            merged.extend(inner);
            Value::Object(merged)
        }
        Some(other) => {
            outer.insert("response".into(), other);
            Value::Object(outer)
        }
        None => Value::Object(outer),
    }
}

/// Wrap a generation body for `generateContent` / `streamGenerateContent`.
#[must_use]
pub fn wrap_generate(model: &str, project: &str, request: Value) -> Value {
    json!({
        "model": model,
        "project": project,
        "request": request,
    })
}

/// Wrap a body for `countTokens`, which names the model inside `request`
/// and takes no tenant.
#[must_use]
pub fn wrap_count_tokens(model: &str, request: Value) -> Value {
    let mut inner = match request {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    inner.insert("model".into(), Value::String(format!("models/{model}")));
    // countTokens rejects generation-only fields.
    for key in ["generationConfig", "systemInstruction", "tools", "toolConfig"] {
        inner.remove(key);
    }
    json!({ "request": inner })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_merges_nested() {
        let v = json!({"traceId": "t1", "response": {"candidates": [], "usageMetadata": {}}});
        let out = unwrap(v);
        assert_eq!(out["traceId"], "t1");
        assert!(out["candidates"].is_array());
        assert!(out.get("response").is_none());
    }

    #[test]
    fn test_unwrap_nested_wins() {
        let out = unwrap(json!({"a": 1, "b": "outer", "response": {"b": "inner"}}));
        assert_eq!(out, json!({"a": 1, "b": "inner"}));
    }

    #[test]
    fn test_unwrap_is_idempotent() {
        let plain = json!({"candidates": [{"index": 0}]});
        assert_eq!(unwrap(plain.clone()), plain);
        let once = unwrap(json!({"x": 1, "response": {"y": 2}}));
        assert_eq!(unwrap(once.clone()), once);
    }

    #[test]
    fn test_unwrap_non_object_response_kept() {
        let v = json!({"response": "text"});
        assert_eq!(unwrap(v.clone()), v);
        assert_eq!(unwrap(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_wrap_generate() {
        let out = wrap_generate("gemini-2.5-pro", "proj-1", json!({"contents": []}));
        assert_eq!(out["model"], "gemini-2.5-pro");
        assert_eq!(out["project"], "proj-1");
        assert!(out["request"]["contents"].is_array());
    }

    #[test]
    fn test_wrap_count_tokens() {
        let out = wrap_count_tokens(
            "gemini-2.5-flash",
            json!({"contents": [{"role": "user"}], "generationConfig": {"temperature": 1}}),
        );
        assert_eq!(out["request"]["model"], "models/gemini-2.5-flash");
        assert!(out["request"]["contents"].is_array());
        assert!(out["request"].get("generationConfig").is_none());
        assert!(out.get("project").is_none());
    }
}
