//! JSON Schema to the upstream's reduced schema dialect.
//!
//! The upstream accepts only `type`, `description`, `properties`, `items`,
//! `required` and `enum`, with upper-case type tokens. Everything else is
//! dropped.

use serde_json::{Map, Value};

/// Convert a JSON Schema node. Unknown keywords are removed recursively.
#[must_use]
pub fn convert(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };

    if let Some(branches) = obj
        .get("anyOf")
        .or_else(|| obj.get("oneOf"))
        .and_then(Value::as_array)
    {
        return convert_union(obj, branches);
    }

    let mut out = Map::new();
    if let Some(ty) = resolve_type(obj) {
        out.insert("type".into(), Value::String(ty));
    }
    if let Some(desc) = obj.get("description").filter(|d| d.is_string()) {
        out.insert("description".into(), desc.clone());
    }
    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        let converted: Map<String, Value> = props
            .iter()
            .map(|(k, v)| (k.clone(), convert(v)))
            .collect();
        out.insert("properties".into(), Value::Object(converted));
    }
    if let Some(items) = obj.get("items").and_then(convert_items) {
        out.insert("items".into(), items);
    }
    if let Some(required) = obj.get("required").filter(|r| r.is_array()) {
        out.insert("required".into(), required.clone());
    }
    if let Some(values) = obj.get("enum").filter(|e| e.is_array()) {
        out.insert("enum".into(), values.clone());
    }
    Value::Object(out)
}

/// `items` takes a single schema upstream; the tuple form keeps its first
/// element.
fn convert_items(items: &Value) -> Option<Value> {
    match items {
        Value::Array(tuple) => tuple.first().map(convert),
        other => Some(convert(other)),
    }
}

/// `anyOf` / `oneOf`: an array branch wins, otherwise the first branch.
fn convert_union(parent: &Map<String, Value>, branches: &[Value]) -> Value {
    let array_branch = branches
        .iter()
        .find(|b| b.get("type").and_then(Value::as_str) == Some("array"));

    let mut out = match array_branch {
        Some(branch) => {
            let mut m = Map::new();
            m.insert("type".into(), Value::String("ARRAY".into()));
            if let Some(items) = branch.get("items").and_then(convert_items) {
                m.insert("items".into(), items);
            }
            m
        }
        None => match branches.first().map(convert) {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        },
    };

    if !out.contains_key("description")
        && let Some(desc) = parent.get("description").filter(|d| d.is_string())
    {
        out.insert("description".into(), desc.clone());
    }
    Value::Object(out)
}

/// Upper-cased type token. A type list resolves to its first non-null
/// entry; an untyped node with `properties` is an object.
fn resolve_type(obj: &Map<String, Value>) -> Option<String> {
    let raw = match obj.get("type") {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null"),
        _ => None,
    };
    match raw {
        Some(t) => Some(t.to_ascii_uppercase()),
        None if obj.contains_key("properties") => Some("OBJECT".into()),
        None => None,
    }
}
