//! OpenAPI schema objects rewritten into plain JSON Schema (draft 2020-12) for
//! one direction of travel.
//!
//! - `nullable: true` becomes a `"null"` member of `type` (and of `enum`).
//! - `format: int32` / `int64` add `minimum`/`maximum` bounds, since the engine
//!   only checks `format` on strings.
//! - On requests, `readOnly` properties are dropped from `required`; on
//!   responses, `writeOnly` properties are. Properties are merged across `allOf`
//!   constituents first so a `required` entry in one constituent sees the
//!   visibility declared in another.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// Visibility keyword hidden in this direction.
    #[must_use]
    pub fn hidden_keyword(self) -> &'static str {
        match self {
            Direction::Request => "readOnly",
            Direction::Response => "writeOnly",
        }
    }
}

const INT32: (i64, i64) = (i32::MIN as i64, i32::MAX as i64);
const INT64: (i64, i64) = (i64::MIN, i64::MAX);

/// Produce the engine-ready schema for `direction`.
#[must_use]
pub fn prepare(schema: &Value, direction: Direction) -> Value {
    let mut out = schema.clone();
    rewrite(&mut out, direction);
    out
}

/// Whether a property schema carries `keyword: true` (`readOnly`/`writeOnly`).
pub(crate) fn has_flag(schema: &Value, keyword: &str) -> bool {
    schema.get(keyword).and_then(Value::as_bool).unwrap_or(false)
        || schema
            .get("allOf")
            .and_then(Value::as_array)
            .is_some_and(|parts| parts.iter().any(|p| has_flag(p, keyword)))
}

/// Properties declared on `schema` and every `allOf` constituent, outermost first.
pub(crate) fn merged_properties(schema: &Value) -> Vec<(&String, &Value)> {
    let mut out = Vec::new();
    collect_properties(schema, &mut out);
    out
}

fn collect_properties<'a>(schema: &'a Value, out: &mut Vec<(&'a String, &'a Value)>) {
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            if !out.iter().any(|(n, _)| *n == name) {
                out.push((name, prop));
            }
        }
    }
    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        for part in parts {
            collect_properties(part, out);
        }
    }
}

/// Look up one property schema across `allOf`.
pub(crate) fn property<'a>(schema: &'a Value, name: &str) -> Option<&'a Value> {
    merged_properties(schema)
        .into_iter()
        .find(|(n, _)| n.as_str() == name)
        .map(|(_, s)| s)
}

/// Schema applying to array items.
pub(crate) fn items(schema: &Value) -> Option<&Value> {
    schema.get("items").filter(|i| i.is_object()).or_else(|| {
        schema
            .get("allOf")
            .and_then(Value::as_array)
            .and_then(|parts| parts.iter().find_map(items))
    })
}

/// Declared JSON types, ignoring `"null"`.
pub(crate) fn declared_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| *t != "null")
            .collect(),
        _ => schema
            .get("allOf")
            .and_then(Value::as_array)
            .and_then(|parts| parts.iter().map(declared_types).find(|t| !t.is_empty()))
            .unwrap_or_default(),
    }
}

fn rewrite(schema: &mut Value, direction: Direction) {
    let Value::Object(obj) = schema else {
        return;
    };

    apply_nullable(obj);
    apply_integer_format(obj);

    let hidden: Vec<String> = {
        let view = Value::Object(obj.clone());
        merged_properties(&view)
            .into_iter()
            .filter(|(_, prop)| has_flag(prop, direction.hidden_keyword()))
            .map(|(name, _)| name.clone())
            .collect()
    };
    if !hidden.is_empty() {
        strip_required(obj, &hidden);
    }

    for key in ["properties", "patternProperties", "$defs", "definitions", "dependentSchemas"] {
        if let Some(Value::Object(map)) = obj.get_mut(key) {
            for sub in map.values_mut() {
                rewrite(sub, direction);
            }
        }
    }
    for key in ["items", "additionalProperties", "not", "if", "then", "else", "contains", "propertyNames", "unevaluatedProperties", "unevaluatedItems"] {
        if let Some(sub) = obj.get_mut(key) {
            rewrite(sub, direction);
        }
    }
    for key in ["allOf", "anyOf", "oneOf", "prefixItems"] {
        if let Some(Value::Array(parts)) = obj.get_mut(key) {
            for sub in parts {
                rewrite(sub, direction);
            }
        }
    }
}

/// Remove `names` from `required` here and in every `allOf` constituent.
fn strip_required(obj: &mut Map<String, Value>, names: &[String]) {
    if let Some(Value::Array(required)) = obj.get_mut("required") {
        required.retain(|r| !matches!(r.as_str(), Some(r) if names.iter().any(|n| n == r)));
        if required.is_empty() {
            obj.remove("required");
        }
    }
    if let Some(Value::Array(parts)) = obj.get_mut("allOf") {
        for part in parts {
            if let Value::Object(p) = part {
                strip_required(p, names);
            }
        }
    }
}

fn apply_nullable(obj: &mut Map<String, Value>) {
    let nullable = obj
        .remove("nullable")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !nullable {
        return;
    }
    match obj.get_mut("type") {
        Some(Value::String(t)) => {
            let t = std::mem::take(t);
            obj.insert("type".into(), Value::from(vec![t, "null".to_string()]));
        }
        Some(Value::Array(ts)) => {
            if !ts.iter().any(|t| t == "null") {
                ts.push(Value::from("null"));
            }
        }
        _ => {}
    }
    if let Some(Value::Array(values)) = obj.get_mut("enum") {
        if !values.iter().any(Value::is_null) {
            values.push(Value::Null);
        }
    }
}

fn apply_integer_format(obj: &mut Map<String, Value>) {
    let bounds = match obj.get("format").and_then(Value::as_str) {
        Some("int32") => INT32,
        Some("int64") => INT64,
        _ => return,
    };
    let is_integer = match obj.get("type") {
        Some(Value::String(t)) => t == "integer",
        Some(Value::Array(ts)) => ts.iter().any(|t| t == "integer"),
        _ => false,
    };
    if !is_integer {
        return;
    }
    let narrower_min = obj
        .get("minimum")
        .and_then(Value::as_f64)
        .is_some_and(|m| m >= bounds.0 as f64);
    if !narrower_min {
        obj.insert("minimum".into(), Value::from(bounds.0));
    }
    let narrower_max = obj
        .get("maximum")
        .and_then(Value::as_f64)
        .is_some_and(|m| m <= bounds.1 as f64);
    if !narrower_max {
        obj.insert("maximum".into(), Value::from(bounds.1));
    }
}
