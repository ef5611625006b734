//! Turning raw parameter strings into typed JSON values, coercing scalars inside
//! parsed bodies, and injecting schema defaults.
//!
//! Coercion never fails: a value that cannot be converted is left as it was so
//! that schema validation reports the mismatch. Coercing an already coerced
//! value is a no-op.

use super::schema::{declared_types, has_flag, items, merged_properties, Direction};
use crate::spec::{ParameterMeta, ParameterStyle};
use serde_json::{Map, Number, Value};

/// Decode the raw values received for one parameter.
///
/// `values` holds every raw occurrence: repeated query keys, or the pieces of
/// an `array` path capture already split on `,`. Scalars use the last one.
/// With `coerce` off, scalars stay strings but arrays are still split per style.
pub fn coerce_param(values: &[&str], param: &ParameterMeta, coerce: bool) -> Value {
    let schema = param.schema.as_ref();
    let types = schema.map(declared_types).unwrap_or_default();

    if types.contains(&"array") && !types.contains(&"string") {
        let item_schema = schema.and_then(items);
        let parts = array_parts(values, param);
        return Value::Array(
            parts
                .into_iter()
                .map(|p| coerce_scalar(p, item_schema, coerce))
                .collect(),
        );
    }

    let Some(last) = values.last() else {
        return Value::Null;
    };
    let raw = strip_style_prefix(last, param);

    if types.contains(&"object") {
        return decode_object(raw, param, coerce);
    }
    coerce_scalar(raw, schema, coerce)
}

/// Remove the `label` (`.`) or `matrix` (`;name=`) prefix of a path value.
fn strip_style_prefix<'a>(raw: &'a str, param: &ParameterMeta) -> &'a str {
    match param.style {
        ParameterStyle::Label => raw.strip_prefix('.').unwrap_or(raw),
        ParameterStyle::Matrix => {
            let raw = raw.strip_prefix(';').unwrap_or(raw);
            raw.strip_prefix(param.name.as_str())
                .and_then(|r| r.strip_prefix('='))
                .unwrap_or(raw)
        }
        _ => raw,
    }
}

fn array_parts<'a>(values: &[&'a str], param: &ParameterMeta) -> Vec<&'a str> {
    let mut parts = Vec::new();
    for raw in values {
        match param.style {
            ParameterStyle::Matrix => {
                for piece in raw.split(';').filter(|p| !p.is_empty()) {
                    let piece = piece
                        .strip_prefix(param.name.as_str())
                        .and_then(|r| r.strip_prefix('='))
                        .unwrap_or(piece);
                    if param.explode {
                        parts.push(piece);
                    } else {
                        parts.extend(piece.split(','));
                    }
                }
            }
            ParameterStyle::Label => {
                let rest = raw.strip_prefix('.').unwrap_or(raw);
                let delim = if param.explode { '.' } else { ',' };
                parts.extend(rest.split(delim));
            }
            ParameterStyle::Form | ParameterStyle::DeepObject if param.explode => parts.push(*raw),
            style => parts.extend(raw.split(style.delimiter())),
        }
    }
    parts.retain(|p| !p.is_empty());
    parts
}

/// Objects: JSON text, or `k,v,k,v` (non-exploded) / `k=v,k=v` (exploded).
fn decode_object(raw: &str, param: &ParameterMeta, coerce: bool) -> Value {
    if raw.trim_start().starts_with('{') {
        if let Ok(v) = serde_json::from_str::<Value>(raw) {
            return v;
        }
    }
    let schema = param.schema.as_ref();
    let mut map = Map::new();
    let delim = param.style.delimiter();
    if param.explode {
        for pair in raw.split(delim).filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            map.insert(k.to_string(), Value::String(v.to_string()));
        }
    } else {
        let mut it = raw.split(delim);
        while let Some(k) = it.next() {
            let v = it.next().unwrap_or_default();
            if !k.is_empty() {
                map.insert(k.to_string(), Value::String(v.to_string()));
            }
        }
    }
    let mut value = Value::Object(map);
    if coerce {
        if let Some(schema) = schema {
            coerce_body(&mut value, schema);
        }
    }
    value
}

/// Convert one raw string to the first declared type it parses as.
pub fn coerce_scalar(raw: &str, schema: Option<&Value>, coerce: bool) -> Value {
    if !coerce {
        return Value::String(raw.to_string());
    }
    let Some(schema) = schema else {
        return Value::String(raw.to_string());
    };
    match parse_scalar(raw, schema) {
        Some(v) => v,
        None => Value::String(raw.to_string()),
    }
}

fn parse_scalar(raw: &str, schema: &Value) -> Option<Value> {
    let types = declared_types(schema);
    if types.contains(&"string") {
        return None;
    }
    if allows_null(schema) && (raw.is_empty() || raw == "null") {
        return Some(Value::Null);
    }
    for ty in types {
        match ty {
            "integer" => {
                if let Ok(i) = raw.parse::<i64>() {
                    return Some(Value::from(i));
                }
                if let Ok(u) = raw.parse::<u64>() {
                    return Some(Value::from(u));
                }
            }
            "number" => {
                if let Ok(i) = raw.parse::<i64>() {
                    return Some(Value::from(i));
                }
                if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
                    return Some(Value::Number(n));
                }
            }
            "boolean" => match raw {
                "true" => return Some(Value::Bool(true)),
                "false" => return Some(Value::Bool(false)),
                _ => {}
            },
            _ => {}
        }
    }
    None
}

fn allows_null(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::Array(ts)) => ts.iter().any(|t| t == "null"),
        _ => schema.get("nullable").and_then(Value::as_bool).unwrap_or(false),
    }
}

/// Coerce scalars inside an already parsed body to the declared types:
/// strings to numbers/booleans/null, numbers and booleans to strings, and a
/// lone scalar into a one-item array.
pub fn coerce_body(value: &mut Value, schema: &Value) {
    let types = declared_types(schema);

    if types.contains(&"array") && !value.is_array() && !value.is_null() {
        if types.len() == 1 {
            let single = std::mem::take(value);
            *value = Value::Array(vec![single]);
        }
    }

    match value {
        Value::String(s) => {
            if let Some(v) = parse_scalar(s, schema) {
                *value = v;
            }
        }
        Value::Number(_) | Value::Bool(_) => {
            if types == ["string"] {
                *value = Value::String(value.to_string());
            }
        }
        Value::Array(arr) => {
            if let Some(item_schema) = items(schema) {
                for v in arr.iter_mut() {
                    coerce_body(v, item_schema);
                }
            }
        }
        Value::Object(map) => {
            let props = merged_properties(schema);
            for (name, v) in map.iter_mut() {
                if let Some((_, prop)) = props.iter().find(|(n, _)| *n == name) {
                    coerce_body(v, prop);
                } else if let Some(extra) = schema.get("additionalProperties").filter(|s| s.is_object()) {
                    coerce_body(v, extra);
                }
            }
        }
        Value::Null => {}
    }
}

/// Insert `default` values for absent properties, recursing into nested objects
/// and arrays. Properties hidden in `direction` never get a default.
pub fn inject_defaults(value: &mut Value, schema: &Value, direction: Direction) {
    match value {
        Value::Object(map) => {
            for (name, prop) in merged_properties(schema) {
                if has_flag(prop, direction.hidden_keyword()) {
                    continue;
                }
                if !map.contains_key(name) {
                    match prop.get("default") {
                        Some(default) => {
                            map.insert(name.clone(), default.clone());
                        }
                        None => continue,
                    }
                }
                if let Some(v) = map.get_mut(name) {
                    inject_defaults(v, prop, direction);
                }
            }
        }
        Value::Array(arr) => {
            if let Some(item_schema) = items(schema) {
                for v in arr.iter_mut() {
                    inject_defaults(v, item_schema, direction);
                }
            }
        }
        _ => {}
    }
}
