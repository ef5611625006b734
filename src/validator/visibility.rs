//! `readOnly` / `writeOnly` handling and removal of undeclared properties.

use super::schema::{has_flag, items, merged_properties, property};
use crate::config::RemoveAdditional;
use crate::error::{ErrorLocation, ValidationError};
use serde_json::Value;

/// Report every `readOnly` property present in a request body.
pub fn read_only_violations(value: &Value, schema: &Value) -> Vec<ValidationError> {
    let mut out = Vec::new();
    walk_read_only(value, schema, &mut String::new(), &mut out);
    out
}

fn walk_read_only(value: &Value, schema: &Value, path: &mut String, out: &mut Vec<ValidationError>) {
    match value {
        Value::Object(map) => {
            for (name, v) in map {
                let Some(prop) = property(schema, name) else {
                    continue;
                };
                let len = path.len();
                path.push('.');
                path.push_str(name);
                if has_flag(prop, "readOnly") {
                    out.push(ValidationError::new(
                        ErrorLocation::RequestBody,
                        path.clone(),
                        "readOnly",
                        format!("property '{name}' is read-only"),
                    ));
                } else {
                    walk_read_only(v, prop, path, out);
                }
                path.truncate(len);
            }
        }
        Value::Array(arr) => {
            if let Some(item_schema) = items(schema) {
                for (i, v) in arr.iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!("[{i}]"));
                    walk_read_only(v, item_schema, path, out);
                    path.truncate(len);
                }
            }
        }
        _ => {}
    }
}

/// Drop every `writeOnly` property, recursively, from a response body.
pub fn strip_write_only(value: &mut Value, schema: &Value) {
    match value {
        Value::Object(map) => {
            let props = merged_properties(schema);
            map.retain(|name, _| {
                !props
                    .iter()
                    .any(|(n, p)| *n == name && has_flag(p, "writeOnly"))
            });
            for (name, v) in map.iter_mut() {
                if let Some((_, prop)) = props.iter().find(|(n, _)| *n == name) {
                    strip_write_only(v, prop);
                }
            }
        }
        Value::Array(arr) => {
            if let Some(item_schema) = items(schema) {
                for v in arr.iter_mut() {
                    strip_write_only(v, item_schema);
                }
            }
        }
        _ => {}
    }
}

/// Strip properties a schema does not declare.
///
/// [`RemoveAdditional::Declared`] only touches objects whose schema says
/// `additionalProperties: false`; [`RemoveAdditional::All`] touches every object
/// schema that lists `properties`.
pub fn remove_additional(value: &mut Value, schema: &Value, mode: RemoveAdditional) {
    if mode == RemoveAdditional::Off {
        return;
    }
    match value {
        Value::Object(map) => {
            let props = merged_properties(schema);
            let closed = match mode {
                RemoveAdditional::Declared => closes_additional(schema),
                RemoveAdditional::All => !props.is_empty(),
                RemoveAdditional::Off => false,
            };
            if closed {
                map.retain(|name, _| props.iter().any(|(n, _)| *n == name));
            }
            for (name, v) in map.iter_mut() {
                if let Some((_, prop)) = props.iter().find(|(n, _)| *n == name) {
                    remove_additional(v, prop, mode);
                }
            }
        }
        Value::Array(arr) => {
            if let Some(item_schema) = items(schema) {
                for v in arr.iter_mut() {
                    remove_additional(v, item_schema, mode);
                }
            }
        }
        _ => {}
    }
}

fn closes_additional(schema: &Value) -> bool {
    matches!(schema.get("additionalProperties"), Some(Value::Bool(false)))
        || schema
            .get("allOf")
            .and_then(Value::as_array)
            .is_some_and(|parts| parts.iter().any(closes_additional))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "id": {"type": "string", "readOnly": true},
                "name": {"type": "string"},
                "role": {"type": "string", "writeOnly": true},
                "reviews": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "rating": {"type": "integer"},
                            "reviewer_id": {"type": "string", "readOnly": true},
                            "token": {"type": "string", "writeOnly": true}
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn read_only_reports_paths() {
        let body = json!({"id": "1", "name": "x", "reviews": [{"rating": 5, "reviewer_id": "r"}]});
        let errors = read_only_violations(&body, &product());
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec![".id", ".reviews[0].reviewer_id"]);
        assert!(errors.iter().all(|e| e.keyword == "readOnly"));
    }

    #[test]
    fn write_only_stripped_recursively() {
        let mut body = json!({"name": "x", "role": "admin", "reviews": [{"rating": 1, "token": "t"}]});
        strip_write_only(&mut body, &product());
        assert_eq!(body, json!({"name": "x", "reviews": [{"rating": 1}]}));
    }

    #[test]
    fn remove_additional_modes() {
        let body = json!({"name": "x", "extra": 1, "reviews": [{"rating": 1, "junk": true}]});

        let mut declared = body.clone();
        remove_additional(&mut declared, &product(), RemoveAdditional::Declared);
        assert_eq!(declared, json!({"name": "x", "reviews": [{"rating": 1, "junk": true}]}));

        let mut all = body.clone();
        remove_additional(&mut all, &product(), RemoveAdditional::All);
        assert_eq!(all, json!({"name": "x", "reviews": [{"rating": 1}]}));

        let mut off = body.clone();
        remove_additional(&mut off, &product(), RemoveAdditional::Off);
        assert_eq!(off, body);
    }
}
