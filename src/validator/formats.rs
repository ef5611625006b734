//! `format` support: the OpenAPI-specific formats, cheap "fast" checkers for
//! common string formats, and detection of formats nothing knows how to check.

use crate::config::{FormatMode, ValidatorOptions};
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

/// Formats the schema engine checks itself.
const ENGINE_FORMATS: &[&str] = &[
    "date",
    "date-time",
    "time",
    "duration",
    "email",
    "idn-email",
    "hostname",
    "idn-hostname",
    "ipv4",
    "ipv6",
    "uri",
    "uri-reference",
    "iri",
    "iri-reference",
    "uri-template",
    "uuid",
    "json-pointer",
    "relative-json-pointer",
    "regex",
];

/// Formats defined by OpenAPI itself. Numeric ones are enforced through
/// schema bounds; the rest annotate strings.
pub const OPENAPI_FORMATS: &[&str] = &["int32", "int64", "float", "double", "byte", "binary", "password"];

static DATE: Lazy<Regex> = Lazy::new(|| build(r"^\d{4}-[01]\d-[0-3]\d$"));
static TIME: Lazy<Regex> =
    Lazy::new(|| build(r"(?i)^(?:[0-2]\d:[0-5]\d:[0-5]\d|23:59:60)(?:\.\d+)?(?:z|[+-]\d{2}(?::?\d{2})?)?$"));
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    build(r"(?i)^\d{4}-[01]\d-[0-3]\d[t\s](?:[0-2]\d:[0-5]\d:[0-5]\d|23:59:60)(?:\.\d+)?(?:z|[+-]\d{2}(?::?\d{2})?)$")
});
static URI: Lazy<Regex> = Lazy::new(|| build(r"(?i)^[a-z][a-z0-9+\-.]*:[^\s]*$"));
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    build(r"(?i)^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)*$")
});
static UUID: Lazy<Regex> =
    Lazy::new(|| build(r"(?i)^(?:urn:uuid:)?[0-9a-f]{8}-(?:[0-9a-f]{4}-){3}[0-9a-f]{12}$"));

// Patterns are literals checked by the unit tests below.
#[allow(clippy::expect_used)]
fn build(pattern: &str) -> Regex {
    Regex::new(pattern).expect("format regex must compile")
}

fn is_base64(s: &str) -> bool {
    base64::engine::general_purpose::STANDARD.decode(s).is_ok()
}

fn accept_any(_: &str) -> bool {
    true
}

/// Checkers registered with the engine for the selected mode, before custom ones.
pub(crate) fn builtin_checkers(mode: FormatMode) -> Vec<(&'static str, fn(&str) -> bool)> {
    let openapi: [(&'static str, fn(&str) -> bool); 7] = [
        ("byte", is_base64),
        ("binary", accept_any),
        ("password", accept_any),
        ("float", accept_any),
        ("double", accept_any),
        ("int32", accept_any),
        ("int64", accept_any),
    ];
    let mut out = Vec::from(openapi);
    if mode == FormatMode::Fast {
        let fast: [(&'static str, fn(&str) -> bool); 6] = [
            ("date", |s| DATE.is_match(s)),
            ("time", |s| TIME.is_match(s)),
            ("date-time", |s| DATE_TIME.is_match(s)),
            ("uri", |s| URI.is_match(s)),
            ("email", |s| EMAIL.is_match(s)),
            ("uuid", |s| UUID.is_match(s)),
        ];
        out.extend(fast);
    }
    out
}

/// Every `format` name used anywhere inside `schema`.
pub(crate) fn collect_formats(schema: &Value, out: &mut BTreeSet<String>) {
    let Value::Object(obj) = schema else {
        return;
    };
    if let Some(Value::String(f)) = obj.get("format") {
        out.insert(f.clone());
    }
    for key in ["properties", "patternProperties", "$defs", "definitions", "dependentSchemas"] {
        if let Some(Value::Object(map)) = obj.get(key) {
            for sub in map.values() {
                collect_formats(sub, out);
            }
        }
    }
    for key in ["items", "additionalProperties", "not", "if", "then", "else", "contains", "propertyNames"] {
        if let Some(sub) = obj.get(key) {
            collect_formats(sub, out);
        }
    }
    for key in ["allOf", "anyOf", "oneOf", "prefixItems"] {
        if let Some(Value::Array(parts)) = obj.get(key) {
            for sub in parts {
                collect_formats(sub, out);
            }
        }
    }
}

/// Formats in `schema` that have no checker and are not allowed to be unknown.
pub(crate) fn unknown_formats(schema: &Value, options: &ValidatorOptions) -> Vec<String> {
    if options.formats == FormatMode::Off {
        return Vec::new();
    }
    let mut used = BTreeSet::new();
    collect_formats(schema, &mut used);
    used.into_iter()
        .filter(|f| {
            !ENGINE_FORMATS.contains(&f.as_str())
                && !OPENAPI_FORMATS.contains(&f.as_str())
                && !options.custom_formats.iter().any(|(name, _)| name == f)
                && !options.format_is_allowed_unknown(f)
        })
        .collect()
}
