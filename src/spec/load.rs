use anyhow::Context;
use oas3::OpenApiV3Spec;
use std::path::Path;

/// Serialization format of an OpenAPI document on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Guess from the file extension; anything other than `.yaml`/`.yml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                DocumentFormat::Yaml
            }
            _ => DocumentFormat::Json,
        }
    }
}

/// Drop path-item keys that are neither HTTP methods nor known fields.
///
/// Vendor tooling sometimes leaves keys like `connect` or `query` in path items;
/// `oas3` rejects them, so they are removed before typed parsing.
fn strip_unknown_verbs(val: &mut serde_json::Value) {
    const METHODS: [&str; 8] = [
        "get", "post", "put", "delete", "patch", "options", "head", "trace",
    ];

    let Some(serde_json::Value::Object(paths_map)) = val.get_mut("paths") else {
        return;
    };
    for item in paths_map.values_mut() {
        if let serde_json::Value::Object(obj) = item {
            obj.retain(|k, _| {
                let lk = k.to_ascii_lowercase();
                match lk.as_str() {
                    "summary" | "description" | "servers" | "parameters" | "$ref" => true,
                    m if METHODS.contains(&m) => true,
                    _ => k.starts_with("x-"),
                }
            });
        }
    }
}

/// Top-level extension listing `paths` keys in document order.
pub(crate) const PATH_ORDER_EXT: &str = "x-oasgate-path-order";
/// Operation extension set when the operation carries its own `security` key.
pub(crate) const SECURITY_DECLARED_EXT: &str = "x-oasgate-security-declared";

/// Record what typed parsing loses: the declaration order of `paths` (parsed
/// into a sorted map) and whether an operation declares `security` at all
/// (`security: []` and an absent key both parse to an empty list).
fn record_declarations(val: &mut serde_json::Value) {
    const METHODS: [&str; 8] = [
        "get", "post", "put", "delete", "patch", "options", "head", "trace",
    ];

    let Some(serde_json::Value::Object(paths_map)) = val.get_mut("paths") else {
        return;
    };
    let order: Vec<serde_json::Value> = paths_map
        .keys()
        .map(|k| serde_json::Value::String(k.clone()))
        .collect();
    for item in paths_map.values_mut() {
        let serde_json::Value::Object(obj) = item else {
            continue;
        };
        for (method, operation) in obj.iter_mut() {
            if !METHODS.contains(&method.to_ascii_lowercase().as_str()) {
                continue;
            }
            if let serde_json::Value::Object(op) = operation {
                if op.contains_key("security") {
                    op.insert(SECURITY_DECLARED_EXT.to_string(), serde_json::Value::Bool(true));
                }
            }
        }
    }
    if let serde_json::Value::Object(root) = val {
        root.insert(PATH_ORDER_EXT.to_string(), serde_json::Value::Array(order));
    }
}

/// Parse an OpenAPI document from text.
pub fn load_spec_from_str(content: &str, format: DocumentFormat) -> anyhow::Result<OpenApiV3Spec> {
    let mut value: serde_json::Value = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(content).context("invalid YAML document")?,
        DocumentFormat::Json => serde_json::from_str(content).context("invalid JSON document")?,
    };
    strip_unknown_verbs(&mut value);
    record_declarations(&mut value);
    let spec: OpenApiV3Spec =
        serde_json::from_value(value).context("document is not a valid OpenAPI 3 specification")?;
    Ok(spec)
}

/// Read and parse an OpenAPI document, choosing YAML or JSON by extension.
pub fn load_spec(file_path: impl AsRef<Path>) -> anyhow::Result<OpenApiV3Spec> {
    let path = file_path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read OpenAPI document {}", path.display()))?;
    load_spec_from_str(&content, DocumentFormat::from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_unknown_verbs() {
        let mut v = json!({
            "paths": {
                "/x": { "get": {}, "patch": {}, "unknown": {}, "x-owner": "team" }
            }
        });
        strip_unknown_verbs(&mut v);
        assert!(v["paths"]["/x"].get("unknown").is_none());
        assert!(v["paths"]["/x"].get("patch").is_some());
        assert!(v["paths"]["/x"].get("x-owner").is_some());
    }

    #[test]
    fn records_path_order_and_declared_security() {
        let mut v = serde_json::json!({
            "paths": {
                "/zeta": { "get": { "security": [] } },
                "/alpha": { "get": {}, "x-owner": "team" }
            }
        });
        record_declarations(&mut v);
        assert_eq!(v[PATH_ORDER_EXT], serde_json::json!(["/zeta", "/alpha"]));
        assert_eq!(v["paths"]["/zeta"]["get"][SECURITY_DECLARED_EXT], true);
        assert!(v["paths"]["/alpha"]["get"].get(SECURITY_DECLARED_EXT).is_none());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("api.YML")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("api.json")), DocumentFormat::Json);
    }

    #[test]
    fn parses_minimal_yaml() {
        let spec = load_spec_from_str(
            "openapi: 3.1.0\ninfo:\n  title: t\n  version: '1'\npaths: {}\n",
            DocumentFormat::Yaml,
        )
        .unwrap();
        assert_eq!(spec.info.title, "t");
    }
}
