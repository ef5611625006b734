use super::types::{
    MediaSchemas, OperationMeta, ParameterLocation, ParameterMeta, ParameterStyle,
    RequestBodyMeta, ResponseKey, Responses,
};
use super::load::{PATH_ORDER_EXT, SECURITY_DECLARED_EXT};
use super::SecurityScheme;
use crate::error::{fail_if_issues, ConfigError, ValidationIssue};
use oas3::spec::{ObjectOrReference, Parameter, PathItem};
use oas3::OpenApiV3Spec;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Guard against self-referencing component schemas.
const MAX_REF_DEPTH: usize = 32;

/// Resolve a JSON Schema `$ref` to the actual schema definition
///
/// Looks up schema references like `#/components/schemas/Product` in the document
/// and returns the resolved schema object.
pub fn resolve_schema_ref<'a>(
    spec: &'a OpenApiV3Spec,
    ref_path: &str,
) -> Option<&'a oas3::spec::ObjectSchema> {
    let name = ref_path.strip_prefix("#/components/schemas/")?;
    spec.components
        .as_ref()?
        .schemas
        .get(name)
        .and_then(|schema_ref| match schema_ref {
            ObjectOrReference::Object(schema) => Some(schema),
            _ => None,
        })
}

/// Recursively expand all `$ref` references in a schema value
///
/// Replaces `{"$ref": "#/components/schemas/X"}` objects with the resolved schema and
/// records the original name under `x-ref-name`. References that cannot be resolved
/// are left in place; self-referencing schemas stop expanding after
/// [`MAX_REF_DEPTH`] levels.
pub fn expand_schema_refs(spec: &OpenApiV3Spec, value: &mut Value) {
    expand_refs_at_depth(spec, value, 0);
}

fn expand_refs_at_depth(spec: &OpenApiV3Spec, value: &mut Value, depth: usize) {
    if depth > MAX_REF_DEPTH {
        return;
    }
    match value {
        Value::Object(obj) => {
            if let Some(ref_path) = obj.get("$ref").and_then(|v| v.as_str()) {
                let ref_path = ref_path.to_string();
                if let Some(schema) = resolve_schema_ref(spec, &ref_path) {
                    if let Ok(mut new_val) = serde_json::to_value(schema) {
                        expand_refs_at_depth(spec, &mut new_val, depth + 1);
                        if let (Some(name), Value::Object(o)) = (
                            ref_path.strip_prefix("#/components/schemas/"),
                            &mut new_val,
                        ) {
                            o.insert("x-ref-name".to_string(), Value::String(name.to_string()));
                        }
                        *value = new_val;
                        return;
                    }
                }
            }
            for v in obj.values_mut() {
                expand_refs_at_depth(spec, v, depth);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                expand_refs_at_depth(spec, v, depth);
            }
        }
        _ => {}
    }
}

fn schema_to_value(
    spec: &OpenApiV3Spec,
    schema: &ObjectOrReference<oas3::spec::ObjectSchema>,
) -> Option<Value> {
    let mut value = match schema {
        ObjectOrReference::Object(schema_obj) => serde_json::to_value(schema_obj).ok(),
        ObjectOrReference::Ref { ref_path, .. } => {
            resolve_schema_ref(spec, ref_path).and_then(|s| serde_json::to_value(s).ok())
        }
    }?;
    expand_schema_refs(spec, &mut value);
    Some(value)
}

/// Extract the request body of an operation, one schema per declared media type.
pub fn extract_request_body(
    spec: &OpenApiV3Spec,
    operation: &oas3::spec::Operation,
) -> Option<RequestBodyMeta> {
    match operation.request_body.as_ref()? {
        ObjectOrReference::Object(req_body) => {
            let content: MediaSchemas = req_body
                .content
                .iter()
                .map(|(mt, media)| {
                    let schema = media.schema.as_ref().and_then(|s| schema_to_value(spec, s));
                    (mt.to_ascii_lowercase(), schema)
                })
                .collect();
            Some(RequestBodyMeta {
                required: req_body.required.unwrap_or(false),
                content,
            })
        }
        _ => None,
    }
}

/// Extract every declared response of an operation keyed by status/range/default,
/// then media type.
pub fn extract_responses(
    spec: &OpenApiV3Spec,
    operation: &oas3::spec::Operation,
    location: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Responses {
    let mut all: Responses = BTreeMap::new();
    let Some(responses_map) = operation.responses.as_ref() else {
        return all;
    };
    for (status_str, resp_ref) in responses_map {
        let Some(key) = ResponseKey::parse(status_str) else {
            issues.push(ValidationIssue::new(
                location,
                "InvalidResponseKey",
                format!("response key '{status_str}' is not a status code, range or 'default'"),
            ));
            continue;
        };
        let entry = all.entry(key).or_default();
        if let ObjectOrReference::Object(resp_obj) = resp_ref {
            for (mt, media) in &resp_obj.content {
                let schema = media.schema.as_ref().and_then(|s| schema_to_value(spec, s));
                entry.insert(mt.to_ascii_lowercase(), schema);
            }
        }
    }
    all
}

/// Extract all security schemes declared under `components.securitySchemes`.
pub fn extract_security_schemes(spec: &OpenApiV3Spec) -> HashMap<String, SecurityScheme> {
    spec.components
        .as_ref()
        .map(|c| {
            c.security_schemes
                .iter()
                .filter_map(|(name, scheme)| match scheme {
                    ObjectOrReference::Object(obj) => Some((name.clone(), obj.clone())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_parameter_ref<'a>(
    spec: &'a OpenApiV3Spec,
    ref_path: &str,
) -> Option<&'a oas3::spec::Parameter> {
    let name = ref_path.strip_prefix("#/components/parameters/")?;
    spec.components
        .as_ref()?
        .parameters
        .get(name)
        .and_then(|param_ref| match param_ref {
            ObjectOrReference::Object(param) => Some(param),
            _ => None,
        })
}

/// Extract parameter metadata, resolving `#/components/parameters/*` references.
///
/// Path parameters are always required. Style and explode default per location
/// as OpenAPI prescribes (`form` + explode for query/cookie, `simple` otherwise).
pub fn extract_parameters(
    spec: &OpenApiV3Spec,
    params: &[ObjectOrReference<Parameter>],
    location: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<ParameterMeta> {
    let mut out = Vec::with_capacity(params.len());
    for p in params {
        let param = match p {
            ObjectOrReference::Object(obj) => Some(obj),
            ObjectOrReference::Ref { ref_path, .. } => {
                let resolved = resolve_parameter_ref(spec, ref_path);
                if resolved.is_none() {
                    issues.push(ValidationIssue::new(
                        location,
                        "UnresolvedReference",
                        format!("parameter reference '{ref_path}' cannot be resolved"),
                    ));
                }
                resolved
            }
        };
        let Some(param) = param else { continue };

        let param_location = ParameterLocation::from(param.location);
        let style = param
            .style
            .map(ParameterStyle::from)
            .unwrap_or_else(|| ParameterStyle::default_for(param_location));
        let schema = param.schema.as_ref().and_then(|s| schema_to_value(spec, s));

        out.push(ParameterMeta {
            name: param.name.clone(),
            location: param_location,
            required: param_location == ParameterLocation::Path
                || param.required.unwrap_or(false),
            schema,
            style,
            explode: param.explode.unwrap_or(style == ParameterStyle::Form),
        });
    }
    out
}

/// Operation-level parameters override path-level ones with the same name and location.
fn merge_parameters(path_level: Vec<ParameterMeta>, op_level: Vec<ParameterMeta>) -> Vec<ParameterMeta> {
    let mut merged: Vec<ParameterMeta> = path_level
        .into_iter()
        .filter(|p| {
            !op_level
                .iter()
                .any(|o| o.name == p.name && o.location == p.location)
        })
        .collect();
    merged.extend(op_level);
    merged
}

/// Names of the `{param}` placeholders in a template, in order of appearance.
pub fn template_param_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = rest[start + 1..start + len].trim_end_matches('*');
        names.push(name.to_string());
        rest = &rest[start + len + 1..];
    }
    names
}

/// Path prefix of `servers[0].url`, without a trailing slash (empty for `/`).
pub fn extract_base_path(spec: &OpenApiV3Spec) -> String {
    let Some(server) = spec.servers.first() else {
        return String::new();
    };
    let url_str = &server.url;
    url::Url::parse(url_str)
        .or_else(|_| url::Url::parse(&format!("http://dummy{url_str}")))
        .map(|u| {
            let p = u.path().trim_end_matches('/');
            if p == "/" || p.is_empty() {
                String::new()
            } else {
                p.to_string()
            }
        })
        .unwrap_or_default()
}

/// `oas3` stores extension keys without their `x-` prefix.
fn bare(ext: &str) -> &str {
    ext.strip_prefix("x-").unwrap_or(ext)
}

/// Path items in document order when the loader recorded it, otherwise in
/// key order. Paths missing from the recorded list follow in key order.
fn declared_paths<'a>(
    spec: &OpenApiV3Spec,
    paths_map: &'a BTreeMap<String, PathItem>,
) -> Vec<(&'a String, &'a PathItem)> {
    let recorded: Vec<&str> = spec
        .extensions
        .get(bare(PATH_ORDER_EXT))
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut ordered: Vec<(&String, &PathItem)> = recorded
        .iter()
        .filter_map(|key| paths_map.get_key_value(*key))
        .collect();
    for (path, item) in paths_map {
        if !recorded.contains(&path.as_str()) {
            ordered.push((path, item));
        }
    }
    ordered
}

/// Build operation descriptors for every (path template, method) pair, in
/// document order.
///
/// # Errors
///
/// Returns [`ConfigError::Issues`] listing every problem found (unresolvable
/// parameter references, path placeholders with no matching parameter, invalid
/// response keys).
pub fn build_operations(spec: &OpenApiV3Spec) -> Result<Vec<OperationMeta>, ConfigError> {
    let mut operations = Vec::new();
    let mut issues = Vec::new();
    let base_path: Arc<str> = Arc::from(extract_base_path(spec).as_str());

    if let Some(paths_map) = spec.paths.as_ref() {
        for (path, item) in declared_paths(spec, paths_map) {
            let path_params = extract_parameters(spec, &item.parameters, path, &mut issues);

            for (method_str, operation) in item.methods() {
                let method = method_str.clone();
                let location = format!("{path} -> {method}");

                let op_params =
                    extract_parameters(spec, &operation.parameters, &location, &mut issues);
                let parameters = merge_parameters(path_params.clone(), op_params);

                let path_param_names = template_param_names(path);
                for name in &path_param_names {
                    let declared = parameters
                        .iter()
                        .any(|p| p.location == ParameterLocation::Path && &p.name == name);
                    if !declared {
                        issues.push(ValidationIssue::new(
                            location.as_str(),
                            "UndeclaredPathParameter",
                            format!("path placeholder '{{{name}}}' has no matching `in: path` parameter"),
                        ));
                    }
                }

                let declares_security = !operation.security.is_empty()
                    || operation.extensions.contains_key(bare(SECURITY_DECLARED_EXT));
                let security = if declares_security {
                    operation.security.clone()
                } else {
                    spec.security.clone()
                };

                let extensions = operation
                    .extensions
                    .iter()
                    .filter(|(k, _)| k.as_str() != bare(SECURITY_DECLARED_EXT))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();

                operations.push(OperationMeta {
                    method,
                    path_template: Arc::from(path.as_str()),
                    base_path: Arc::clone(&base_path),
                    operation_id: operation.operation_id.clone(),
                    path_param_names,
                    parameters,
                    request_body: extract_request_body(spec, operation),
                    responses: extract_responses(spec, operation, &location, &mut issues),
                    security,
                    extensions,
                });
            }
        }
    }

    fail_if_issues(issues)?;
    Ok(operations)
}
