//! Engine validators compiled once per operation.
//!
//! Every schema an operation references is prepared for its direction, checked
//! for unknown formats and compiled when the set is built. A failure here is a
//! [`ConfigError`], so a broken document never reaches request time.

use super::formats;
use super::schema::{prepare, Direction};
use crate::config::{FormatMode, RequestOptions, ResponseOptions, ValidatorOptions};
use crate::context::essence;
use crate::error::{ConfigError, ErrorLocation, ValidationError};
use crate::spec::{MediaSchemas, OperationMeta, ParameterLocation, ResponseKey};
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, Validator};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Header parameters OpenAPI says to ignore; they are governed elsewhere.
const IGNORED_HEADERS: [&str; 3] = ["accept", "content-type", "authorization"];

/// A compiled engine validator plus the prepared schema it was built from.
pub struct CompiledSchema {
    validator: Validator,
    schema: Value,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema").field("schema", &self.schema).finish()
    }
}

impl CompiledSchema {
    pub(crate) fn compile(schema: Value, options: &ValidatorOptions) -> Result<Self, String> {
        let unknown = formats::unknown_formats(&schema, options);
        if !unknown.is_empty() {
            return Err(format!("unknown format(s): {}", unknown.join(", ")));
        }
        let mut builder = jsonschema::options();
        builder
            .with_draft(Draft::Draft202012)
            .should_validate_formats(options.formats != FormatMode::Off);
        for (name, check) in formats::builtin_checkers(options.formats) {
            builder.with_format(name, check);
        }
        for (name, check) in &options.custom_formats {
            let check = Arc::clone(check);
            builder.with_format(name.clone(), move |s: &str| check(s));
        }
        let validator = builder.build(&schema).map_err(|e| e.to_string())?;
        Ok(Self { validator, schema })
    }

    /// The prepared schema, used for coercion, defaults and visibility walks.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Every violation in `instance`, paths in dotted notation.
    pub fn validate(&self, instance: &Value, location: ErrorLocation) -> Vec<ValidationError> {
        let mut out = Vec::new();
        for e in self.validator.iter_errors(instance) {
            let path = pointer_to_path(&e.instance_path.to_string());
            let schema_path = e.schema_path.to_string();
            let keyword = schema_path.rsplit('/').next().unwrap_or_default().to_string();
            match &e.kind {
                ValidationErrorKind::Required { property } => {
                    let name = property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string());
                    out.push(ValidationError::new(
                        location,
                        format!("{path}.{name}"),
                        "required",
                        e.to_string(),
                    ));
                }
                ValidationErrorKind::AdditionalProperties { unexpected } => {
                    for name in unexpected {
                        out.push(ValidationError::new(
                            location,
                            format!("{path}.{name}"),
                            "additionalProperties",
                            format!("unexpected property '{name}'"),
                        ));
                    }
                }
                _ => out.push(ValidationError::new(location, path, keyword, e.to_string())),
            }
        }
        out
    }
}

/// `/items/0/name` -> `.items[0].name`
pub(crate) fn pointer_to_path(pointer: &str) -> String {
    let mut out = String::new();
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            out.push('[');
            out.push_str(&segment);
            out.push(']');
        } else {
            out.push('.');
            out.push_str(&segment);
        }
    }
    out
}

/// Media-type entries in declaration order; `None` means no schema to check.
pub(crate) type MediaValidators = Vec<(String, Option<CompiledSchema>)>;

/// All validators for one operation, plus the options they run under.
#[derive(Debug)]
pub struct CompiledValidatorSet {
    pub(crate) operation: Arc<OperationMeta>,
    pub(crate) params: Vec<(ParameterLocation, CompiledSchema)>,
    pub(crate) bodies: MediaValidators,
    pub(crate) responses: BTreeMap<ResponseKey, MediaValidators>,
    pub(crate) request_options: Option<RequestOptions>,
    pub(crate) response_options: Option<ResponseOptions>,
    pub(crate) aggregate_stages: bool,
    pub(crate) max_body_bytes: Option<usize>,
}

impl CompiledValidatorSet {
    /// Compile everything `operation` needs under `options`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::SchemaCompile`] naming the operation and schema that failed.
    pub fn compile(operation: Arc<OperationMeta>, options: &ValidatorOptions) -> Result<Self, ConfigError> {
        let key = operation.key();
        let fail = |target: String, message: String| ConfigError::SchemaCompile {
            operation: key.clone(),
            target,
            message,
        };

        let mut params = Vec::new();
        let mut bodies = Vec::new();
        if options.requests.is_some() {
            for location in ParameterLocation::ALL {
                if let Some(schema) = location_schema(&operation, location) {
                    let compiled = CompiledSchema::compile(schema, options)
                        .map_err(|m| fail(format!("{location} parameters"), m))?;
                    params.push((location, compiled));
                }
            }
            if let Some(body) = &operation.request_body {
                bodies = compile_media(&body.content, Direction::Request, options)
                    .map_err(|(media, m)| fail(format!("request body {media}"), m))?;
            }
        }

        let mut responses = BTreeMap::new();
        if options.responses.is_some() {
            for (status, content) in &operation.responses {
                let compiled = compile_media(content, Direction::Response, options)
                    .map_err(|(media, m)| fail(format!("response {status} {media}"), m))?;
                responses.insert(*status, compiled);
            }
        }

        Ok(Self {
            operation,
            params,
            bodies,
            responses,
            request_options: options.requests,
            response_options: options.responses,
            aggregate_stages: options.aggregate_stages,
            max_body_bytes: options.max_body_bytes,
        })
    }

    pub fn operation(&self) -> &Arc<OperationMeta> {
        &self.operation
    }

    /// Number of engine validators held.
    pub fn len(&self) -> usize {
        let count = |m: &MediaValidators| m.iter().filter(|(_, v)| v.is_some()).count();
        self.params.len() + count(&self.bodies) + self.responses.values().map(count).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn params_for(&self, location: ParameterLocation) -> Option<&CompiledSchema> {
        self.params.iter().find(|(l, _)| *l == location).map(|(_, s)| s)
    }
}

/// Object schema validating every declared parameter of one location at once.
fn location_schema(operation: &OperationMeta, location: ParameterLocation) -> Option<Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in operation.parameters_in(location) {
        let name = if location == ParameterLocation::Header {
            let lower = param.name.to_ascii_lowercase();
            if IGNORED_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            lower
        } else {
            param.name.clone()
        };
        let schema = param
            .schema
            .as_ref()
            .map(|s| prepare(s, Direction::Request))
            .unwrap_or_else(|| json!({}));
        if param.required {
            required.push(Value::String(name.clone()));
        }
        properties.insert(name, schema);
    }
    if properties.is_empty() {
        return None;
    }
    Some(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

fn compile_media(
    content: &MediaSchemas,
    direction: Direction,
    options: &ValidatorOptions,
) -> Result<MediaValidators, (String, String)> {
    let mut out = Vec::with_capacity(content.len());
    for (media, schema) in content {
        let compiled = match schema {
            Some(schema) => Some(
                CompiledSchema::compile(prepare(schema, direction), options)
                    .map_err(|m| (media.clone(), m))?,
            ),
            None => None,
        };
        out.push((essence(media), compiled));
    }
    Ok(out)
}

/// Pick the declared media type for `actual`: exact, then `type/*`, then `*/*`.
pub(crate) fn negotiate<'a>(declared: &'a MediaValidators, actual: &str) -> Option<&'a (String, Option<CompiledSchema>)> {
    let main = actual.split('/').next().unwrap_or_default();
    declared
        .iter()
        .find(|(m, _)| m == actual)
        .or_else(|| {
            declared
                .iter()
                .find(|(m, _)| m.strip_suffix("/*").is_some_and(|t| t == main))
        })
        .or_else(|| declared.iter().find(|(m, _)| m == "*/*"))
}
