//! Request-side stages: path, query, header, cookie, then body.

use super::coerce::{coerce_body, coerce_param, coerce_scalar, inject_defaults};
use super::compiled::{negotiate, CompiledValidatorSet};
use super::schema::{merged_properties, Direction};
use super::visibility::{read_only_violations, remove_additional};
use crate::config::RequestOptions;
use crate::context::{ApiRequest, RequestContext};
use crate::error::{ApiError, ErrorLocation, ValidationError};
use crate::router::RawParam;
use crate::spec::{ParameterLocation, ParameterMeta, ParameterStyle};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

/// Ordered request stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl Stage {
    pub const ORDER: [Stage; 5] = [Stage::Path, Stage::Query, Stage::Header, Stage::Cookie, Stage::Body];
}

impl CompiledValidatorSet {
    /// Run every request stage, writing coerced parameters into `ctx` and the
    /// processed body back into `req.body`.
    ///
    /// Stops at the first failing stage unless stage aggregation is on.
    ///
    /// # Errors
    ///
    /// - [`ApiError::RequestEntityTooLarge`] before anything else is looked at
    /// - [`ApiError::UnsupportedMediaType`] for an undeclared body media type
    /// - [`ApiError::BadRequest`] carrying every violation found
    pub fn validate_request(&self, ctx: &mut RequestContext, req: &mut ApiRequest) -> Result<(), ApiError> {
        let Some(opts) = self.request_options else {
            return Ok(());
        };

        if let Some(limit) = self.max_body_bytes {
            let size = req
                .body_len
                .or_else(|| req.body.as_ref().and_then(|b| serde_json::to_vec(b).ok()).map(|b| b.len()))
                .unwrap_or(0);
            if size > limit {
                return Err(ApiError::RequestEntityTooLarge { size, limit });
            }
        }

        let mut errors = Vec::new();
        for stage in Stage::ORDER {
            let found = match stage {
                Stage::Path => self.path_stage(ctx, &opts),
                Stage::Query => self.query_stage(ctx, req, &opts),
                Stage::Header => self.header_stage(ctx, req, &opts),
                Stage::Cookie => self.cookie_stage(ctx, req, &opts),
                Stage::Body => self.body_stage(req, &opts)?,
            };
            if !found.is_empty() {
                debug!(operation = %self.operation.key(), stage = ?stage, errors = found.len(), "Request stage failed");
                errors.extend(found);
                if !self.aggregate_stages {
                    break;
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::bad_request(errors))
        }
    }

    fn path_stage(&self, ctx: &mut RequestContext, opts: &RequestOptions) -> Vec<ValidationError> {
        let mut values = Map::new();
        for param in self.operation.parameters_in(ParameterLocation::Path) {
            let Some((_, raw)) = ctx.raw_path_params.iter().rfind(|(k, _)| k.as_ref() == param.name) else {
                continue;
            };
            let parts: Vec<&str> = match raw {
                RawParam::Single(s) => vec![s.as_str()],
                RawParam::Multi(vs) => vs.iter().map(String::as_str).collect(),
            };
            values.insert(param.name.clone(), coerce_param(&parts, param, opts.coerce_types));
        }
        let errors = self.check_location(ParameterLocation::Path, &values);
        ctx.path_params = values;
        errors
    }

    fn query_stage(&self, ctx: &mut RequestContext, req: &ApiRequest, opts: &RequestOptions) -> Vec<ValidationError> {
        let mut values = Map::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for param in self.operation.parameters_in(ParameterLocation::Query) {
            let value = if param.schema_type() == Some("object") && param.style == ParameterStyle::DeepObject {
                collect_deep_object(req, param, opts, &mut consumed)
            } else if param.schema_type() == Some("object") && param.style == ParameterStyle::Form && param.explode {
                collect_exploded_object(req, param, opts, &mut consumed)
            } else {
                let raw: Vec<&str> = req
                    .query
                    .iter()
                    .filter(|(k, _)| k.as_ref() == param.name)
                    .map(|(_, v)| v.as_str())
                    .collect();
                if raw.is_empty() {
                    None
                } else {
                    consumed.insert(param.name.as_str());
                    Some(coerce_param(&raw, param, opts.coerce_types))
                }
            };
            if let Some(value) = value.or_else(|| param_default(param)) {
                values.insert(param.name.clone(), value);
            }
        }

        let mut errors = Vec::new();
        if !opts.allow_unknown_query_parameters {
            let mut reported: HashSet<&str> = HashSet::new();
            for (key, _) in &req.query {
                let key = key.as_ref();
                if !consumed.contains(key) && reported.insert(key) {
                    errors.push(ValidationError::new(
                        ErrorLocation::Query,
                        format!(".{key}"),
                        "additionalProperties",
                        format!("unknown query parameter '{key}'"),
                    ));
                }
            }
        }
        errors.extend(self.check_location(ParameterLocation::Query, &values));
        ctx.query = values;
        errors
    }

    fn header_stage(&self, ctx: &mut RequestContext, req: &ApiRequest, opts: &RequestOptions) -> Vec<ValidationError> {
        let mut values = Map::new();
        for param in self.operation.parameters_in(ParameterLocation::Header) {
            let name = param.name.to_ascii_lowercase();
            let value = req
                .get_header(&name)
                .map(|raw| coerce_param(&[raw], param, opts.coerce_types))
                .or_else(|| param_default(param));
            if let Some(value) = value {
                values.insert(name, value);
            }
        }
        let errors = self.check_location(ParameterLocation::Header, &values);
        ctx.headers = values;
        errors
    }

    fn cookie_stage(&self, ctx: &mut RequestContext, req: &ApiRequest, opts: &RequestOptions) -> Vec<ValidationError> {
        let mut values = Map::new();
        for param in self.operation.parameters_in(ParameterLocation::Cookie) {
            let value = req
                .get_cookie(&param.name)
                .map(|raw| coerce_param(&[raw], param, opts.coerce_types))
                .or_else(|| param_default(param));
            if let Some(value) = value {
                values.insert(param.name.clone(), value);
            }
        }
        let errors = self.check_location(ParameterLocation::Cookie, &values);
        ctx.cookies = values;
        errors
    }

    fn body_stage(&self, req: &mut ApiRequest, opts: &RequestOptions) -> Result<Vec<ValidationError>, ApiError> {
        let Some(declared) = &self.operation.request_body else {
            return Ok(Vec::new());
        };
        let Some(mut body) = req.body.take() else {
            if declared.required {
                return Ok(vec![ValidationError::new(
                    ErrorLocation::RequestBody,
                    "",
                    "required",
                    "request body is required",
                )]);
            }
            return Ok(Vec::new());
        };

        let media = match req.media_type() {
            Some(m) => m,
            None if self.bodies.iter().any(|(m, _)| m == "application/json") => "application/json".to_string(),
            None => {
                req.body = Some(body);
                return Err(ApiError::UnsupportedMediaType {
                    content_type: "(none)".to_string(),
                });
            }
        };
        let Some((_, compiled)) = negotiate(&self.bodies, &media) else {
            req.body = Some(body);
            return Err(ApiError::UnsupportedMediaType { content_type: media });
        };

        let mut errors = Vec::new();
        if let Some(compiled) = compiled {
            let schema = compiled.schema();
            remove_additional(&mut body, schema, opts.remove_additional);
            if !opts.allow_read_only {
                errors.extend(read_only_violations(&body, schema));
            }
            if opts.coerce_types {
                coerce_body(&mut body, schema);
            }
            inject_defaults(&mut body, schema, Direction::Request);
            errors.extend(compiled.validate(&body, ErrorLocation::RequestBody));
        }
        req.body = Some(body);
        Ok(errors)
    }

    fn check_location(&self, location: ParameterLocation, values: &Map<String, Value>) -> Vec<ValidationError> {
        let Some(compiled) = self.params_for(location) else {
            return Vec::new();
        };
        let error_location = match location {
            ParameterLocation::Path => ErrorLocation::Path,
            ParameterLocation::Query => ErrorLocation::Query,
            ParameterLocation::Header => ErrorLocation::Header,
            ParameterLocation::Cookie => ErrorLocation::Cookie,
        };
        compiled.validate(&Value::Object(values.clone()), error_location)
    }
}

fn param_default(param: &ParameterMeta) -> Option<Value> {
    param.schema.as_ref().and_then(|s| s.get("default")).cloned()
}

/// `filter[color]=red&filter[size]=L` for a `deepObject` parameter named `filter`.
fn collect_deep_object<'r>(
    req: &'r ApiRequest,
    param: &ParameterMeta,
    opts: &RequestOptions,
    consumed: &mut HashSet<&'r str>,
) -> Option<Value> {
    let schema = param.schema.as_ref();
    let mut obj = Map::new();
    for (key, raw) in &req.query {
        let Some(prop) = key
            .strip_prefix(param.name.as_str())
            .and_then(|rest| rest.strip_prefix('['))
            .and_then(|rest| rest.strip_suffix(']'))
        else {
            continue;
        };
        consumed.insert(key.as_ref());
        let prop_schema = schema.and_then(|s| merged_properties(s).into_iter().find(|(n, _)| n.as_str() == prop)).map(|(_, s)| s);
        obj.insert(prop.to_string(), coerce_scalar(raw, prop_schema, opts.coerce_types));
    }
    (!obj.is_empty()).then_some(Value::Object(obj))
}

/// Exploded `form` objects spread their properties over top-level query keys.
fn collect_exploded_object<'r>(
    req: &'r ApiRequest,
    param: &ParameterMeta,
    opts: &RequestOptions,
    consumed: &mut HashSet<&'r str>,
) -> Option<Value> {
    let schema = param.schema.as_ref()?;
    let props = merged_properties(schema);
    let mut obj = Map::new();
    for (key, raw) in &req.query {
        if let Some((name, prop_schema)) = props.iter().find(|(n, _)| n.as_str() == key.as_ref()) {
            consumed.insert(key.as_ref());
            obj.insert((*name).clone(), coerce_scalar(raw, Some(prop_schema), opts.coerce_types));
        }
    }
    (!obj.is_empty()).then_some(Value::Object(obj))
}
