//! Route table core - hot path for request resolution.
//!
//! Templates are compiled once into [`PathTemplate`] state machines. Resolution
//! splits the request path once, walks every entry, and keeps the most specific
//! match for the requested method. Captured values are percent-decoded only after
//! a template has matched, so an encoded `/` (`%2F`) never crosses a segment.

use super::template::{split_path, PathTemplate};
use crate::error::{fail_if_issues, ApiError, ConfigError, ValidationIssue};
use crate::spec::{build_operations, OperationMeta};
use http::Method;
use oas3::OpenApiV3Spec;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Raw (decoded but not yet coerced) value of one path parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawParam {
    Single(String),
    /// `array` + `simple` path parameters, split on `,` before decoding.
    Multi(Vec<String>),
}

impl RawParam {
    /// First (or only) value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawParam::Single(v) => Some(v),
            RawParam::Multi(v) => v.first().map(String::as_str),
        }
    }
}

/// Path parameters captured for one request, in template order.
pub type ParamVec = SmallVec<[(Arc<str>, RawParam); MAX_INLINE_PARAMS]>;

/// Result of successfully matching a request path to an operation.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub operation: Arc<OperationMeta>,
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name.
    ///
    /// Uses "last write wins" semantics when a name repeats at different depths.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&RawParam> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("no route matches {method} {path}")]
    NotFound { method: Method, path: String },
    #[error("{method} is not allowed for {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NotFound { method, path } => ApiError::NotFound { method, path },
            RouteError::MethodNotAllowed {
                method,
                path,
                allowed,
            } => ApiError::MethodNotAllowed {
                method,
                path,
                allowed,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct RouteEntry {
    template: PathTemplate,
    operation: Arc<OperationMeta>,
    /// Per capture: split the raw value on `,` before decoding.
    multi: SmallVec<[bool; MAX_INLINE_PARAMS]>,
}

/// Immutable table mapping (method, concrete path) to an operation.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    base_path: String,
}

impl RouteTable {
    /// Build the table from a parsed document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Issues`] if the document yields unusable operations or path
    /// templates.
    pub fn build(spec: &OpenApiV3Spec) -> Result<Self, ConfigError> {
        Self::from_operations(build_operations(spec)?)
    }

    /// Build the table from already extracted operations, keeping their order.
    pub fn from_operations(operations: Vec<OperationMeta>) -> Result<Self, ConfigError> {
        let base_path = operations
            .first()
            .map(|op| op.base_path.to_string())
            .unwrap_or_default();

        let mut issues = Vec::new();
        let mut entries = Vec::with_capacity(operations.len());
        for op in operations {
            let template = match PathTemplate::parse(&op.full_path()) {
                Ok(t) => t,
                Err(e) => {
                    issues.push(ValidationIssue::new(
                        op.key(),
                        "InvalidPathTemplate",
                        e.reason,
                    ));
                    continue;
                }
            };
            let multi = template
                .names()
                .iter()
                .map(|name| {
                    op.parameter(crate::spec::ParameterLocation::Path, name)
                        .is_some_and(|p| p.is_multi_capture())
                })
                .collect();
            entries.push(RouteEntry {
                template,
                operation: Arc::new(op),
                multi,
            });
        }
        fail_if_issues(issues)?;

        let routes_summary: Vec<String> = entries
            .iter()
            .take(10)
            .map(|e| e.operation.key())
            .collect();
        info!(
            routes_count = entries.len(),
            base_path = %base_path,
            routes_summary = ?routes_summary,
            "Route table loaded"
        );

        Ok(RouteTable { entries, base_path })
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every operation in registration order.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<OperationMeta>> + '_ {
        self.entries.iter().map(|e| &e.operation)
    }

    /// Whether `path` lies under the table's base path.
    #[must_use]
    pub fn in_base_path(&self, path: &str) -> bool {
        if self.base_path.is_empty() {
            return true;
        }
        let path = strip_query(path);
        match path.strip_prefix(self.base_path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Resolve a request to its operation and raw path parameters.
    ///
    /// Among matching templates for `method`, the one with fewest parameter
    /// segments wins; ties go to the earliest registered. A path that matches
    /// only under other methods yields [`RouteError::MethodNotAllowed`].
    pub fn resolve(&self, method: &Method, raw_path: &str) -> Result<RouteMatch, RouteError> {
        debug!(method = %method, path = %raw_path, "Route match attempt");
        let path = strip_query(raw_path);
        let segments = split_path(path);

        let mut best: Option<(&RouteEntry, SmallVec<[&str; MAX_INLINE_PARAMS]>)> = None;
        let mut allowed: Vec<Method> = Vec::new();

        for entry in &self.entries {
            let Some(captures) = entry.template.match_segments(&segments) else {
                continue;
            };
            if entry.operation.method != *method {
                if !allowed.contains(&entry.operation.method) {
                    allowed.push(entry.operation.method.clone());
                }
                continue;
            }
            let better = match &best {
                None => true,
                Some((current, _)) => {
                    entry.template.param_segments() < current.template.param_segments()
                }
            };
            if better {
                best = Some((entry, captures));
            }
        }

        let Some((entry, captures)) = best else {
            if allowed.is_empty() {
                warn!(method = %method, path = %path, "No route matched");
                return Err(RouteError::NotFound {
                    method: method.clone(),
                    path: path.to_string(),
                });
            }
            warn!(method = %method, path = %path, allowed = ?allowed, "Method not allowed");
            return Err(RouteError::MethodNotAllowed {
                method: method.clone(),
                path: path.to_string(),
                allowed,
            });
        };

        let path_params: ParamVec = entry
            .template
            .names()
            .iter()
            .zip(captures)
            .zip(entry.multi.iter())
            .map(|((name, raw), multi)| {
                let value = if *multi {
                    RawParam::Multi(raw.split(',').map(|v| percent_decode(v).into_owned()).collect())
                } else {
                    RawParam::Single(percent_decode(raw).into_owned())
                };
                (Arc::clone(name), value)
            })
            .collect();

        debug!(
            method = %method,
            path = %path,
            route_pattern = %entry.template.as_str(),
            path_params = ?path_params,
            "Route matched"
        );

        Ok(RouteMatch {
            operation: Arc::clone(&entry.operation),
            path_params,
        })
    }

    /// Print all registered routes to stdout.
    pub fn dump_routes(&self) {
        println!(
            "[routes] base_path={} count={}",
            self.base_path,
            self.entries.len()
        );
        for entry in &self.entries {
            let op = &entry.operation;
            println!(
                "[route] {} {} -> {}",
                op.method,
                entry.template.as_str(),
                op.handler_operation_id().unwrap_or("-")
            );
        }
    }
}

fn strip_query(path: &str) -> &str {
    path.split_once('?').map_or(path, |(p, _)| p)
}

fn percent_decode(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    match urlencoding::decode_binary(raw.as_bytes()) {
        Cow::Borrowed(b) => String::from_utf8_lossy(b),
        Cow::Owned(b) => Cow::Owned(String::from_utf8_lossy(&b).into_owned()),
    }
}
