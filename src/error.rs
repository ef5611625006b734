//! Error types surfaced by the validation pipeline.
//!
//! There are three families:
//!
//! - [`ApiError`] - per-request failures handed to the host server for rendering
//!   (client errors and contract violations on output).
//! - [`ConfigError`] - install/build-time failures. These represent a misconfigured
//!   deployment and are returned from builders, never deferred to request time.
//! - [`ValidationError`] - one structured schema violation; a failing stage carries
//!   every violation it found.

use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Where a [`ValidationError`] was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorLocation {
    Path,
    Query,
    Header,
    Cookie,
    RequestBody,
    ResponseBody,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorLocation::Path => "path",
            ErrorLocation::Query => "query",
            ErrorLocation::Header => "header",
            ErrorLocation::Cookie => "cookie",
            ErrorLocation::RequestBody => "requestBody",
            ErrorLocation::ResponseBody => "responseBody",
        };
        f.write_str(s)
    }
}

/// A single schema violation.
///
/// `path` uses dotted notation relative to the validated value, e.g. `.price`
/// or `.items[0].name`. `keyword` is the JSON-Schema (or OpenAPI) keyword that
/// failed: `required`, `type`, `enum`, `readOnly`, `additionalProperties`, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub location: ErrorLocation,
    pub path: String,
    pub message: String,
    pub keyword: String,
}

impl ValidationError {
    pub fn new(
        location: ErrorLocation,
        path: impl Into<String>,
        keyword: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            location,
            path: path.into(),
            keyword: keyword.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {}", self.location, self.path, self.message)
    }
}

/// Typed failure handed back to the host server.
///
/// Every variant maps to exactly one HTTP status code via [`ApiError::status`],
/// and renders to a problem-details JSON body via [`ApiError::to_body`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request validation failed with {} error(s)", errors.len())]
    BadRequest {
        message: String,
        errors: Vec<ValidationError>,
    },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("not found: {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },

    #[error("unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    #[error("request entity too large: {size} bytes exceeds limit of {limit}")]
    RequestEntityTooLarge { size: usize, limit: usize },

    #[error("internal server error: {message}")]
    InternalServerError {
        message: String,
        errors: Vec<ValidationError>,
    },
}

impl ApiError {
    pub fn bad_request(errors: Vec<ValidationError>) -> Self {
        let message = summarize(&errors);
        ApiError::BadRequest { message, errors }
    }

    pub fn response_violation(errors: Vec<ValidationError>) -> Self {
        let message = format!(".response {}", summarize(&errors));
        ApiError::InternalServerError { message, errors }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::InternalServerError {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::RequestEntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured validation errors carried by this failure (empty if none).
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            ApiError::BadRequest { errors, .. } | ApiError::InternalServerError { errors, .. } => {
                errors
            }
            _ => &[],
        }
    }

    /// Render as an RFC 7807 problem-details body.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let status = self.status();
        let mut body = json!({
            "type": "about:blank",
            "title": status.canonical_reason().unwrap_or("Error"),
            "status": status.as_u16(),
            "detail": self.to_string(),
        });
        if !self.errors().is_empty() {
            body["errors"] = serde_json::to_value(self.errors()).unwrap_or(Value::Null);
        }
        if let ApiError::MethodNotAllowed { allowed, .. } = self {
            body["allowed"] = Value::from(allowed.iter().map(Method::to_string).collect::<Vec<_>>());
        }
        body
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A problem found while turning the document and options into a route table,
/// validator set or handler binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub location: String,
    pub kind: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        location: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ValidationIssue {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// Install-time failure. Fatal: the caller should refuse to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OpenAPI document has {} issue(s): {}", .0.len(), join_issues(.0))]
    Issues(Vec<ValidationIssue>),

    #[error("invalid option `{option}`: {message}")]
    InvalidOption { option: &'static str, message: String },

    #[error("conflicting options: {0}")]
    Conflict(String),

    #[error("failed to compile schema for {operation} ({target}): {message}")]
    SchemaCompile {
        operation: String,
        target: String,
        message: String,
    },

    #[error("no security handler registered for scheme '{scheme}' (used by {operation})")]
    MissingSecurityHandler { scheme: String, operation: String },

    #[error("found x-eov-operation-id for route [{method} - {path}]. x-eov-operation-handler required.")]
    MissingOperationHandler { method: Method, path: String },

    #[error("found x-eov-operation-handler for route [{method} - {path}]. operationId or x-eov-operation-id required.")]
    MissingOperationId { method: Method, path: String },

    #[error("handler module '{module}' is not registered")]
    UnknownHandlerModule { module: String },

    #[error("could not find handler '{operation_id}' in module '{module}'")]
    UnresolvedHandler { operation_id: String, module: String },

    #[error(transparent)]
    Load(#[from] anyhow::Error),
}

impl ConfigError {
    /// Log every issue the way the build step reports them, then return self.
    #[must_use]
    pub fn logged(self) -> Self {
        if let ConfigError::Issues(issues) = &self {
            for issue in issues {
                tracing::error!(
                    kind = %issue.kind,
                    location = %issue.location,
                    message = %issue.message,
                    "OpenAPI document issue"
                );
            }
        } else {
            tracing::error!(error = %self, "configuration error");
        }
        self
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fail with every collected issue at once, or succeed if there are none.
pub fn fail_if_issues(issues: Vec<ValidationIssue>) -> Result<(), ConfigError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Issues(issues).logged())
    }
}
