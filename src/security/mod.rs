//! # Security Module
//!
//! Evaluates the `security` requirements declared on an operation (or, when the
//! operation declares none, on the document) against registered handlers.
//!
//! ## Semantics
//!
//! A requirement list is an OR of alternatives; each alternative is an AND of
//! `scheme -> scopes`. Alternatives are tried in declaration order and
//! evaluation stops at the first alternative whose every scheme grants access.
//! An empty alternative (`- {}`) makes the operation anonymous-accessible.
//!
//! ## Handlers
//!
//! A [`SecurityHandler`] is registered per scheme name:
//!
//! ```rust,ignore
//! use oasgate::security::{handler_fn, SecurityDecision, SecurityHandlers};
//!
//! let mut handlers = SecurityHandlers::new();
//! handlers.register("ApiKeyAuth", handler_fn(|req, _scopes| {
//!     match req.get_header("x-api-key") {
//!         Some("secret") => SecurityDecision::Granted,
//!         _ => SecurityDecision::Unauthenticated("missing api key".into()),
//!     }
//! }));
//! ```
//!
//! Handler errors are not denials: they abort evaluation and surface as a
//! server error. A scheme with no handler denies (fails closed).

use crate::context::ApiRequest;
use crate::error::{ApiError, ConfigError};
use crate::spec::{OperationMeta, SecurityRequirement, SecurityScheme};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// What a handler decided for one scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityDecision {
    Granted,
    /// Credentials missing or invalid.
    Unauthenticated(String),
    /// Credentials valid but lacking the required scopes.
    InsufficientScope(String),
}

/// View of the request handed to a [`SecurityHandler`].
pub struct SecurityRequest<'a> {
    pub request: &'a ApiRequest,
    pub operation: &'a OperationMeta,
    pub scheme_name: &'a str,
    /// Declaration from `components.securitySchemes`, if present.
    pub scheme: Option<&'a SecurityScheme>,
}

impl SecurityRequest<'_> {
    #[inline]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.request.get_header(name)
    }

    #[inline]
    pub fn get_query(&self, name: &str) -> Option<&str> {
        self.request.get_query(name)
    }

    #[inline]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.request.get_cookie(name)
    }

    /// Token from an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.get_header("authorization")?;
        let (kind, token) = value.split_once(' ')?;
        kind.eq_ignore_ascii_case("bearer").then(|| token.trim())
    }
}

/// Decides whether a request satisfies one security scheme.
#[async_trait]
pub trait SecurityHandler: Send + Sync {
    /// `scopes` are the scopes the requirement lists for this scheme.
    ///
    /// Returning `Err` aborts evaluation with a server error.
    async fn authorize(
        &self,
        req: &SecurityRequest<'_>,
        scopes: &[String],
    ) -> anyhow::Result<SecurityDecision>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> SecurityHandler for FnHandler<F>
where
    F: Fn(&SecurityRequest<'_>, &[String]) -> SecurityDecision + Send + Sync,
{
    async fn authorize(
        &self,
        req: &SecurityRequest<'_>,
        scopes: &[String],
    ) -> anyhow::Result<SecurityDecision> {
        Ok((self.0)(req, scopes))
    }
}

/// Wrap a synchronous closure as a [`SecurityHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn SecurityHandler>
where
    F: Fn(&SecurityRequest<'_>, &[String]) -> SecurityDecision + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Handlers keyed by security scheme name.
#[derive(Clone, Default)]
pub struct SecurityHandlers {
    handlers: HashMap<String, Arc<dyn SecurityHandler>>,
}

impl std::fmt::Debug for SecurityHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("SecurityHandlers").field("schemes", &names).finish()
    }
}

impl SecurityHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scheme: &str, handler: Arc<dyn SecurityHandler>) {
        self.handlers.insert(scheme.to_string(), handler);
    }

    #[must_use]
    pub fn with(mut self, scheme: &str, handler: Arc<dyn SecurityHandler>) -> Self {
        self.register(scheme, handler);
        self
    }

    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn SecurityHandler>> {
        self.handlers.get(scheme)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Every scheme referenced by any operation must have a handler.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingSecurityHandler`] for the first uncovered scheme.
    pub fn ensure_coverage<'a>(
        &self,
        operations: impl IntoIterator<Item = &'a Arc<OperationMeta>>,
    ) -> Result<(), ConfigError> {
        for op in operations {
            for requirement in &op.security {
                for scheme in requirement.0.keys() {
                    if !self.handlers.contains_key(scheme) {
                        return Err(ConfigError::MissingSecurityHandler {
                            scheme: scheme.clone(),
                            operation: op.key(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// The security alternative that authorized a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityOutcome {
    /// Scheme names of the satisfied alternative (empty for anonymous access).
    pub schemes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("unauthorized: {0}")]
    Unauthenticated(String),
    #[error("forbidden: {0}")]
    InsufficientScope(String),
    #[error("security handler for '{scheme}' failed: {source}")]
    Handler {
        scheme: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<SecurityError> for ApiError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Unauthenticated(message) => ApiError::Unauthorized { message },
            SecurityError::InsufficientScope(message) => ApiError::Forbidden { message },
            e @ SecurityError::Handler { .. } => ApiError::internal(e.to_string()),
        }
    }
}

/// Evaluate OR-of-AND requirements for one request.
///
/// No requirements means authorized. When every alternative fails the error is
/// [`SecurityError::InsufficientScope`] if any scheme reported insufficient
/// scope, else [`SecurityError::Unauthenticated`].
pub async fn evaluate(
    requirements: &[SecurityRequirement],
    handlers: &SecurityHandlers,
    schemes: &HashMap<String, SecurityScheme>,
    request: &ApiRequest,
    operation: &OperationMeta,
) -> Result<SecurityOutcome, SecurityError> {
    if requirements.is_empty() {
        return Ok(SecurityOutcome::default());
    }

    let mut denials: Vec<String> = Vec::new();
    let mut scope_denied = false;

    'alternatives: for requirement in requirements {
        let mut granted = Vec::with_capacity(requirement.0.len());
        for (scheme_name, scopes) in &requirement.0 {
            let Some(handler) = handlers.get(scheme_name) else {
                warn!(scheme = %scheme_name, operation = %operation.key(), "No security handler registered");
                denials.push(format!("no handler for security scheme '{scheme_name}'"));
                continue 'alternatives;
            };
            let sec_req = SecurityRequest {
                request,
                operation,
                scheme_name,
                scheme: schemes.get(scheme_name),
            };
            let decision = handler
                .authorize(&sec_req, scopes)
                .await
                .map_err(|source| SecurityError::Handler {
                    scheme: scheme_name.clone(),
                    source,
                })?;
            match decision {
                SecurityDecision::Granted => granted.push(scheme_name.clone()),
                SecurityDecision::Unauthenticated(reason) => {
                    denials.push(format!("{scheme_name}: {reason}"));
                    continue 'alternatives;
                }
                SecurityDecision::InsufficientScope(reason) => {
                    scope_denied = true;
                    denials.push(format!("{scheme_name}: {reason}"));
                    continue 'alternatives;
                }
            }
        }
        debug!(operation = %operation.key(), schemes = ?granted, "Security requirement satisfied");
        return Ok(SecurityOutcome { schemes: granted });
    }

    let message = denials.join("; ");
    if scope_denied {
        Err(SecurityError::InsufficientScope(message))
    } else {
        Err(SecurityError::Unauthenticated(message))
    }
}
