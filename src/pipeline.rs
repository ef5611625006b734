//! # Pipeline Module
//!
//! [`OpenApiValidator`] is the entry point a host server wraps around its
//! handlers. For each request it:
//!
//! 1. bypasses ignored paths and paths outside the base path
//! 2. resolves the route (`NotFound` / `MethodNotAllowed`)
//! 3. evaluates security when the operation declares any
//! 4. validates and coerces parameters and body
//! 5. invokes the bound handler, or the host's `next`
//! 6. validates the response when response validation is on
//!
//! Any stage failing ends the request with an [`ApiError`]; later stages never
//! run. Dropping the returned future has the same effect.
//!
//! ## Snapshots
//!
//! The route table, compiled validators, handler bindings and security scheme
//! declarations live together in one immutable [`Snapshot`], published through
//! `ArcSwap`. [`OpenApiValidator::reload`] builds a complete new snapshot and
//! swaps it in; requests already running keep the one they loaded.
//!
//! ```rust,ignore
//! let validator = OpenApiValidator::new(&spec, ValidatorOptions::default())?;
//! let response = validator
//!     .handle(request, |req| async move { my_handler(req).await })
//!     .await;
//! ```

use crate::config::ValidatorOptions;
use crate::context::{ApiRequest, ApiResponse, HandlerRequest, Outcome, RequestContext, RequestId};
use crate::dispatcher::{Dispatcher, HandlerRegistry};
use crate::error::{ApiError, ConfigError};
use crate::router::RouteTable;
use crate::security::{self, SecurityError};
use crate::spec::{extract_security_schemes, load_spec_from_str, DocumentFormat, SecurityScheme};
use crate::validator_cache::{SpecVersion, ValidatorCache};
use anyhow::Context;
use arc_swap::ArcSwap;
use oas3::OpenApiV3Spec;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where a request stands in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unresolved,
    RouteResolved,
    SecurityChecked,
    RequestValidated,
    HandlerInvoked,
    ResponseValidated,
    Complete,
}

/// Everything built from one document.
#[derive(Debug)]
pub struct Snapshot {
    pub table: RouteTable,
    pub cache: ValidatorCache,
    pub dispatcher: Dispatcher,
    pub schemes: HashMap<String, SecurityScheme>,
    pub version: SpecVersion,
}

impl Snapshot {
    /// Build and check everything for `spec`.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from the route table, security coverage, schema
    /// compilation or handler binding.
    pub fn build(
        spec: &OpenApiV3Spec,
        options: &ValidatorOptions,
        registry: &HandlerRegistry,
        version: SpecVersion,
    ) -> Result<Self, ConfigError> {
        let table = RouteTable::build(spec)?;
        if options.validate_security {
            options.security_handlers.ensure_coverage(table.operations())?;
        }
        let cache = ValidatorCache::build(&table, options, version.clone())?;
        let dispatcher = Dispatcher::bind(&table, registry, options)?;
        Ok(Self {
            table,
            cache,
            dispatcher,
            schemes: extract_security_schemes(spec),
            version,
        })
    }
}

/// Contract-driven validation pipeline for one OpenAPI document.
pub struct OpenApiValidator {
    options: ValidatorOptions,
    registry: HandlerRegistry,
    snapshot: ArcSwap<Snapshot>,
}

impl std::fmt::Debug for OpenApiValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("OpenApiValidator")
            .field("options", &self.options)
            .field("routes", &snapshot.table.len())
            .field("version", &snapshot.version)
            .finish()
    }
}

impl OpenApiValidator {
    /// # Errors
    ///
    /// Any [`ConfigError`] raised while building the snapshot.
    pub fn new(spec: &OpenApiV3Spec, options: ValidatorOptions) -> Result<Self, ConfigError> {
        Self::with_handlers(spec, options, HandlerRegistry::default())
    }

    /// Build with handler modules available for operation binding.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised while building the snapshot.
    pub fn with_handlers(
        spec: &OpenApiV3Spec,
        options: ValidatorOptions,
        registry: HandlerRegistry,
    ) -> Result<Self, ConfigError> {
        let version = SpecVersion::from_content(1, &document_bytes(spec)?);
        Self::install(spec, options, registry, version)
    }

    /// Load the document at `path` and build.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] if the file cannot be read or parsed, else any
    /// build error.
    pub fn from_path(
        path: impl AsRef<Path>,
        options: ValidatorOptions,
        registry: HandlerRegistry,
    ) -> Result<Self, ConfigError> {
        let (spec, bytes) = read_document(path.as_ref())?;
        Self::install(&spec, options, registry, SpecVersion::from_content(1, &bytes))
    }

    fn install(
        spec: &OpenApiV3Spec,
        options: ValidatorOptions,
        registry: HandlerRegistry,
        version: SpecVersion,
    ) -> Result<Self, ConfigError> {
        let snapshot = Snapshot::build(spec, &options, &registry, version).map_err(ConfigError::logged)?;
        info!(
            title = %spec.info.title,
            routes = snapshot.table.len(),
            base_path = %snapshot.table.base_path(),
            bound_handlers = snapshot.dispatcher.len(),
            spec_version = snapshot.version.version,
            "OpenAPI validator installed"
        );
        Ok(Self {
            options,
            registry,
            snapshot: ArcSwap::from_pointee(snapshot),
        })
    }

    /// The snapshot new requests will use.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Replace the document. On error the current snapshot stays in place.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised while building the new snapshot.
    pub fn reload(&self, spec: &OpenApiV3Spec) -> Result<SpecVersion, ConfigError> {
        let bytes = document_bytes(spec)?;
        self.publish(spec, &bytes)
    }

    /// Re-read the document at `path` and replace the current one.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Load`] or any build error; the current snapshot stays.
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<SpecVersion, ConfigError> {
        let (spec, bytes) = read_document(path.as_ref())?;
        self.publish(&spec, &bytes)
    }

    fn publish(&self, spec: &OpenApiV3Spec, bytes: &[u8]) -> Result<SpecVersion, ConfigError> {
        let current = self.snapshot.load();
        let version = current.version.next(bytes);
        let snapshot = Snapshot::build(spec, &self.options, &self.registry, version.clone())
            .map_err(ConfigError::logged)?;
        let routes = snapshot.table.len();
        self.snapshot.store(Arc::new(snapshot));
        info!(
            old_version = current.version.version,
            new_version = version.version,
            spec_hash = %version.hash,
            routes,
            "OpenAPI document reloaded"
        );
        Ok(version)
    }

    /// Run one request through the pipeline.
    ///
    /// `next` is the host's handler, invoked when the operation has no bound
    /// handler or the request bypasses validation.
    ///
    /// # Errors
    ///
    /// The [`ApiError`] of the first failing stage.
    pub async fn handle<F, Fut>(&self, mut req: ApiRequest, next: F) -> Result<ApiResponse, ApiError>
    where
        F: FnOnce(HandlerRequest) -> Fut,
        Fut: Future<Output = anyhow::Result<ApiResponse>>,
    {
        let snapshot = self.snapshot.load_full();

        let ignored = self
            .options
            .ignore_paths
            .as_ref()
            .is_some_and(|ignore| ignore.matches(&req.path));
        if ignored || !snapshot.table.in_base_path(&req.path) {
            debug!(method = %req.method, path = %req.path, ignored, "Request bypasses validation");
            return next(HandlerRequest { request: req, context: None })
                .await
                .map_err(|e| ApiError::internal(e.to_string()));
        }

        let request_id = RequestId::from_header_or_new(req.get_header("x-request-id"));
        let mut state = PipelineState::Unresolved;

        let route = match snapshot.table.resolve(&req.method, &req.path) {
            Ok(route) => route,
            Err(e) => {
                debug!(request_id = %request_id, error = %e, "Route resolution failed");
                return Err(e.into());
            }
        };
        let operation = Arc::clone(&route.operation);
        let mut ctx = RequestContext::new(request_id, Arc::clone(&operation), route.path_params);
        advance(&mut state, PipelineState::RouteResolved, &ctx);

        if self.options.validate_security && operation.requires_security() {
            match security::evaluate(
                &operation.security,
                &self.options.security_handlers,
                &snapshot.schemes,
                &req,
                &operation,
            )
            .await
            {
                Ok(outcome) => ctx.security = outcome.schemes,
                Err(e) => {
                    match &e {
                        SecurityError::Handler { .. } => {
                            error!(request_id = %ctx.request_id, state = ?state, error = %e, "Security handler failed")
                        }
                        _ => {
                            debug!(request_id = %ctx.request_id, state = ?state, error = %e, "Security check denied")
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        advance(&mut state, PipelineState::SecurityChecked, &ctx);

        let set = snapshot.cache.get(&operation).cloned();
        if let Some(set) = &set {
            if let Err(e) = set.validate_request(&mut ctx, &mut req) {
                ctx.outcome = Outcome::Failed(e.errors().to_vec());
                debug!(
                    request_id = %ctx.request_id,
                    operation = %operation.key(),
                    state = ?state,
                    status = e.status().as_u16(),
                    errors = e.errors().len(),
                    "Request validation failed"
                );
                return Err(e);
            }
        }
        ctx.outcome = Outcome::Passed;
        advance(&mut state, PipelineState::RequestValidated, &ctx);

        let request_id = ctx.request_id;
        let handler_req = HandlerRequest {
            request: req,
            context: Some(ctx),
        };
        let result = match snapshot.dispatcher.resolve_handler(&operation) {
            Some(handler) => handler(handler_req).await,
            None => next(handler_req).await,
        };
        let response = result.map_err(|e| {
            warn!(request_id = %request_id, operation = %operation.key(), error = %e, "Handler failed");
            ApiError::internal(e.to_string())
        })?;
        state = PipelineState::HandlerInvoked;
        debug!(request_id = %request_id, state = ?state, status = response.status, "Handler returned");

        let Some(set) = set else {
            return Ok(response);
        };
        let content_type = response.content_type().map(str::to_string);
        let ApiResponse { status, headers, body } = response;
        let body = set.validate_response(status, content_type.as_deref(), body)?;
        debug!(request_id = %request_id, state = ?PipelineState::ResponseValidated, "Response validated");
        debug!(request_id = %request_id, state = ?PipelineState::Complete, status, "Request complete");
        Ok(ApiResponse::new(status, headers, body))
    }
}

fn advance(state: &mut PipelineState, next: PipelineState, ctx: &RequestContext) {
    *state = next;
    debug!(
        request_id = %ctx.request_id,
        operation = %ctx.operation.key(),
        state = ?next,
        "Pipeline stage complete"
    );
}

fn document_bytes(spec: &OpenApiV3Spec) -> Result<Vec<u8>, ConfigError> {
    serde_json::to_vec(spec)
        .context("failed to serialize OpenAPI document")
        .map_err(ConfigError::Load)
}

fn read_document(path: &Path) -> Result<(OpenApiV3Spec, Vec<u8>), ConfigError> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read OpenAPI document {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let spec = load_spec_from_str(&text, DocumentFormat::from_path(path))
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok((spec, bytes))
}
