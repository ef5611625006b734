//! Handler registry and operation binding.

use crate::config::ValidatorOptions;
use crate::context::{ApiResponse, HandlerRequest};
use crate::error::ConfigError;
use crate::router::RouteTable;
use crate::spec::OperationMeta;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<ApiResponse>>;

/// A business handler. Errors become `InternalServerError`.
pub type Handler = Arc<dyn Fn(HandlerRequest) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ApiResponse>> + Send + 'static,
{
    Arc::new(move |req| f(req).boxed())
}

/// Named handlers exported by one module, plus its `default` namespace.
#[derive(Clone, Default)]
pub struct HandlerModule {
    exports: HashMap<String, Handler>,
    default: HashMap<String, Handler>,
}

impl fmt::Debug for HandlerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exports: Vec<&String> = self.exports.keys().collect();
        exports.sort();
        let mut default: Vec<&String> = self.default.keys().collect();
        default.sort();
        f.debug_struct("HandlerModule")
            .field("exports", &exports)
            .field("default", &default)
            .finish()
    }
}

impl HandlerModule {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn export(mut self, name: &str, handler: Handler) -> Self {
        self.exports.insert(name.to_string(), handler);
        self
    }

    /// Export under the module's `default` namespace.
    #[must_use]
    pub fn default_export(mut self, name: &str, handler: Handler) -> Self {
        self.default.insert(name.to_string(), handler);
        self
    }

    /// Direct export first, then `default`.
    pub fn lookup(&self, name: &str) -> Option<&Handler> {
        self.exports.get(name).or_else(|| self.default.get(name))
    }
}

/// Handler modules keyed by module path (`<base dir>/<module>`).
#[derive(Clone, Default, Debug)]
pub struct HandlerRegistry {
    modules: HashMap<String, Arc<HandlerModule>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &str, module: HandlerModule) {
        let path = normalize(path);
        debug!(module = %path, "Handler module registered");
        self.modules.insert(path, Arc::new(module));
    }

    #[must_use]
    pub fn with_module(mut self, path: &str, module: HandlerModule) -> Self {
        self.register(path, module);
        self
    }

    pub fn get(&self, path: &str) -> Option<&Arc<HandlerModule>> {
        self.modules.get(&normalize(path))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").trim_matches('/').to_string()
}

/// `<base>/<module>`, or just `<module>` when the base is empty.
fn module_path(base: &str, module: &str) -> String {
    let module = module.trim_start_matches("./").trim_start_matches('/');
    if base.is_empty() {
        normalize(module)
    } else {
        normalize(&format!("{base}/{module}"))
    }
}

/// The `(operation id, handler module)` pair of `op`, if it names a handler.
fn binding(op: &OperationMeta) -> Result<Option<(&str, &str)>, ConfigError> {
    match (op.handler_operation_id(), op.handler_module()) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::MissingOperationHandler {
            method: op.method.clone(),
            path: op.full_path(),
        }),
        (None, Some(_)) => Err(ConfigError::MissingOperationId {
            method: op.method.clone(),
            path: op.full_path(),
        }),
        (Some(id), Some(module)) => Ok(Some((id, module))),
    }
}

/// Handlers bound to operations, keyed by `METHOD /template`.
#[derive(Clone, Default)]
pub struct Dispatcher {
    bound: HashMap<String, Handler>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ops: Vec<&String> = self.bound.keys().collect();
        ops.sort();
        f.debug_struct("Dispatcher").field("bound", &ops).finish()
    }
}

impl Dispatcher {
    /// Bind every operation in `table` that names a handler.
    ///
    /// With `operation_handlers` off this returns an empty dispatcher and every
    /// request goes to the host's `next`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingOperationHandler`]: id without handler module
    /// - [`ConfigError::MissingOperationId`]: handler module without id
    /// - [`ConfigError::UnknownHandlerModule`]: module path not registered
    /// - [`ConfigError::UnresolvedHandler`]: module lacks the id
    pub fn bind(
        table: &RouteTable,
        registry: &HandlerRegistry,
        options: &ValidatorOptions,
    ) -> Result<Self, ConfigError> {
        let Some(base) = options.operation_handlers.as_deref() else {
            return Ok(Self::default());
        };

        let mut bound = HashMap::new();
        let mut modules: HashMap<String, Arc<HandlerModule>> = HashMap::new();
        for op in table.operations() {
            let Some((operation_id, module)) = binding(op)? else {
                continue;
            };

            let path = module_path(base, module);
            let resolved = match modules.get(&path) {
                Some(m) => Arc::clone(m),
                None => {
                    let m = registry
                        .get(&path)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownHandlerModule { module: path.clone() })?;
                    modules.insert(path.clone(), Arc::clone(&m));
                    m
                }
            };
            let handler = resolved
                .lookup(operation_id)
                .cloned()
                .ok_or_else(|| ConfigError::UnresolvedHandler {
                    operation_id: operation_id.to_string(),
                    module: path.clone(),
                })?;
            debug!(operation = %op.key(), operation_id, module = %path, "Operation bound to handler");
            bound.insert(op.key(), handler);
        }

        info!(bound = bound.len(), modules = modules.len(), "Operation handlers bound");
        Ok(Self { bound })
    }

    /// Check id/module pairing for every operation without resolving modules.
    /// Returns how many operations would be bound.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingOperationHandler`] or [`ConfigError::MissingOperationId`].
    pub fn check_bindings(table: &RouteTable) -> Result<usize, ConfigError> {
        let mut count = 0;
        for op in table.operations() {
            if binding(op)?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn resolve_handler(&self, operation: &OperationMeta) -> Option<Handler> {
        self.bound.get(&operation.key()).cloned()
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}
