//! # oasgate
//!
//! **oasgate** enforces an OpenAPI 3 document as the contract of an HTTP
//! service. Placed in front of your handlers, it resolves each request to a
//! declared operation, checks its security requirements, validates and coerces
//! its parameters and body, dispatches it, and optionally validates the
//! response on the way out.
//!
//! The crate is transport-agnostic: the host server converts its own request
//! type into an [`ApiRequest`], awaits [`OpenApiValidator::handle`], and turns
//! the resulting [`ApiResponse`] or [`ApiError`] back into a wire response.
//!
//! ## Architecture
//!
//! - **[`spec`]** - loads the document and flattens it into operation metadata
//! - **[`router`]** - route table, path template matching and base path handling
//! - **[`security`]** - OR-of-AND evaluation of security requirements
//! - **[`validator`]** - schema compilation, coercion, defaults, read/write-only
//!   handling, request and response validation
//! - **[`validator_cache`]** - per-operation compiled validator sets, keyed by spec version
//! - **[`dispatcher`]** - binds operations to handler modules
//! - **[`pipeline`]** - the per-request state machine and hot-swappable snapshot
//! - **[`hot_reload`]** - filesystem watcher that rebuilds the snapshot
//! - **[`config`]** - options from files or code, normalised once
//! - **[`error`]** - request-time and configuration-time error types
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`cli`]** - the `oasgate` command for inspecting and checking documents
//!
//! ## Quick Start
//!
//! ```no_run
//! use oasgate::{load_spec, ApiRequest, ApiResponse, OpenApiValidator, ValidatorOptions};
//! use http::Method;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let spec = load_spec("openapi.yaml")?;
//! let validator = OpenApiValidator::new(&spec, ValidatorOptions::default())?;
//!
//! let request = ApiRequest::new(Method::GET, "/api/v1/products/42?verbose=true");
//! let response = validator
//!     .handle(request, |req| async move {
//!         let id = req.context.and_then(|c| c.path_param("id"));
//!         Ok(ApiResponse::json(200, serde_json::json!({ "id": id })))
//!     })
//!     .await;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Mapping
//!
//! | Failure                             | Status |
//! |-------------------------------------|--------|
//! | no route for the path               | 404    |
//! | path matches, method does not       | 405    |
//! | no credentials satisfy security     | 401    |
//! | credentials lack a required scope   | 403    |
//! | parameter or body fails its schema  | 400    |
//! | undeclared request media type       | 415    |
//! | body over `max_body_bytes`          | 413    |
//! | handler error or response violation | 500    |

pub mod cli;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod hot_reload;
pub mod logging;
pub mod pipeline;
pub mod router;
pub mod security;
pub mod spec;
pub mod validator;
pub mod validator_cache;

pub use config::{OptionsBuilder, RawOptions, ValidatorOptions};
pub use context::{ApiRequest, ApiResponse, HandlerRequest, RequestContext, RequestId};
pub use error::{ApiError, ConfigError, ErrorLocation, ValidationError};
pub use pipeline::OpenApiValidator;
pub use spec::{load_spec, load_spec_from_str, DocumentFormat};
