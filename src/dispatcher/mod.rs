//! # Dispatcher Module
//!
//! Binds operations to business handlers by id, so the pipeline can invoke a
//! handler directly instead of the host's `next`.
//!
//! ## Binding
//!
//! An operation is bound when it carries both an id (`x-eov-operation-id`,
//! else `operationId`) and an `x-eov-operation-handler` module name. The module
//! path is `<base dir>/<module>`; modules are registered once in a
//! [`HandlerRegistry`] under that path.
//!
//! ```rust,ignore
//! use oasgate::dispatcher::{handler, HandlerModule, HandlerRegistry};
//! use oasgate::context::ApiResponse;
//!
//! let products = HandlerModule::new().export("getProduct", handler(|req| async move {
//!     let id = req.context.as_ref().and_then(|c| c.path_param("id"));
//!     Ok(ApiResponse::json(200, serde_json::json!({ "id": id })))
//! }));
//! let registry = HandlerRegistry::new().with_module("handlers/products", products);
//! ```
//!
//! ## Resolution
//!
//! A module's direct exports are searched first, then its `default`
//! namespace. Every bound operation is resolved when the dispatcher is built;
//! an unresolvable one is a [`ConfigError`](crate::error::ConfigError), never a
//! request-time failure.

mod core;

pub use core::{handler, Dispatcher, Handler, HandlerFuture, HandlerModule, HandlerRegistry};
