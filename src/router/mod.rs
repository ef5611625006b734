//! # Router Module
//!
//! Maps a concrete request (method + raw path) to the [`OperationMeta`] that
//! governs it and extracts raw path parameters.
//!
//! ## Architecture
//!
//! 1. **Compilation**: at build time every `(method, template)` pair of the
//!    document becomes a [`PathTemplate`], a small per-segment state machine
//!    (literal, whole-segment capture, or mixed literal/capture segment). The
//!    `servers[0].url` path is prepended to every template.
//!
//! 2. **Resolution**: the request path is split once and tested against every
//!    template. The most specific template for the method wins (fewest
//!    parameter segments, then document order). Captures are percent-decoded
//!    after matching; `array` path parameters with `simple` style are split on
//!    `,` first.
//!
//! ## Example
//!
//! ```rust,ignore
//! use oasgate::router::RouteTable;
//! use oasgate::spec::load_spec;
//!
//! let spec = load_spec("openapi.yaml")?;
//! let table = RouteTable::build(&spec)?;
//! let m = table.resolve(&http::Method::GET, "/pets/123")?;
//! println!("{} {:?}", m.operation.key(), m.get_path_param("id"));
//! ```
//!
//! [`OperationMeta`]: crate::spec::OperationMeta

mod core;
mod template;

pub use core::{ParamVec, RawParam, RouteError, RouteMatch, RouteTable, MAX_INLINE_PARAMS};
pub use template::{PathTemplate, TemplateError};
