//! # Validator Module
//!
//! Request and response validation against the schemas an operation declares.
//!
//! Schemas are rewritten from OpenAPI into plain JSON Schema per direction
//! ([`prepare`]), compiled once per operation into a [`CompiledValidatorSet`],
//! and run in a fixed stage order on each request:
//!
//! 1. path parameters
//! 2. query parameters (unknown keys rejected unless allowed)
//! 3. header parameters
//! 4. cookie parameters
//! 5. request body (media type, `readOnly`, coercion, defaults, schema)
//!
//! Raw parameter strings are coerced to their declared types before they are
//! checked, and the coerced values land in the
//! [`RequestContext`](crate::context::RequestContext).
//!
//! On the way out, the handler's status must be declared (exact, `NXX`, or
//! `default`), `writeOnly` properties are stripped, and the body is checked.

mod coerce;
mod compiled;
mod formats;
mod request;
mod response;
mod schema;
mod visibility;

pub use coerce::{coerce_body, coerce_param, inject_defaults};
pub use compiled::{CompiledSchema, CompiledValidatorSet};
pub use formats::OPENAPI_FORMATS;
pub use request::Stage;
pub use schema::{prepare, Direction};
pub use visibility::{read_only_violations, remove_additional, strip_write_only};
