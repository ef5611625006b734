//! # Spec Module
//!
//! Turns a parsed OpenAPI 3 document ([`oas3::OpenApiV3Spec`]) into the immutable
//! [`OperationMeta`] descriptors the rest of the pipeline works from.
//!
//! Schemas referenced via `#/components/schemas/*` and parameters referenced via
//! `#/components/parameters/*` are expanded while building; any other reference is
//! expected to be resolved by whoever produced the document.

pub use oas3::spec::{SecurityRequirement, SecurityScheme};
mod build;
mod load;
mod types;

pub use build::*;
pub use load::*;
pub use types::*;
