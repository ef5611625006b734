//! # CLI Module
//!
//! Command-line tooling for inspecting a document the way the pipeline sees it.
//!
//! ## Commands
//!
//! ### `routes`
//!
//! Print the route table in match order:
//!
//! ```bash
//! oasgate routes --spec openapi.yaml
//! ```
//!
//! ### `check`
//!
//! Build the route table, compile every validator and check handler pairing,
//! reporting the first configuration error:
//!
//! ```bash
//! oasgate check --spec openapi.yaml --config oasgate.yaml
//! ```
//!
//! ### `resolve`
//!
//! Show which operation a request would reach and its raw path parameters:
//!
//! ```bash
//! oasgate resolve --spec openapi.yaml GET /api/v1/products/42
//! ```

mod commands;


pub use commands::{run_cli, Cli, Commands};
