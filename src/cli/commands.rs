use crate::config::{OptionsBuilder, RawOptions, ValidatorOptions};
use crate::dispatcher::{Dispatcher, HandlerRegistry};
use crate::pipeline::Snapshot;
use crate::router::{RawParam, RouteTable};
use crate::spec::load_spec;
use crate::validator_cache::SpecVersion;
use anyhow::Context;
use clap::{Parser, Subcommand};
use http::Method;
use std::path::{Path, PathBuf};

/// Command-line interface for oasgate
#[derive(Parser, Debug)]
#[command(name = "oasgate")]
#[command(about = "OpenAPI contract validation tooling", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the route table in match order
    Routes {
        /// Path to the OpenAPI document (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,
    },
    /// Build everything the pipeline would build and report configuration errors
    Check {
        /// Path to the OpenAPI document (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Validator options file (YAML, TOML or JSON)
        #[arg(short, long, env = "OASGATE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Resolve a request to its operation
    Resolve {
        /// Path to the OpenAPI document (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// HTTP method, e.g. GET
        method: String,

        /// Request path, including any base path
        path: String,
    },
}

pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Routes { spec } => {
            let table = load_table(&spec)?;
            table.dump_routes();
            Ok(())
        }
        Commands::Check { spec, config } => {
            let summary = check(&spec, config.as_deref())?;
            println!("{summary}");
            Ok(())
        }
        Commands::Resolve { spec, method, path } => {
            let table = load_table(&spec)?;
            let method: Method = method
                .to_ascii_uppercase()
                .parse()
                .with_context(|| format!("invalid HTTP method '{method}'"))?;
            let matched = table.resolve(&method, &path)?;
            let op = &matched.operation;
            println!(
                "{} {} -> {}",
                op.method,
                op.full_path(),
                op.handler_operation_id().unwrap_or("-")
            );
            for (name, value) in &matched.path_params {
                match value {
                    RawParam::Single(v) => println!("  {name} = {v}"),
                    RawParam::Multi(vs) => println!("  {name} = {vs:?}"),
                }
            }
            Ok(())
        }
    }
}

fn load_table(spec: &Path) -> anyhow::Result<RouteTable> {
    let document = load_spec(spec)?;
    Ok(RouteTable::build(&document)?)
}

/// Build the snapshot for `spec` under the options in `config`.
///
/// Handler modules only exist in the host process, so binding is checked for
/// id/module pairing without resolving modules.
pub(crate) fn check(spec: &Path, config: Option<&Path>) -> anyhow::Result<String> {
    let document = load_spec(spec)?;
    let bytes = std::fs::read(spec).with_context(|| format!("failed to read {}", spec.display()))?;
    let mut options = match config {
        Some(path) => OptionsBuilder::from_raw(RawOptions::from_path(path)?).build()?,
        None => ValidatorOptions::default(),
    };
    let handlers_enabled = options.operation_handlers.take().is_some();

    let snapshot = Snapshot::build(
        &document,
        &options,
        &HandlerRegistry::default(),
        SpecVersion::from_content(1, &bytes),
    )?;
    let bindings = if handlers_enabled {
        Dispatcher::check_bindings(&snapshot.table)?
    } else {
        0
    };

    let validators: usize = snapshot
        .table
        .operations()
        .filter_map(|op| snapshot.cache.get(op))
        .map(|set| set.len())
        .sum();
    Ok(format!(
        "ok: {} routes, {} validators, {} handler bindings (spec {})",
        snapshot.table.len(),
        validators,
        bindings,
        snapshot.version.to_key()
    ))
}
