//! # Hot Reload Module
//!
//! Watches an OpenAPI document on disk and swaps a fresh snapshot into an
//! [`OpenApiValidator`] whenever the file changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oasgate::hot_reload::watch_spec;
//! use std::sync::Arc;
//!
//! let validator = Arc::new(OpenApiValidator::from_path("openapi.yaml", options, registry)?);
//! let _watcher = watch_spec("openapi.yaml", Arc::clone(&validator))?;
//! // keep `_watcher` alive for as long as reloads should happen
//! ```
//!
//! ## Reload Process
//!
//! 1. **Detection** - the filesystem watcher reports a modify or create event
//! 2. **Parse** - the document is re-read and parsed
//! 3. **Build** - route table, validators and handler bindings are rebuilt
//! 4. **Swap** - the new snapshot is published atomically
//!
//! ## Error Handling
//!
//! If the new document fails to parse or build, the error is logged and the
//! previous snapshot stays active. Requests are never served from a partly
//! built snapshot.

use crate::pipeline::OpenApiValidator;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Watch `spec_path` and reload `validator` on every change.
///
/// The returned watcher stops watching when dropped.
///
/// # Errors
///
/// Returns an error if the watcher cannot be created or the path cannot be watched.
pub fn watch_spec<P>(spec_path: P, validator: Arc<OpenApiValidator>) -> notify::Result<RecommendedWatcher>
where
    P: AsRef<Path>,
{
    watch_spec_with(spec_path, validator, |_| {})
}

/// Like [`watch_spec`], calling `on_reload` with the new version after each
/// successful swap.
///
/// # Errors
///
/// Returns an error if the watcher cannot be created or the path cannot be watched.
pub fn watch_spec_with<P, F>(
    spec_path: P,
    validator: Arc<OpenApiValidator>,
    mut on_reload: F,
) -> notify::Result<RecommendedWatcher>
where
    P: AsRef<Path>,
    F: FnMut(&crate::validator_cache::SpecVersion) + Send + 'static,
{
    let path: PathBuf = spec_path.as_ref().to_path_buf();
    let watch_path = path.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                match validator.reload_from_path(&watch_path) {
                    Ok(version) => {
                        info!(
                            path = %watch_path.display(),
                            spec_version = version.version,
                            spec_hash = %version.hash,
                            "hot-reload: document swapped in"
                        );
                        on_reload(&version);
                    }
                    Err(e) => {
                        warn!(
                            path = %watch_path.display(),
                            error = %e,
                            "hot-reload: keeping previous document"
                        );
                    }
                }
            }
            Err(e) => error!(error = %e, "hot-reload: watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
