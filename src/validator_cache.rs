//! # Validator Cache Module
//!
//! Holds the [`CompiledValidatorSet`] of every operation in a route table,
//! compiled eagerly when the cache is built so a schema problem fails the
//! build instead of a request.
//!
//! ## Versioning
//!
//! Each cache is stamped with a [`SpecVersion`]: a counter bumped on every
//! reload plus the first 16 hex characters of the document's SHA-256. A cache
//! is never mutated after it is built; a reload builds a new one and swaps the
//! whole snapshot.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! let table = RouteTable::build(&spec)?;
//! let cache = ValidatorCache::build(&table, &options, SpecVersion::from_content(1, &bytes))?;
//! let set = cache.get(&operation).expect("compiled at build");
//! ```

use crate::config::ValidatorOptions;
use crate::error::ConfigError;
use crate::router::RouteTable;
use crate::spec::OperationMeta;
use crate::validator::CompiledValidatorSet;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Version identifier for a loaded document.
///
/// Combines a monotonic counter with a content hash so two reloads of
/// identical bytes are still told apart in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecVersion {
    /// Monotonic counter incremented on each reload
    pub version: u64,
    /// First 16 hex characters of the content's SHA-256
    pub hash: String,
}

impl SpecVersion {
    pub fn new(version: u64, hash: impl Into<String>) -> Self {
        Self {
            version,
            hash: hash.into(),
        }
    }

    /// Hash `content` and stamp it with `version`.
    pub fn from_content(version: u64, content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        let hash: String = format!("{digest:x}").chars().take(16).collect();
        Self { version, hash }
    }

    /// The successor version for new `content`.
    #[must_use]
    pub fn next(&self, content: &[u8]) -> Self {
        Self::from_content(self.version + 1, content)
    }

    /// `{version}:{hash}`
    pub fn to_key(&self) -> String {
        format!("{}:{}", self.version, self.hash)
    }
}

impl Default for SpecVersion {
    fn default() -> Self {
        Self {
            version: 1,
            hash: "initial".to_string(),
        }
    }
}

/// Compile every validator `operation` needs.
///
/// # Errors
///
/// [`ConfigError::SchemaCompile`] if any schema fails to compile.
pub fn compile(
    operation: Arc<OperationMeta>,
    options: &ValidatorOptions,
) -> Result<CompiledValidatorSet, ConfigError> {
    CompiledValidatorSet::compile(operation, options)
}

/// Immutable map from operation (`METHOD /template`) to its compiled validators.
#[derive(Debug, Clone)]
pub struct ValidatorCache {
    sets: HashMap<String, Arc<CompiledValidatorSet>>,
    spec_version: SpecVersion,
}

impl ValidatorCache {
    /// Compile the validators of every operation in `table`.
    ///
    /// # Errors
    ///
    /// The first [`ConfigError::SchemaCompile`] encountered.
    pub fn build(
        table: &RouteTable,
        options: &ValidatorOptions,
        spec_version: SpecVersion,
    ) -> Result<Self, ConfigError> {
        let mut sets = HashMap::with_capacity(table.len());
        let mut validators = 0usize;
        for operation in table.operations() {
            let key = operation.key();
            if sets.contains_key(&key) {
                continue;
            }
            let set = compile(Arc::clone(operation), options)?;
            debug!(
                operation = %key,
                validators = set.len(),
                spec_version = spec_version.version,
                "Compiled operation validators"
            );
            validators += set.len();
            sets.insert(key, Arc::new(set));
        }
        info!(
            operations = sets.len(),
            validators,
            spec_version = spec_version.version,
            spec_hash = %spec_version.hash,
            "Validator cache built"
        );
        Ok(Self { sets, spec_version })
    }

    pub fn get(&self, operation: &OperationMeta) -> Option<&Arc<CompiledValidatorSet>> {
        self.sets.get(&operation.key())
    }

    /// Number of operations with compiled validators.
    pub fn size(&self) -> usize {
        self.sets.len()
    }

    pub fn spec_version(&self) -> &SpecVersion {
        &self.spec_version
    }
}
