//! # Configuration
//!
//! Options arrive in two shapes:
//!
//! - [`RawOptions`], deserialized from YAML, TOML or JSON. Most options accept
//!   either a flag or a detailed table (`validate_requests: true` or
//!   `validate_requests: { allow_unknown_query_parameters: true }`).
//! - [`OptionsBuilder`], for options that only exist in code: security handlers,
//!   custom formats and `ignore_paths` predicates.
//!
//! Both are normalised once by [`OptionsBuilder::build`] into an immutable
//! [`ValidatorOptions`]. Conflicting combinations are rejected there, before any
//! route table or validator is built.
//!
//! ## Example
//!
//! ```yaml
//! coerce_types: true
//! validate_requests:
//!   allow_unknown_query_parameters: false
//!   remove_additional: all
//! validate_responses: true
//! validate_formats: fast
//! unknown_formats: [uuid-v7]
//! ignore_paths: ^/internal/
//! max_body_bytes: 1048576
//! ```

use crate::error::ConfigError;
use crate::security::{SecurityHandler, SecurityHandlers};
use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Either a plain on/off flag or a detailed options table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Toggle<T> {
    Flag(bool),
    Detailed(T),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RawRequestOptions {
    #[serde(alias = "allowUnknownQueryParameters")]
    pub allow_unknown_query_parameters: Option<bool>,
    #[serde(alias = "removeAdditional")]
    pub remove_additional: Option<RemoveAdditional>,
    #[serde(alias = "allowReadOnly")]
    pub allow_read_only: Option<bool>,
    #[serde(alias = "coerceTypes")]
    pub coerce_types: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RawResponseOptions {
    #[serde(alias = "removeAdditional")]
    pub remove_additional: Option<RemoveAdditional>,
}

/// Options record as written in a configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RawOptions {
    #[serde(alias = "coerceTypes")]
    pub coerce_types: Option<bool>,
    #[serde(alias = "validateRequests")]
    pub validate_requests: Option<Toggle<RawRequestOptions>>,
    #[serde(alias = "validateResponses")]
    pub validate_responses: Option<Toggle<RawResponseOptions>>,
    #[serde(alias = "validateSecurity")]
    pub validate_security: Option<bool>,
    #[serde(alias = "unknownFormats")]
    pub unknown_formats: Option<UnknownFormats>,
    #[serde(alias = "validateFormats")]
    pub validate_formats: Option<FormatMode>,
    #[serde(alias = "operationHandlers")]
    pub operation_handlers: Option<Toggle<String>>,
    #[serde(alias = "ignorePaths")]
    pub ignore_paths: Option<String>,
    #[serde(alias = "aggregateStages")]
    pub aggregate_stages: Option<bool>,
    #[serde(alias = "maxBodyBytes")]
    pub max_body_bytes: Option<usize>,
}

impl RawOptions {
    /// Load from a `.yaml`/`.yml`, `.toml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options file: {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let raw = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "toml" => toml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };
        Ok(raw)
    }

    pub fn from_yaml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// `remove_additional`: `false`, `true` (only where `additionalProperties: false`)
/// or `"all"` (every undeclared property).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemoveAdditional {
    #[default]
    Off,
    Declared,
    All,
}

impl<'de> Deserialize<'de> for RemoveAdditional {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Word(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Flag(false) => Ok(RemoveAdditional::Off),
            Repr::Flag(true) => Ok(RemoveAdditional::Declared),
            Repr::Word(w) if w == "all" => Ok(RemoveAdditional::All),
            Repr::Word(w) => Err(serde::de::Error::custom(format!(
                "remove_additional must be a boolean or \"all\", got \"{w}\""
            ))),
        }
    }
}

/// `validate_formats`: `"fast"`, `"full"` or `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatMode {
    /// Cheap regex checks for date/time/uri formats.
    #[default]
    Fast,
    /// The schema engine's full format validators.
    Full,
    Off,
}

impl<'de> Deserialize<'de> for FormatMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Word(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Flag(false) => Ok(FormatMode::Off),
            Repr::Flag(true) => Ok(FormatMode::Fast),
            Repr::Word(w) => match w.as_str() {
                "fast" => Ok(FormatMode::Fast),
                "full" => Ok(FormatMode::Full),
                _ => Err(serde::de::Error::custom(format!(
                    "validate_formats must be \"fast\", \"full\" or false, got \"{w}\""
                ))),
            },
        }
    }
}

/// `unknown_formats`: `true` (an unknown format is a configuration error),
/// `"ignore"`, or a list of format names to accept without checking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UnknownFormats {
    #[default]
    Reject,
    Ignore,
    Allow(Vec<String>),
}

impl<'de> Deserialize<'de> for UnknownFormats {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Word(String),
            List(Vec<String>),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(UnknownFormats::Reject),
            Repr::Word(w) if w == "ignore" => Ok(UnknownFormats::Ignore),
            Repr::List(names) => Ok(UnknownFormats::Allow(names)),
            Repr::Flag(false) => Err(serde::de::Error::custom(
                "unknown_formats: false is not supported; use \"ignore\"",
            )),
            Repr::Word(w) => Err(serde::de::Error::custom(format!(
                "unknown_formats must be true, \"ignore\" or a list, got \"{w}\""
            ))),
        }
    }
}

/// Custom `format` checker registered in code.
pub type FormatFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Requests whose path matches bypass the pipeline entirely.
#[derive(Clone)]
pub enum IgnorePaths {
    Pattern(Regex),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl IgnorePaths {
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            IgnorePaths::Pattern(re) => re.is_match(path),
            IgnorePaths::Predicate(f) => f(path),
        }
    }
}

impl fmt::Debug for IgnorePaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnorePaths::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            IgnorePaths::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub allow_unknown_query_parameters: bool,
    pub remove_additional: RemoveAdditional,
    pub allow_read_only: bool,
    /// Convert raw parameter strings and structured body scalars to declared types.
    pub coerce_types: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            allow_unknown_query_parameters: false,
            remove_additional: RemoveAdditional::Off,
            allow_read_only: false,
            coerce_types: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseOptions {
    pub remove_additional: RemoveAdditional,
}

/// Normalised, immutable options. Construct through [`OptionsBuilder`].
#[derive(Clone)]
pub struct ValidatorOptions {
    /// `None` disables request validation.
    pub requests: Option<RequestOptions>,
    /// `None` disables response validation.
    pub responses: Option<ResponseOptions>,
    pub validate_security: bool,
    pub security_handlers: SecurityHandlers,
    pub formats: FormatMode,
    pub unknown_formats: UnknownFormats,
    pub custom_formats: Vec<(String, FormatFn)>,
    /// Handler module base directory; `None` disables the dispatcher.
    pub operation_handlers: Option<String>,
    pub ignore_paths: Option<IgnorePaths>,
    pub aggregate_stages: bool,
    pub max_body_bytes: Option<usize>,
}

impl fmt::Debug for ValidatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let custom: Vec<&str> = self.custom_formats.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("ValidatorOptions")
            .field("requests", &self.requests)
            .field("responses", &self.responses)
            .field("validate_security", &self.validate_security)
            .field("security_handlers", &self.security_handlers)
            .field("formats", &self.formats)
            .field("unknown_formats", &self.unknown_formats)
            .field("custom_formats", &custom)
            .field("operation_handlers", &self.operation_handlers)
            .field("ignore_paths", &self.ignore_paths)
            .field("aggregate_stages", &self.aggregate_stages)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            requests: Some(RequestOptions::default()),
            responses: None,
            validate_security: true,
            security_handlers: SecurityHandlers::default(),
            formats: FormatMode::Fast,
            unknown_formats: UnknownFormats::Reject,
            custom_formats: Vec::new(),
            operation_handlers: None,
            ignore_paths: None,
            aggregate_stages: false,
            max_body_bytes: None,
        }
    }
}

impl ValidatorOptions {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Whether `name` is acceptable as a format that has no checker.
    #[must_use]
    pub fn format_is_allowed_unknown(&self, name: &str) -> bool {
        match &self.unknown_formats {
            UnknownFormats::Reject => false,
            UnknownFormats::Ignore => true,
            UnknownFormats::Allow(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Collects raw and code-side options, then validates them once.
#[derive(Default)]
pub struct OptionsBuilder {
    raw: RawOptions,
    security_handlers: SecurityHandlers,
    custom_formats: Vec<(String, FormatFn)>,
    ignore_predicate: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl OptionsBuilder {
    pub fn from_raw(raw: RawOptions) -> Self {
        Self {
            raw,
            ..Self::default()
        }
    }

    /// Set a request sub-option. An explicit `validate_requests(false)` stays
    /// in force.
    fn update_requests(&mut self, f: impl FnOnce(&mut RawRequestOptions)) {
        let mut current = match self.raw.validate_requests.take() {
            Some(Toggle::Detailed(r)) => r,
            Some(Toggle::Flag(false)) => {
                self.raw.validate_requests = Some(Toggle::Flag(false));
                return;
            }
            _ => RawRequestOptions::default(),
        };
        f(&mut current);
        self.raw.validate_requests = Some(Toggle::Detailed(current));
    }

    fn update_responses(&mut self, f: impl FnOnce(&mut RawResponseOptions)) {
        let mut current = match self.raw.validate_responses.take() {
            Some(Toggle::Detailed(r)) => r,
            Some(Toggle::Flag(false)) => {
                self.raw.validate_responses = Some(Toggle::Flag(false));
                return;
            }
            _ => RawResponseOptions::default(),
        };
        f(&mut current);
        self.raw.validate_responses = Some(Toggle::Detailed(current));
    }

    #[must_use]
    pub fn coerce_types(mut self, on: bool) -> Self {
        self.raw.coerce_types = Some(on);
        self
    }

    #[must_use]
    pub fn validate_requests(mut self, on: bool) -> Self {
        if !(on && matches!(self.raw.validate_requests, Some(Toggle::Detailed(_)))) {
            self.raw.validate_requests = Some(Toggle::Flag(on));
        }
        self
    }

    #[must_use]
    pub fn allow_unknown_query_parameters(mut self, on: bool) -> Self {
        self.update_requests(|r| r.allow_unknown_query_parameters = Some(on));
        self
    }

    #[must_use]
    pub fn allow_read_only(mut self, on: bool) -> Self {
        self.update_requests(|r| r.allow_read_only = Some(on));
        self
    }

    #[must_use]
    pub fn remove_additional(mut self, mode: RemoveAdditional) -> Self {
        self.update_requests(|r| r.remove_additional = Some(mode));
        self
    }

    #[must_use]
    pub fn validate_responses(mut self, on: bool) -> Self {
        if !(on && matches!(self.raw.validate_responses, Some(Toggle::Detailed(_)))) {
            self.raw.validate_responses = Some(Toggle::Flag(on));
        }
        self
    }

    #[must_use]
    pub fn response_remove_additional(mut self, mode: RemoveAdditional) -> Self {
        self.update_responses(|r| r.remove_additional = Some(mode));
        self
    }

    #[must_use]
    pub fn validate_security(mut self, on: bool) -> Self {
        self.raw.validate_security = Some(on);
        self
    }

    #[must_use]
    pub fn security_handler(mut self, scheme: &str, handler: Arc<dyn SecurityHandler>) -> Self {
        self.security_handlers.register(scheme, handler);
        self
    }

    #[must_use]
    pub fn validate_formats(mut self, mode: FormatMode) -> Self {
        self.raw.validate_formats = Some(mode);
        self
    }

    #[must_use]
    pub fn unknown_formats(mut self, unknown: UnknownFormats) -> Self {
        self.raw.unknown_formats = Some(unknown);
        self
    }

    /// Register a checker for a custom `format` name.
    #[must_use]
    pub fn format<F>(mut self, name: &str, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.custom_formats.push((name.to_string(), Arc::new(check)));
        self
    }

    /// Enable the dispatcher, resolving handler modules under `base_dir`.
    #[must_use]
    pub fn operation_handlers(mut self, base_dir: &str) -> Self {
        self.raw.operation_handlers = Some(Toggle::Detailed(base_dir.to_string()));
        self
    }

    #[must_use]
    pub fn ignore_paths(mut self, pattern: &str) -> Self {
        self.raw.ignore_paths = Some(pattern.to_string());
        self
    }

    #[must_use]
    pub fn ignore_paths_fn<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.ignore_predicate = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn aggregate_stages(mut self, on: bool) -> Self {
        self.raw.aggregate_stages = Some(on);
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.raw.max_body_bytes = Some(limit);
        self
    }

    /// Normalise into [`ValidatorOptions`].
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidOption`] for unusable values (bad regex, zero body
    ///   limit, empty handler directory).
    /// - [`ConfigError::Conflict`] for mutually exclusive combinations.
    pub fn build(self) -> Result<ValidatorOptions, ConfigError> {
        let OptionsBuilder {
            raw,
            security_handlers,
            custom_formats,
            ignore_predicate,
        } = self;

        let top_coerce = raw.coerce_types;
        let requests = match raw.validate_requests {
            None | Some(Toggle::Flag(true)) => Some(RequestOptions {
                coerce_types: top_coerce.unwrap_or(true),
                ..RequestOptions::default()
            }),
            Some(Toggle::Flag(false)) => None,
            Some(Toggle::Detailed(r)) => Some(RequestOptions {
                allow_unknown_query_parameters: r.allow_unknown_query_parameters.unwrap_or(false),
                remove_additional: r.remove_additional.unwrap_or_default(),
                allow_read_only: r.allow_read_only.unwrap_or(false),
                coerce_types: r.coerce_types.or(top_coerce).unwrap_or(true),
            }),
        };

        let responses = match raw.validate_responses {
            None | Some(Toggle::Flag(false)) => None,
            Some(Toggle::Flag(true)) => Some(ResponseOptions::default()),
            Some(Toggle::Detailed(r)) => Some(ResponseOptions {
                remove_additional: r.remove_additional.unwrap_or_default(),
            }),
        };

        let formats = raw.validate_formats.unwrap_or_default();
        let unknown_formats = raw.unknown_formats.unwrap_or_default();
        if formats == FormatMode::Off {
            if let UnknownFormats::Allow(_) = unknown_formats {
                return Err(ConfigError::Conflict(
                    "unknown_formats lists format names but validate_formats is false".into(),
                ));
            }
            if !custom_formats.is_empty() {
                return Err(ConfigError::Conflict(
                    "custom formats registered but validate_formats is false".into(),
                ));
            }
        }

        let operation_handlers = match raw.operation_handlers {
            None | Some(Toggle::Flag(false)) => None,
            Some(Toggle::Flag(true)) => Some(String::new()),
            Some(Toggle::Detailed(dir)) => {
                if dir.trim().is_empty() {
                    return Err(ConfigError::InvalidOption {
                        option: "operation_handlers",
                        message: "base directory must not be empty".into(),
                    });
                }
                Some(dir.trim_end_matches('/').to_string())
            }
        };

        let ignore_paths = match (raw.ignore_paths, ignore_predicate) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Conflict(
                    "ignore_paths given both as a pattern and as a predicate".into(),
                ))
            }
            (Some(pattern), None) => Some(IgnorePaths::Pattern(Regex::new(&pattern).map_err(
                |e| ConfigError::InvalidOption {
                    option: "ignore_paths",
                    message: e.to_string(),
                },
            )?)),
            (None, Some(f)) => Some(IgnorePaths::Predicate(f)),
            (None, None) => None,
        };

        if raw.max_body_bytes == Some(0) {
            return Err(ConfigError::InvalidOption {
                option: "max_body_bytes",
                message: "must be greater than zero".into(),
            });
        }

        let validate_security = raw.validate_security.unwrap_or(true);
        if !validate_security && !security_handlers.is_empty() {
            tracing::warn!("security handlers registered but validate_security is false; they will not run");
        }

        Ok(ValidatorOptions {
            requests,
            responses,
            validate_security,
            security_handlers,
            formats,
            unknown_formats,
            custom_formats,
            operation_handlers,
            ignore_paths,
            aggregate_stages: raw.aggregate_stages.unwrap_or(false),
            max_body_bytes: raw.max_body_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_request_validation_only() {
        let opts = ValidatorOptions::builder().build().unwrap();
        let req = opts.requests.unwrap();
        assert!(req.coerce_types);
        assert!(!req.allow_unknown_query_parameters);
        assert!(opts.responses.is_none());
        assert_eq!(opts.unknown_formats, UnknownFormats::Reject);
        assert_eq!(opts.formats, FormatMode::Fast);
    }

    #[test]
    fn raw_yaml_accepts_flags_and_tables() {
        let raw = RawOptions::from_yaml_str(
            "validateRequests:\n  allowUnknownQueryParameters: true\n  removeAdditional: all\nvalidate_responses: true\nunknown_formats: ignore\nvalidate_formats: full\noperation_handlers: handlers/\n",
        )
        .unwrap();
        let opts = OptionsBuilder::from_raw(raw).build().unwrap();
        let req = opts.requests.unwrap();
        assert!(req.allow_unknown_query_parameters);
        assert_eq!(req.remove_additional, RemoveAdditional::All);
        assert!(opts.responses.is_some());
        assert_eq!(opts.unknown_formats, UnknownFormats::Ignore);
        assert_eq!(opts.formats, FormatMode::Full);
        assert_eq!(opts.operation_handlers.as_deref(), Some("handlers"));
    }

    #[test]
    fn disabled_validation_survives_sub_options() {
        let opts = ValidatorOptions::builder()
            .validate_requests(false)
            .allow_read_only(true)
            .validate_responses(false)
            .response_remove_additional(RemoveAdditional::All)
            .build()
            .unwrap();
        assert!(opts.requests.is_none());
        assert!(opts.responses.is_none());

        let opts = ValidatorOptions::builder()
            .allow_read_only(true)
            .validate_requests(true)
            .build()
            .unwrap();
        assert!(opts.requests.unwrap().allow_read_only);
    }

    #[test]
    fn unknown_format_list_conflicts_with_disabled_formats() {
        let err = ValidatorOptions::builder()
            .validate_formats(FormatMode::Off)
            .unknown_formats(UnknownFormats::Allow(vec!["x".into()]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Conflict(_)));
    }

    #[test]
    fn invalid_ignore_regex_rejected() {
        let err = ValidatorOptions::builder().ignore_paths("(").build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { option: "ignore_paths", .. }));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(RawOptions::from_yaml_str("validate_everything: true\n").is_err());
    }
}
