use super::SecurityRequirement;
use http::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub const ALL: [ParameterLocation; 4] = [
        ParameterLocation::Path,
        ParameterLocation::Query,
        ParameterLocation::Header,
        ParameterLocation::Cookie,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    Matrix,
    Label,
    Form,
    Simple,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    /// Default serialization style for a location, per OpenAPI 3.
    #[must_use]
    pub fn default_for(location: ParameterLocation) -> Self {
        match location {
            ParameterLocation::Query | ParameterLocation::Cookie => ParameterStyle::Form,
            ParameterLocation::Path | ParameterLocation::Header => ParameterStyle::Simple,
        }
    }

    /// Delimiter separating array items in a single raw value.
    #[must_use]
    pub fn delimiter(self) -> char {
        match self {
            ParameterStyle::SpaceDelimited => ' ',
            ParameterStyle::PipeDelimited => '|',
            ParameterStyle::Label => '.',
            _ => ',',
        }
    }
}

impl From<oas3::spec::ParameterStyle> for ParameterStyle {
    fn from(style: oas3::spec::ParameterStyle) -> Self {
        use oas3::spec::ParameterStyle as PS;
        match style {
            PS::Matrix => ParameterStyle::Matrix,
            PS::Label => ParameterStyle::Label,
            PS::Form => ParameterStyle::Form,
            PS::Simple => ParameterStyle::Simple,
            PS::SpaceDelimited => ParameterStyle::SpaceDelimited,
            PS::PipeDelimited => ParameterStyle::PipeDelimited,
            PS::DeepObject => ParameterStyle::DeepObject,
        }
    }
}

impl fmt::Display for ParameterStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParameterStyle::Matrix => "matrix",
            ParameterStyle::Label => "label",
            ParameterStyle::Form => "form",
            ParameterStyle::Simple => "simple",
            ParameterStyle::SpaceDelimited => "spaceDelimited",
            ParameterStyle::PipeDelimited => "pipeDelimited",
            ParameterStyle::DeepObject => "deepObject",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterLocation::Path => write!(f, "path"),
            ParameterLocation::Query => write!(f, "query"),
            ParameterLocation::Header => write!(f, "header"),
            ParameterLocation::Cookie => write!(f, "cookie"),
        }
    }
}

impl From<oas3::spec::ParameterIn> for ParameterLocation {
    fn from(loc: oas3::spec::ParameterIn) -> Self {
        match loc {
            oas3::spec::ParameterIn::Path => ParameterLocation::Path,
            oas3::spec::ParameterIn::Query => ParameterLocation::Query,
            oas3::spec::ParameterIn::Header => ParameterLocation::Header,
            oas3::spec::ParameterIn::Cookie => ParameterLocation::Cookie,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterMeta {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Option<Value>,
    pub style: ParameterStyle,
    pub explode: bool,
}

impl ParameterMeta {
    /// Declared JSON type of the parameter schema, if any.
    #[must_use]
    pub fn schema_type(&self) -> Option<&str> {
        self.schema
            .as_ref()
            .and_then(|s| s.get("type"))
            .and_then(|t| match t {
                Value::String(s) => Some(s.as_str()),
                Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
                _ => None,
            })
    }

    /// Whether a path capture of this parameter holds several comma-separated values.
    #[must_use]
    pub fn is_multi_capture(&self) -> bool {
        self.location == ParameterLocation::Path
            && self.style == ParameterStyle::Simple
            && self.schema_type() == Some("array")
    }
}

/// Key a response is declared under: an exact status, an `NXX` range, or `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResponseKey {
    Status(u16),
    Range(u16),
    Default,
}

impl ResponseKey {
    /// Parse a key of an operation's `responses` map.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("default") {
            return Some(ResponseKey::Default);
        }
        let upper = raw.to_ascii_uppercase();
        if let Some(class) = upper.strip_suffix("XX") {
            return class
                .parse::<u16>()
                .ok()
                .filter(|c| (1..=5).contains(c))
                .map(ResponseKey::Range);
        }
        raw.parse::<u16>().ok().map(ResponseKey::Status)
    }
}

impl fmt::Display for ResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKey::Status(s) => write!(f, "{s}"),
            ResponseKey::Range(c) => write!(f, "{c}XX"),
            ResponseKey::Default => f.write_str("default"),
        }
    }
}

/// Schemas keyed by media type (`application/json`, `multipart/form-data`, ...).
pub type MediaSchemas = BTreeMap<String, Option<Value>>;

#[derive(Debug, Clone, Default)]
pub struct RequestBodyMeta {
    pub required: bool,
    pub content: MediaSchemas,
}

pub type Responses = BTreeMap<ResponseKey, MediaSchemas>;

/// Immutable description of one operation, derived once when the route table
/// is built.
#[derive(Debug, Clone)]
pub struct OperationMeta {
    pub method: Method,
    /// Template as written in the document (without base path).
    pub path_template: Arc<str>,
    /// Base path from `servers[0].url` prepended when matching.
    pub base_path: Arc<str>,
    pub operation_id: Option<String>,
    /// Ordered names of the parameters captured from the path template.
    pub path_param_names: Vec<String>,
    pub parameters: Vec<ParameterMeta>,
    pub request_body: Option<RequestBodyMeta>,
    pub responses: Responses,
    pub security: Vec<SecurityRequirement>,
    pub extensions: BTreeMap<String, Value>,
}

impl OperationMeta {
    /// Identity used for caching and logging: `GET /products/{id}`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path_template)
    }

    #[must_use]
    pub fn full_path(&self) -> String {
        format!("{}{}", self.base_path, self.path_template)
    }

    pub fn parameters_in(
        &self,
        location: ParameterLocation,
    ) -> impl Iterator<Item = &ParameterMeta> + '_ {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }

    #[must_use]
    pub fn parameter(&self, location: ParameterLocation, name: &str) -> Option<&ParameterMeta> {
        self.parameters_in(location).find(|p| {
            if location == ParameterLocation::Header {
                p.name.eq_ignore_ascii_case(name)
            } else {
                p.name == name
            }
        })
    }

    /// Look up an `x-*` extension. Accepts the key with or without the `x-` prefix.
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<&Value> {
        let bare = name.strip_prefix("x-").unwrap_or(name);
        self.extensions
            .get(bare)
            .or_else(|| self.extensions.get(&format!("x-{bare}")))
    }

    /// Identifier used to bind a handler: `x-eov-operation-id` wins over `operationId`.
    #[must_use]
    pub fn handler_operation_id(&self) -> Option<&str> {
        self.extension("x-eov-operation-id")
            .and_then(Value::as_str)
            .or(self.operation_id.as_deref())
    }

    #[must_use]
    pub fn handler_module(&self) -> Option<&str> {
        self.extension("x-eov-operation-handler")
            .and_then(Value::as_str)
    }

    #[must_use]
    pub fn requires_security(&self) -> bool {
        !self.security.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_keys_parse() {
        assert_eq!(ResponseKey::parse("200"), Some(ResponseKey::Status(200)));
        assert_eq!(ResponseKey::parse("2XX"), Some(ResponseKey::Range(2)));
        assert_eq!(ResponseKey::parse("4xx"), Some(ResponseKey::Range(4)));
        assert_eq!(ResponseKey::parse("default"), Some(ResponseKey::Default));
        assert_eq!(ResponseKey::parse("9XX"), None);
        assert_eq!(ResponseKey::parse("ok"), None);
    }

    #[test]
    fn default_styles() {
        assert_eq!(
            ParameterStyle::default_for(ParameterLocation::Query),
            ParameterStyle::Form
        );
        assert_eq!(
            ParameterStyle::default_for(ParameterLocation::Path),
            ParameterStyle::Simple
        );
        assert_eq!(ParameterStyle::PipeDelimited.delimiter(), '|');
    }

    #[test]
    fn nullable_array_type_is_array() {
        let p = ParameterMeta {
            name: "ids".into(),
            location: ParameterLocation::Path,
            required: true,
            schema: Some(serde_json::json!({"type": ["array", "null"]})),
            style: ParameterStyle::Simple,
            explode: false,
        };
        assert_eq!(p.schema_type(), Some("array"));
        assert!(p.is_multi_capture());
    }
}
