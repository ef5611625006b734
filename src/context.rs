//! Request/response values exchanged with the host server, and the per-request
//! validation context the pipeline fills in as stages complete.

use crate::error::ValidationError;
use crate::router::{ParamVec, RawParam};
use crate::spec::OperationMeta;
use http::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Maximum inline headers/cookies before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header or cookie pairs in arrival order. Names are `Arc<str>` so repeated
/// names clone cheaply.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Decoded query pairs in arrival order; repeated keys are kept.
pub type QueryVec = SmallVec<[(Arc<str>, String); 8]>;

/// Strongly typed request identifier backed by ULID.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Reuse an upstream `x-request-id` when it is a valid ULID, else mint one.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RequestId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<RequestId>()
            .map_err(|_| serde::de::Error::custom("invalid request id"))
    }
}

/// An inbound request as handed over by the host server.
///
/// The body is already parsed: JSON as-is, form and multipart fields as a JSON
/// object, text as a JSON string. `body_len` is the raw size on the wire when
/// the host knows it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    pub query: QueryVec,
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    pub content_type: Option<String>,
    pub body: Option<Value>,
    pub body_len: Option<usize>,
}

impl ApiRequest {
    /// Create a request from a method and a path that may carry a query string.
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query_str) = uri.split_once('?').unwrap_or((uri, ""));
        let query = url::form_urlencoded::parse(query_str.as_bytes())
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
            .collect();
        ApiRequest {
            method,
            path: path.to_string(),
            query,
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            content_type: None,
            body: None,
            body_len: None,
        }
    }

    /// Add a header. `cookie` headers are also parsed into [`ApiRequest::cookies`]
    /// and `content-type` sets [`ApiRequest::content_type`].
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if name.eq_ignore_ascii_case("cookie") {
            for pair in value.split(';') {
                if let Some((k, v)) = pair.trim().split_once('=') {
                    self.cookies.push((Arc::from(k.trim()), v.trim().to_string()));
                }
            }
        } else if name.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value.clone());
        }
        self.headers.push((Arc::from(name.to_ascii_lowercase().as_str()), value));
        self
    }

    /// Attach a JSON body with `application/json` content type.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body_len = serde_json::to_vec(&body).ok().map(|b| b.len());
        if self.content_type.is_none() {
            self = self.header("content-type", "application/json");
        }
        self.body = Some(body);
        self
    }

    /// Attach an already parsed body of any media type.
    #[must_use]
    pub fn body(mut self, content_type: &str, body: Value) -> Self {
        self = self.header("content-type", content_type);
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn body_len(mut self, len: usize) -> Self {
        self.body_len = Some(len);
        self
    }

    /// Get a header by name (case-insensitive).
    #[inline]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get the last value of a query parameter.
    #[inline]
    pub fn get_query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Media type without parameters, lowercased (`application/json`).
    #[must_use]
    pub fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(essence)
    }
}

/// Strip parameters (`; charset=utf-8`) and lowercase a content type.
pub(crate) fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Output of a handler, validated on the way back when response validation is on.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    pub body: Option<Value>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderVec, body: Option<Value>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// JSON response with `content-type: application/json`.
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body: Some(body),
        }
    }

    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self::new(status, HeaderVec::new(), None)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str())
    }
}

/// Where the pipeline stands for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Pending,
    Passed,
    Failed(Vec<ValidationError>),
}

/// Per-request validation state, attached once the route is resolved.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub operation: Arc<OperationMeta>,
    pub raw_path_params: ParamVec,
    /// Path parameters after coercion.
    pub path_params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub cookies: Map<String, Value>,
    /// Schemes of the security alternative that authorized the request.
    pub security: Vec<String>,
    pub outcome: Outcome,
}

impl RequestContext {
    pub fn new(request_id: RequestId, operation: Arc<OperationMeta>, raw_path_params: ParamVec) -> Self {
        Self {
            request_id,
            operation,
            raw_path_params,
            path_params: Map::new(),
            query: Map::new(),
            headers: Map::new(),
            cookies: Map::new(),
            security: Vec::new(),
            outcome: Outcome::Pending,
        }
    }

    /// Operation id used for handler binding (`x-eov-operation-id` or `operationId`).
    pub fn operation_id(&self) -> Option<&str> {
        self.operation.handler_operation_id()
    }

    pub fn path_template(&self) -> &str {
        &self.operation.path_template
    }

    /// Coerced path parameter, falling back to the raw capture before validation ran.
    pub fn path_param(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.path_params.get(name) {
            return Some(v.clone());
        }
        self.raw_path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| match v {
                RawParam::Single(s) => Value::String(s.clone()),
                RawParam::Multi(vs) => Value::from(vs.clone()),
            })
    }
}

/// What a business handler (or the host's `next`) receives.
///
/// `context` is `None` for requests that bypassed the pipeline (ignored paths,
/// paths outside the base path).
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub request: ApiRequest,
    pub context: Option<RequestContext>,
}
