//! Normalized request types.
//!
//! Transport adapters translate their native request into a [`Request`]
//! before handing it to the pipeline. The pipeline never sees wire formats.

use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A unique identifier for each unit of work, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use conduit_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a request ID from its hyphenated string form.
    ///
    /// Returns `None` if the string is not a valid UUID.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RequestId> for Uuid {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

/// The transport a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP/1.1 or HTTP/2.
    #[default]
    Http,
    /// gRPC.
    Grpc,
    /// A message queue consumer.
    Queue,
    /// Anything else (scheduled jobs, CLI invocations, tests).
    Other,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
            Self::Queue => "queue",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// A transport-independent request.
///
/// # Example
///
/// ```
/// use conduit_core::Request;
/// use http::Method;
///
/// let request = Request::builder()
///     .method(Method::POST)
///     .path("/users")
///     .header("content-type", "application/json")
///     .body(serde_json::json!({"name": "Alice"}))
///     .build();
///
/// assert_eq!(request.method, Method::POST);
/// assert_eq!(request.header("content-type"), Some("application/json"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique id of this unit of work.
    pub id: RequestId,
    /// Request method.
    pub method: Method,
    /// Request path, without query string.
    pub path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    /// Route parameters extracted by the adapter.
    pub params: HashMap<String, String>,
    /// Decoded body.
    pub body: serde_json::Value,
    /// Transport the request arrived on.
    pub protocol: Protocol,
}

impl Request {
    /// Creates a request with the given method and path and a fresh id.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: HashMap::new(),
            params: HashMap::new(),
            body: serde_json::Value::Null,
            protocol: Protocol::default(),
        }
    }

    /// Creates a [`RequestBuilder`].
    #[must_use]
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

/// Builder for [`Request`].
#[derive(Debug, Default)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Sets the request id.
    pub fn id(mut self, id: RequestId) -> Self {
        self.request.id = id;
        self
    }

    /// Sets the method.
    pub fn method(mut self, method: Method) -> Self {
        self.request.method = method;
        self
    }

    /// Sets the path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.request.path = path.into();
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.request.headers.append(name, value);
        }
        self
    }

    /// Adds a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.insert(key.into(), value.into());
        self
    }

    /// Adds a route parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.params.insert(key.into(), value.into());
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.request.body = body;
        self
    }

    /// Sets the protocol.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.request.protocol = protocol;
        self
    }

    /// Builds the request.
    #[must_use]
    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_uniqueness() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_request_id_parse() {
        let id = RequestId::new();
        assert_eq!(RequestId::parse(&id.to_string()), Some(id));
        assert_eq!(RequestId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_request_id_serialization() {
        let id = RequestId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_request_defaults() {
        let request = Request::default();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/");
        assert_eq!(request.protocol, Protocol::Http);
        assert!(request.body.is_null());
    }

    #[test]
    fn test_builder_ignores_invalid_header() {
        let request = Request::builder()
            .header("bad header", "x")
            .header("x-ok", "yes")
            .query("page", "2")
            .param("id", "42")
            .protocol(Protocol::Queue)
            .build();

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("x-ok"), Some("yes"));
        assert_eq!(request.query.get("page").map(String::as_str), Some("2"));
        assert_eq!(request.params.get("id").map(String::as_str), Some("42"));
        assert_eq!(request.protocol.to_string(), "queue");
    }
}
