//! The mutable response shell units write into.

use http::{HeaderMap, HeaderValue, StatusCode};

/// Response being built by the pipeline.
///
/// Adapters hand the pipeline a default shell (status 200, no headers, null
/// body) and write whatever the units left in it back to the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: serde_json::Value,
}

impl Response {
    /// Creates the default 200 response shell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: serde_json::Value::Null,
        }
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets the body.
    pub fn set_body(&mut self, body: serde_json::Value) -> &mut Self {
        self.body = body;
        self
    }

    /// Sets a header, replacing existing values. Invalid names or values are
    /// ignored and reported at debug level.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        match (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::debug!(header = name, "ignoring invalid response header"),
        }
        self
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns `true` if the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}
