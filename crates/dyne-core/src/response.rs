//! Outbound response.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, ALLOW, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::error::{DyneError, SerializationError};

/// Response built by handlers and pipeline stages.
///
/// Besides the raw body, a response may carry an unserialized object
/// ([`Response::with_object`]); an output stage encodes it into the body
/// with its schema.
///
/// # Example
///
/// ```
/// use dyne_core::Response;
/// use http::StatusCode;
///
/// let resp = Response::json(&serde_json::json!({"ok": true}))
///     .unwrap()
///     .with_status(StatusCode::CREATED);
/// assert_eq!(resp.status(), StatusCode::CREATED);
/// assert_eq!(resp.header("content-type"), Some("application/json"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    object: Option<serde_json::Value>,
}

impl Response {
    /// Empty 200 response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty response with `status`.
    pub fn with_status_code(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// `text/plain` response.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new()
            .with_header(CONTENT_TYPE.as_str(), "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    /// `application/json` response.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, SerializationError> {
        let body = serde_json::to_vec(value).map_err(|e| SerializationError::new(e.to_string()))?;
        Ok(Self::new()
            .with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_body(body))
    }

    /// Structured failure response for `err`, with `Allow` on 405.
    pub fn from_error(err: &DyneError) -> Self {
        let mut resp = Self::json(&err.to_body())
            .unwrap_or_default()
            .with_status(err.status_code());
        if let DyneError::MethodNotAllowed { allowed, .. } = err {
            resp = resp.with_header(ALLOW.as_str(), &allowed.to_string());
        }
        resp
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Appends a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.append_header(name, value);
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Attaches an object for an output stage to encode.
    #[must_use]
    pub fn with_object(mut self, object: serde_json::Value) -> Self {
        self.object = Some(object);
        self
    }

    /// Serializes `value` and attaches it as the response object.
    pub fn set_object<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializationError> {
        let value = serde_json::to_value(value).map_err(|e| SerializationError::new(e.to_string()))?;
        self.object = Some(value);
        Ok(())
    }

    /// Status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Headers, mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Appends a header. Invalid names or values are ignored.
    pub fn append_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
    }

    /// Replaces a header. Invalid names or values are ignored.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.insert(name, value);
        }
    }

    /// Body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// The attached object, if any.
    pub fn object(&self) -> Option<&serde_json::Value> {
        self.object.as_ref()
    }

    /// Detaches the object.
    pub fn take_object(&mut self) -> Option<serde_json::Value> {
        self.object.take()
    }

    /// Converts into an `http::Response` for the transport.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut resp = http::Response::new(Full::new(self.body));
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;
        resp
    }
}
