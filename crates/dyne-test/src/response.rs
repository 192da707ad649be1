//! Captured responses and assertions on them.

use bytes::Bytes;
use dyne_core::{ErrorBody, FieldErrors, Response};
use http::{header, HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::TestError;

/// What the dispatcher answered, detached from the request.
///
/// Assertion helpers return `&Self` so checks chain:
///
/// ```rust,ignore
/// client.get("/items").send().await
///     .assert_status(StatusCode::METHOD_NOT_ALLOWED)
///     .assert_header("allow", "POST");
/// ```
#[derive(Debug, Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Captures a dispatcher response.
    pub fn from_response(resp: &Response) -> Self {
        Self {
            status: resp.status(),
            headers: resp.headers().clone(),
            body: resp.body().clone(),
        }
    }

    /// Response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status as a number.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// All response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header as text; `None` when absent or not visible ASCII.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers.get(name.as_ref()).and_then(|v| v.to_str().ok())
    }

    /// `Content-Type`, when set.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// The `WWW-Authenticate` challenge of a 401.
    #[must_use]
    pub fn challenge(&self) -> Option<&str> {
        self.header(header::WWW_AUTHENTICATE.as_str())
    }

    /// Methods listed in the `Allow` header of a 405.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<String> {
        self.header(header::ALLOW.as_str())
            .map(|v| v.split(',').map(|m| m.trim().to_string()).filter(|m| !m.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Decodes the body as JSON into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decodes the body as untyped JSON.
    pub fn json_value(&self) -> Result<serde_json::Value, TestError> {
        self.json()
    }

    /// The structured failure body, if this is one.
    #[must_use]
    pub fn error_body(&self) -> Option<ErrorBody> {
        serde_json::from_slice(&self.body).ok()
    }

    /// The `error_kind` of a structured failure body.
    #[must_use]
    pub fn error_kind(&self) -> Option<String> {
        self.error_body().map(|b| b.error_kind)
    }

    /// Per-field messages of a validation or serialization failure.
    #[must_use]
    pub fn field_errors(&self) -> Option<FieldErrors> {
        let body = self.error_body()?;
        serde_json::from_value(body.detail.get("fields")?.clone()).ok()
    }

    /// Asserts the status.
    ///
    /// # Panics
    ///
    /// When the status differs; the message includes the body.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "expected status {expected}, got {} with body {:?}",
            self.status, self.body
        );
        self
    }

    /// Asserts a header value.
    ///
    /// # Panics
    ///
    /// When the header is missing or has another value.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        match self.header(name) {
            Some(actual) => assert_eq!(actual, expected.as_ref(), "header '{name}'"),
            None => panic!("header '{name}' not found in {:?}", self.headers),
        }
        self
    }

    /// Asserts the failure kind.
    ///
    /// # Panics
    ///
    /// When the body is not a failure body of that kind.
    pub fn assert_error_kind(&self, expected: &str) -> &Self {
        assert_eq!(self.error_kind().as_deref(), Some(expected), "body {:?}", self.body);
        self
    }

    /// Asserts the body text.
    ///
    /// # Panics
    ///
    /// When the body is not UTF-8 or differs from `expected`.
    pub fn assert_body_eq(&self, expected: impl AsRef<str>) -> &Self {
        match self.text() {
            Ok(body) => assert_eq!(body, expected.as_ref(), "body mismatch"),
            Err(e) => panic!("{e}"),
        }
        self
    }
}
