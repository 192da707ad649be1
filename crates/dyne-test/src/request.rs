//! Building dispatcher requests from test code.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use dyne_core::Request;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde::Serialize;

use crate::error::TestError;

/// Builder for requests sent through a [`TestClient`](crate::TestClient).
///
/// Invalid input (a bad header, an unserializable body) is remembered and
/// reported by [`build`](Self::build), so chains stay fluent.
#[must_use]
#[derive(Debug)]
pub struct TestRequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    error: Option<TestError>,
}

impl TestRequestBuilder {
    /// A request for `uri` (path and optional query).
    pub fn new(method: Method, uri: impl AsRef<str>) -> Self {
        Self {
            method,
            uri: uri.as_ref().to_string(),
            headers: HeaderMap::new(),
            body: None,
            error: None,
        }
    }

    /// Sets a header, replacing any previous value.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = HeaderName::try_from(name.as_ref());
        let value = HeaderValue::try_from(value.as_ref());
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            (Err(e), _) => self.fail(format!("invalid header name: {e}")),
            (_, Err(e)) => self.fail(format!("invalid header value: {e}")),
        }
        self
    }

    /// `Content-Type`.
    pub fn content_type(self, content_type: impl AsRef<str>) -> Self {
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header(header::AUTHORIZATION.as_str(), format!("Bearer {}", token.as_ref()))
    }

    /// `Authorization: Basic <base64(user:pass)>`.
    pub fn basic_auth(self, username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let encoded = STANDARD.encode(format!("{}:{}", username.as_ref(), password.as_ref()));
        self.header(header::AUTHORIZATION.as_str(), format!("Basic {encoded}"))
    }

    /// Raw body bytes; no content type is implied.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the request body as JSON, with its content type.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Some(Bytes::from(bytes)),
            Err(e) => self.fail(format!("JSON body: {e}")),
        }
        self.content_type("application/json")
    }

    /// Sets the request body as form-urlencoded, with its content type.
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => self.body = Some(Bytes::from(encoded)),
            Err(e) => self.fail(format!("form body: {e}")),
        }
        self.content_type("application/x-www-form-urlencoded")
    }

    /// The method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target as given.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Two identical builders, for a request that is sent again (as in a
    /// challenge round trip). Fails with the remembered build error.
    pub fn fork(self) -> Result<(Self, Self), TestError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let copy = Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            error: None,
        };
        Ok((self, copy))
    }

    /// Finishes the request, or reports the first invalid input.
    pub fn build(self) -> Result<Request, TestError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e| TestError::RequestBuild(format!("invalid URI: {e}")))?;

        let mut req = Request::new(self.method, uri).with_body(self.body.unwrap_or_default());
        *req.headers_mut() = self.headers;
        Ok(req)
    }

    fn fail(&mut self, message: String) {
        self.error.get_or_insert(TestError::RequestBuild(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_sets_content_type() {
        let req = TestRequestBuilder::new(Method::POST, "/users")
            .json(&json!({"name": "Alice"}))
            .build()
            .unwrap();
        assert_eq!(req.content_type().as_deref(), Some("application/json"));
        assert_eq!(req.json::<serde_json::Value>().unwrap()["name"], "Alice");
    }

    #[test]
    fn test_form_body() {
        let req = TestRequestBuilder::new(Method::POST, "/login")
            .form(&[("user", "a b"), ("pass", "x&y")])
            .build()
            .unwrap();
        assert_eq!(req.text().unwrap(), "user=a+b&pass=x%26y");
    }

    #[test]
    fn test_basic_auth_header() {
        let req = TestRequestBuilder::new(Method::GET, "/")
            .basic_auth("Aladdin", "open sesame")
            .build()
            .unwrap();
        assert_eq!(req.header("authorization"), Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="));
    }

    #[test]
    fn test_invalid_header_surfaces_on_build() {
        let err = TestRequestBuilder::new(Method::GET, "/")
            .header("bad header", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, TestError::RequestBuild(_)));
    }

    #[test]
    fn test_invalid_uri() {
        assert!(TestRequestBuilder::new(Method::GET, "http://[::1").build().is_err());
    }

    #[test]
    fn test_fork_copies_everything() {
        let (a, b) = TestRequestBuilder::new(Method::PUT, "/items/1?x=1")
            .header("x-trace", "7")
            .body("payload")
            .fork()
            .unwrap();
        assert_eq!(b.method(), &Method::PUT);
        assert_eq!(b.uri(), "/items/1?x=1");
        let (a, b) = (a.build().unwrap(), b.build().unwrap());
        assert_eq!(a.header("x-trace"), b.header("x-trace"));
        assert_eq!(a.text().unwrap(), "payload");
        assert_eq!(b.text().unwrap(), "payload");

        assert!(TestRequestBuilder::new(Method::GET, "/").header("bad header", "x").fork().is_err());
    }
}
