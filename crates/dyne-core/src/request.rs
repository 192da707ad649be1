//! Inbound request.

use bytes::Bytes;
use dyne_router::{ParamValue, Params};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method, Uri, Version};
use serde::de::DeserializeOwned;

use crate::context::{RequestId, RequestState};
use crate::error::DyneError;
use crate::identity::User;

/// The route a request was matched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Registered route name.
    pub name: String,
    /// Template the route was registered with.
    pub template: String,
}

/// An inbound request with its body fully buffered.
///
/// Carries the converted path parameters, the request-scoped state, and the
/// authenticated user once the auth gate has run.
///
/// # Example
///
/// ```
/// use dyne_core::Request;
/// use http::Method;
///
/// let req = Request::new(Method::GET, "/search?q=rust&page=2".parse().unwrap())
///     .with_header("cookie", "theme=dark; lang=en");
///
/// assert_eq!(req.path(), "/search");
/// assert_eq!(req.query_pairs().unwrap()[0], ("q".to_string(), "rust".to_string()));
/// assert_eq!(req.cookie("lang"), Some("en".to_string()));
/// ```
#[derive(Debug)]
pub struct Request {
    id: RequestId,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    params: Params,
    state: RequestState,
    user: Option<User>,
    route: Option<RouteInfo>,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            id: RequestId::new(),
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: Params::new(),
            state: RequestState::new(),
            user: None,
            route: None,
        }
    }

    /// Converts a buffered `http::Request`.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            ..Self::new(Method::GET, Uri::default())
        }
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Unique id for log correlation.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full request target.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Path component of the target.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request headers, mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `Content-Type` without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header(CONTENT_TYPE.as_str())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
    }

    /// Buffered body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<&str, DyneError> {
        std::str::from_utf8(&self.body).map_err(|e| DyneError::bad_request(format!("body is not UTF-8: {e}")))
    }

    /// Body parsed as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, DyneError> {
        serde_json::from_slice(&self.body).map_err(|e| DyneError::bad_request(format!("invalid JSON body: {e}")))
    }

    /// Query string decoded into ordered pairs.
    pub fn query_pairs(&self) -> Result<Vec<(String, String)>, DyneError> {
        serde_urlencoded::from_str(self.query().unwrap_or_default())
            .map_err(|e| DyneError::bad_request(format!("invalid query string: {e}")))
    }

    /// URL-encoded form body decoded into ordered pairs.
    pub fn form_pairs(&self) -> Result<Vec<(String, String)>, DyneError> {
        serde_urlencoded::from_bytes(&self.body)
            .map_err(|e| DyneError::bad_request(format!("invalid form body: {e}")))
    }

    /// Cookies from every `Cookie` header, in order.
    pub fn cookies(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for value in self.headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            for pair in value.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    out.push((name.trim().to_string(), value.trim().trim_matches('"').to_string()));
                }
            }
        }
        out
    }

    /// One cookie by name.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().into_iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Converted path parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// One path parameter by name.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Sets the path parameters. Called by the dispatcher after matching.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Request-scoped state.
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Request-scoped state, mutably.
    pub fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    /// Shorthand for a value injected by an input stage.
    pub fn injected<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.state.injected(key)
    }

    /// Authenticated user, if the auth gate accepted the request.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Sets the authenticated user.
    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    /// The matched route, once dispatched.
    pub fn route(&self) -> Option<&RouteInfo> {
        self.route.as_ref()
    }

    /// Records the matched route.
    pub fn set_route(&mut self, route: RouteInfo) {
        self.route = Some(route);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_keeps_parts() {
        let http_req = http::Request::builder()
            .method(Method::POST)
            .uri("/items?x=1")
            .header("content-type", "application/json; charset=utf-8")
            .body(Bytes::from_static(br#"{"a":1}"#))
            .unwrap();
        let req = Request::from_http(http_req);
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.path(), "/items");
        assert_eq!(req.query(), Some("x=1"));
        assert_eq!(req.content_type().as_deref(), Some("application/json"));
        let v: serde_json::Value = req.json().unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_form_and_query_decoding() {
        let req = Request::new(Method::POST, "/f?name=a%20b".parse().unwrap()).with_body("x=1&y=hello+world");
        assert_eq!(req.query_pairs().unwrap(), vec![("name".into(), "a b".into())]);
        assert_eq!(
            req.form_pairs().unwrap(),
            vec![("x".into(), "1".into()), ("y".into(), "hello world".into())]
        );
    }

    #[test]
    fn test_invalid_json_is_bad_request() {
        let req = Request::new(Method::POST, "/".parse().unwrap()).with_body("{nope");
        let err = req.json::<serde_json::Value>().unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_cookies_across_headers() {
        let req = Request::new(Method::GET, "/".parse().unwrap())
            .with_header("cookie", "a=1; b=\"two\"")
            .with_header("cookie", "c=3");
        assert_eq!(req.cookie("b"), Some("two".into()));
        assert_eq!(req.cookies().len(), 3);
    }
}
