//! In-memory test client.

use std::sync::Arc;

use dyne_auth::DigestChallenge;
use dyne_server::{Dispatcher, Registry, ServerConfig};
use http::{header, Method, StatusCode};

use crate::error::TestError;
use crate::request::TestRequestBuilder;
use crate::response::TestResponse;
use crate::stream::TestStream;

const DIGEST_CNONCE: &str = "0a4f113b";

/// Sends requests straight into a [`Dispatcher`], without a socket.
///
/// Requests take the same path as over the network: routing, hooks, auth,
/// stages and handler, with the dispatcher's timeout and panic handling.
///
/// # Example
///
/// ```rust
/// use dyne_core::Response;
/// use dyne_server::{handler, Registry, Route};
/// use dyne_test::TestClient;
///
/// # tokio_test::block_on(async {
/// let mut registry = Registry::new();
/// registry.register(Route::new("/ping", handler(|_req| async { Ok(Response::text("pong")) }))).unwrap();
///
/// let client = TestClient::new(registry);
/// client.get("/ping").send().await.assert_body_eq("pong");
/// client.post("/ping").send().await.assert_error_kind("method_not_allowed");
/// # });
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestClient {
    dispatcher: Arc<Dispatcher>,
    default_headers: Vec<(String, String)>,
}

impl TestClient {
    /// Creates a client over a registry with the default configuration.
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, ServerConfig::default())
    }

    /// Creates a client over a registry.
    pub fn with_config(registry: Registry, config: ServerConfig) -> Self {
        Self::from_dispatcher(Arc::new(Dispatcher::with_config(registry, config)))
    }

    /// Creates a client sharing an existing dispatcher.
    pub fn from_dispatcher(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            default_headers: Vec::new(),
        }
    }

    /// The dispatcher requests go to.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Adds a header sent with every request and stream.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// `GET uri`.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// `POST uri`.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// `PUT uri`.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// `PATCH uri`.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PATCH, uri)
    }

    /// `DELETE uri`.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// A request with any method, carrying the default headers.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        let builder = self
            .default_headers
            .iter()
            .fold(TestRequestBuilder::new(method, uri), |b, (name, value)| b.header(name, value));
        TestClientRequest { client: self, builder }
    }

    /// A stream handshake for `uri`; finish with
    /// [`connect`](TestClientRequest::connect).
    pub fn stream(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    async fn dispatch(&self, builder: TestRequestBuilder) -> Result<TestResponse, TestError> {
        let resp = self.dispatcher.dispatch(builder.build()?).await;
        Ok(TestResponse::from_response(&resp))
    }
}

/// One pending request or stream handshake.
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl TestClientRequest<'_> {
    fn map(mut self, f: impl FnOnce(TestRequestBuilder) -> TestRequestBuilder) -> Self {
        self.builder = f(self.builder);
        self
    }

    /// See [`TestRequestBuilder::header`].
    pub fn header(self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.map(|b| b.header(name, value))
    }

    /// See [`TestRequestBuilder::content_type`].
    pub fn content_type(self, content_type: impl AsRef<str>) -> Self {
        self.map(|b| b.content_type(content_type))
    }

    /// `Authorization: Bearer <token>`.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.map(|b| b.bearer_token(token))
    }

    /// `Authorization: Basic <base64(user:pass)>`.
    pub fn basic_auth(self, username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        self.map(|b| b.basic_auth(username, password))
    }

    /// See [`TestRequestBuilder::body`].
    pub fn body(self, body: impl Into<bytes::Bytes>) -> Self {
        self.map(|b| b.body(body))
    }

    /// See [`TestRequestBuilder::json`].
    pub fn json<T: serde::Serialize + ?Sized>(self, value: &T) -> Self {
        self.map(|b| b.json(value))
    }

    /// See [`TestRequestBuilder::form`].
    pub fn form<T: serde::Serialize + ?Sized>(self, value: &T) -> Self {
        self.map(|b| b.form(value))
    }

    /// Dispatches the request.
    ///
    /// # Panics
    ///
    /// When the request cannot be built; use [`try_send`](Self::try_send)
    /// to test that case.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(resp) => resp,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Dispatches the request, reporting build failures.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        self.client.dispatch(self.builder).await
    }

    /// Runs the digest handshake: sends the request, answers a
    /// `Digest` challenge with `username` and `password`, and returns the
    /// second response. Any other first response is returned as is.
    pub async fn send_digest(self, username: &str, password: &str) -> Result<TestResponse, TestError> {
        let (first, retry) = self.builder.fork()?;
        let resp = self.client.dispatch(first).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        let Some(challenge) = resp.challenge().filter(|c| c.starts_with("Digest")) else {
            return Ok(resp);
        };
        let challenge = DigestChallenge::parse(challenge).map_err(|e| TestError::RequestBuild(format!("digest challenge: {e}")))?;
        let authorization = challenge.respond(retry.method(), retry.uri(), username, password, 1, DIGEST_CNONCE);
        self.client
            .dispatch(retry.header(header::AUTHORIZATION.as_str(), authorization))
            .await
    }

    /// Opens a stream on the route, as a WebSocket client would.
    ///
    /// A refusal (no such stream route, failed auth) comes back as
    /// [`TestError::StreamRefused`] carrying the response.
    pub async fn connect(self) -> Result<TestStream, TestError> {
        let req = self.builder.build()?;
        match self.client.dispatcher.accept_stream(req).await {
            Ok(accept) => Ok(TestStream::open(accept).await),
            Err(refusal) => Err(TestError::StreamRefused(Box::new(TestResponse::from_response(&refusal)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyne_core::Response;
    use dyne_server::{handler, Route};
    use serde_json::json;

    fn echo_client() -> TestClient {
        let mut registry = Registry::new();
        registry
            .register(
                Route::new(
                    "/echo",
                    handler(|req| async move {
                        let body = json!({
                            "method": req.method().as_str(),
                            "content_type": req.content_type(),
                            "custom": req.header("x-custom"),
                            "body": req.text().unwrap_or_default(),
                        });
                        Ok(Response::json(&body)?)
                    }),
                )
                .methods(dyne_router::MethodSet::new().get().post().put().patch().delete()),
            )
            .unwrap();
        TestClient::new(registry)
    }

    #[tokio::test]
    async fn test_all_methods_reach_route() {
        let client = echo_client();
        for (builder, method) in [
            (client.get("/echo"), "GET"),
            (client.post("/echo"), "POST"),
            (client.put("/echo"), "PUT"),
            (client.patch("/echo"), "PATCH"),
            (client.delete("/echo"), "DELETE"),
        ] {
            let resp = builder.send().await;
            assert_eq!(resp.json_value().unwrap()["method"], method);
        }
    }

    #[tokio::test]
    async fn test_json_body_and_default_header() {
        let client = echo_client().with_default_header("x-custom", "default");
        let resp = client.post("/echo").json(&json!({"name": "Alice"})).send().await;
        resp.assert_status(StatusCode::OK);

        let body = resp.json_value().unwrap();
        assert_eq!(body["content_type"], "application/json");
        assert_eq!(body["custom"], "default");
        assert_eq!(body["body"], r#"{"name":"Alice"}"#);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        echo_client()
            .get("/nope")
            .send()
            .await
            .assert_status(StatusCode::NOT_FOUND)
            .assert_error_kind("route_not_found");
    }

    #[tokio::test]
    async fn test_build_error_is_reported() {
        let err = echo_client().get("/echo").header("x", "bad\nvalue").try_send().await.unwrap_err();
        assert!(matches!(err, TestError::RequestBuild(_)));
    }

    #[tokio::test]
    async fn test_digest_round_trip() {
        use dyne_auth::{AuthGate, DigestAuth, DigestConfig};

        let digest = DigestAuth::new(DigestConfig::default())
            .unwrap()
            .password(|user| async move { (user == "mufasa").then(|| "circle of life".to_string()) });
        let mut registry = Registry::new();
        registry
            .register(
                Route::new("/vault", handler(|_req| async { Ok(Response::text("gold")) }))
                    .auth(AuthGate::new(Arc::new(digest))),
            )
            .unwrap();
        let client = TestClient::new(registry);

        client.get("/vault").send().await.assert_status(StatusCode::UNAUTHORIZED);
        client
            .get("/vault")
            .send_digest("mufasa", "circle of life")
            .await
            .unwrap()
            .assert_body_eq("gold");
        client
            .get("/vault")
            .send_digest("mufasa", "wrong")
            .await
            .unwrap()
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
