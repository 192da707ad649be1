//! HTTP/1.1 server.
//!
//! Accepts TCP connections, serves them with hyper and hands every request
//! to the [`Dispatcher`]. WebSocket upgrade requests are routed to stream
//! routes; the handshake completes only once routing and auth have passed.
//!
//! # Example
//!
//! ```rust,ignore
//! use dyne_server::{Registry, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new();
//!     let config = ServerConfig::builder().bind("0.0.0.0:8080").build();
//!     Server::new(registry, config).run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use dyne_core::{DyneError, Request, Response};
use http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, UPGRADE};
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::registry::Registry;
use crate::shutdown::shutdown_on_signal;
use crate::stream::{accept_key, is_upgrade_request};

/// Response type handed back to hyper.
pub type HttpResponse = http::Response<Full<Bytes>>;

/// The dyne HTTP server.
#[derive(Debug, Clone)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Creates a server for a registry.
    #[must_use]
    pub fn new(registry: Registry, config: ServerConfig) -> Self {
        Self::with_dispatcher(Arc::new(Dispatcher::with_config(registry, config)))
    }

    /// Creates a server around an existing dispatcher, so the caller can
    /// keep updating its registry while the server runs.
    #[must_use]
    pub fn with_dispatcher(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher requests go through.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(shutdown_on_signal()).await
    }

    /// Binds the configured address and serves until `shutdown` is
    /// cancelled.
    pub async fn run_with_shutdown(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let addr = self.dispatcher.config().socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("failed to bind to {addr}: {e}")))?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from `listener` until `shutdown` is cancelled,
    /// then waits up to the shutdown timeout for open connections and
    /// stream sessions to finish.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), ServerError> {
        tracing::info!(addr = %listener.local_addr()?, "server listening");
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let conn = Connection {
                            dispatcher: Arc::clone(&self.dispatcher),
                            tracker: tracker.clone(),
                            shutdown: shutdown.clone(),
                        };
                        tracker.spawn(conn.serve(stream, remote_addr));
                    }
                    Err(err) => tracing::error!(error = %err, "failed to accept connection"),
                },
                () = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        tracker.close();
        let timeout = self.dispatcher.config().shutdown_timeout();
        tracing::info!(?timeout, open = tracker.len(), "waiting for open connections");
        if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
            tracing::warn!(open = tracker.len(), "shutdown timeout reached with connections still open");
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

/// Per-connection state.
#[derive(Clone)]
struct Connection {
    dispatcher: Arc<Dispatcher>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Connection {
    async fn serve(self, stream: TcpStream, remote_addr: SocketAddr) {
        let shutdown = self.shutdown.clone();
        let service = service_fn(move |req: http::Request<Incoming>| {
            let conn = self.clone();
            async move { Ok::<_, Infallible>(conn.handle(req).await) }
        });

        let conn = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .with_upgrades();
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.cancelled() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };
        if let Err(err) = result {
            tracing::debug!(%remote_addr, error = %err, "connection closed with error");
        }
    }

    async fn handle(&self, req: http::Request<Incoming>) -> HttpResponse {
        if is_upgrade_request(req.headers()) {
            return self.upgrade(req).await.into_http();
        }

        let config = self.dispatcher.config();
        let (parts, body) = req.into_parts();
        let collected = tokio::time::timeout(
            config.request_timeout(),
            Limited::new(body, config.max_body_bytes()).collect(),
        )
        .await;

        let body = match collected {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(err)) if err.is::<LengthLimitError>() => {
                tracing::debug!(limit = config.max_body_bytes(), "request body too large");
                return reject(StatusCode::PAYLOAD_TOO_LARGE, "request body exceeds the configured limit");
            }
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "failed to read request body");
                return reject(StatusCode::BAD_REQUEST, "failed to read request body");
            }
            Err(_) => {
                tracing::warn!("request body collection timed out");
                return reject(StatusCode::REQUEST_TIMEOUT, "request body collection timed out");
            }
        };

        let req = Request::from_http(http::Request::from_parts(parts, body));
        self.dispatcher.dispatch(req).await.into_http()
    }

    async fn upgrade(&self, mut req: http::Request<Incoming>) -> Response {
        let key = match accept_key(req.headers()) {
            Ok(key) => key,
            Err(reason) => return Response::from_error(&DyneError::bad_request(reason)),
        };

        let on_upgrade = hyper::upgrade::on(&mut req);
        let (parts, _body) = req.into_parts();
        let accept = match self
            .dispatcher
            .accept_stream(Request::from_http(http::Request::from_parts(parts, Bytes::new())))
            .await
        {
            Ok(accept) => accept,
            Err(refusal) => return refusal,
        };

        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let ws = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
                    accept.run(ws, &shutdown).await;
                }
                Err(err) => tracing::warn!(error = %err, "stream upgrade failed"),
            }
        });

        Response::with_status_code(StatusCode::SWITCHING_PROTOCOLS)
            .with_header(CONNECTION.as_str(), "Upgrade")
            .with_header(UPGRADE.as_str(), "websocket")
            .with_header(SEC_WEBSOCKET_ACCEPT.as_str(), &key)
    }
}

fn reject(status: StatusCode, detail: &str) -> HttpResponse {
    Response::from_error(&DyneError::http(status, detail)).into_http()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::route::Route;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn start(registry: Registry, config: ServerConfig) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = Server::new(registry, config);
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            server.serve(listener, token).await.unwrap();
        });
        (addr, shutdown, task)
    }

    async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    fn echo_registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                Route::new("/echo", handler(|req| async move { Ok(Response::text(req.text().unwrap_or_default())) }))
                    .methods(dyne_router::MethodSet::new().post()),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_serves_requests_over_tcp() {
        let (addr, shutdown, task) = start(echo_registry(), ServerConfig::default()).await;

        let raw = "POST /echo HTTP/1.1\r\nhost: x\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello";
        let out = roundtrip(addr, raw).await;
        assert!(out.starts_with("HTTP/1.1 200"), "{out}");
        assert!(out.ends_with("hello"), "{out}");

        let out = roundtrip(addr, "GET /missing HTTP/1.1\r\nhost: x\r\nconnection: close\r\n\r\n").await;
        assert!(out.starts_with("HTTP/1.1 404"), "{out}");

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let config = ServerConfig::builder().max_body_bytes(4).build();
        let (addr, shutdown, task) = start(echo_registry(), config).await;

        let raw = "POST /echo HTTP/1.1\r\nhost: x\r\ncontent-length: 10\r\nconnection: close\r\n\r\n0123456789";
        let out = roundtrip(addr, raw).await;
        assert!(out.starts_with("HTTP/1.1 413"), "{out}");

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_handshake_is_rejected() {
        let mut registry = Registry::new();
        registry
            .register(Route::stream("/ws", crate::handler::stream_handler(|_session| async {})))
            .unwrap();
        let (addr, shutdown, task) = start(registry, ServerConfig::default()).await;

        let raw = "GET /ws HTTP/1.1\r\nhost: x\r\nconnection: Upgrade, close\r\nupgrade: websocket\r\nsec-websocket-version: 8\r\n\r\n";
        let out = roundtrip(addr, raw).await;
        assert!(out.starts_with("HTTP/1.1 400"), "{out}");

        shutdown.cancel();
        task.await.unwrap();
    }
}
