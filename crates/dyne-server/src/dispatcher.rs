//! Request dispatch.
//!
//! ```text
//! request ──► resolve ──► pre-request hooks ──► auth gate ──► stages ──► handler
//!               │               │                   │            │
//!             404/405     hook response          401/403     4xx/500
//! ```
//!
//! Everything after resolution runs under the request timeout and a panic
//! boundary, so every request gets a response.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use dyne_core::{DyneError, Request, Response, RouteInfo};
use dyne_router::{ParamValue, Protocol};
use dyne_telemetry::logging::fields;
use dyne_telemetry::metrics::record_request;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::error::UrlError;
use crate::handler::HookOutcome;
use crate::metadata::MetadataAggregator;
use crate::registry::Registry;
use crate::route::{Endpoint, RouteEntry};
use crate::stream::StreamAccept;

const UNMATCHED: &str = "unmatched";

/// Routes requests through a registry snapshot.
///
/// Reads are lock-free: each request loads the current snapshot and keeps
/// it until it completes. [`Dispatcher::update`] serializes writers and
/// publishes a new snapshot.
///
/// ```rust
/// use dyne_core::{Request, Response};
/// use dyne_server::{handler, Dispatcher, Registry, Route};
/// use http::{Method, StatusCode};
///
/// # tokio_test::block_on(async {
/// let mut registry = Registry::new();
/// registry.register(Route::new("/", handler(|_req| async { Ok(Response::text("home")) }))).unwrap();
/// let dispatcher = Dispatcher::new(registry);
///
/// let resp = dispatcher.dispatch(Request::new(Method::GET, "/".parse().unwrap())).await;
/// assert_eq!(resp.body(), "home");
///
/// let resp = dispatcher.dispatch(Request::new(Method::POST, "/".parse().unwrap())).await;
/// assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
/// assert_eq!(resp.header("allow"), Some("GET"));
/// # });
/// ```
pub struct Dispatcher {
    registry: ArcSwap<Registry>,
    writer: Mutex<()>,
    config: ServerConfig,
}

impl Dispatcher {
    /// Creates a dispatcher with the default configuration.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, ServerConfig::default())
    }

    /// Creates a dispatcher.
    #[must_use]
    pub fn with_config(registry: Registry, config: ServerConfig) -> Self {
        Self {
            registry: ArcSwap::from_pointee(registry),
            writer: Mutex::new(()),
            config,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The current registry snapshot.
    pub fn snapshot(&self) -> Arc<Registry> {
        self.registry.load_full()
    }

    /// Changes the registry after startup.
    ///
    /// `change` runs on a copy of the current registry; the copy is
    /// published only if it returns `Ok`. Requests already in flight finish
    /// against the snapshot they started with.
    pub fn update<T, E>(&self, change: impl FnOnce(&mut Registry) -> Result<T, E>) -> Result<T, E> {
        let _writer = self.writer.lock();
        let mut next = Registry::clone(&self.registry.load());
        let out = change(&mut next)?;
        self.registry.store(Arc::new(next));
        Ok(out)
    }

    /// Builds a path to the named route.
    pub fn url_for<I, K, V>(&self, name: &str, params: I) -> Result<String, UrlError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        self.registry.load().url_for(name, params)
    }

    /// Documentation view of the current routes.
    pub fn metadata(&self) -> MetadataAggregator {
        self.registry.load().metadata()
    }

    /// Dispatches an HTTP request. Always produces a response.
    pub async fn dispatch(&self, req: Request) -> Response {
        let span = tracing::info_span!(
            "request",
            { fields::REQUEST_ID } = %req.id(),
            { fields::METHOD } = %req.method(),
            { fields::PATH } = req.path(),
            { fields::ROUTE } = tracing::field::Empty,
        );
        self.dispatch_inner(req).instrument(span).await
    }

    async fn dispatch_inner(&self, mut req: Request) -> Response {
        let started = Instant::now();
        let registry = self.registry.load_full();

        let (entry, params) = match registry.resolve(req.method(), req.path(), Protocol::Http) {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!(error_kind = err.error_kind(), "no route for request");
                let resp = Response::from_error(&err);
                record_request(UNMATCHED, resp.status().as_u16(), started.elapsed());
                return resp;
            }
        };

        let info = entry.info.clone();
        tracing::Span::current().record(fields::ROUTE, info.name.as_str());
        req.set_params(params);
        req.set_route(info.clone());

        let guarded = tokio::time::timeout(self.config.request_timeout(), invoke(&registry, &entry, req));
        let resp = match AssertUnwindSafe(guarded).catch_unwind().await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_elapsed)) => {
                tracing::warn!(timeout = ?self.config.request_timeout(), "request timed out");
                fail(&registry, Some(&info), &DyneError::Timeout)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                fail(
                    &registry,
                    Some(&info),
                    &DyneError::internal(format!("request handler panicked: {message}")),
                )
            }
        };

        let status = resp.status().as_u16();
        record_request(&info.name, status, started.elapsed());
        tracing::info!(
            { fields::STATUS } = status,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
        resp
    }

    /// Routes and authorizes a stream request.
    ///
    /// Stream hooks run first, then the auth gate. On success the caller
    /// completes the WebSocket handshake and runs the returned
    /// [`StreamAccept`]; otherwise the response explains the refusal (404,
    /// 405, a hook's response, 401, 403).
    pub async fn accept_stream(&self, mut req: Request) -> Result<StreamAccept, Response> {
        let registry = self.registry.load_full();
        let (entry, params) = registry
            .resolve(req.method(), req.path(), Protocol::Stream)
            .map_err(|err| {
                tracing::debug!(path = req.path(), error_kind = err.error_kind(), "no stream route for request");
                Response::from_error(&err)
            })?;

        req.set_params(params);
        req.set_route(entry.info.clone());

        let mut early = Response::new();
        for hook in registry.stream_hooks() {
            if hook.before(&mut req, &mut early).await == HookOutcome::Respond {
                tracing::debug!(path = req.path(), status = early.status().as_u16(), "upgrade refused by stream hook");
                return Err(early);
            }
        }
        if let Some(gate) = &entry.gate {
            gate.check(&mut req).await.map_err(|rejection| rejection.response)?;
        }

        match &entry.endpoint {
            Endpoint::Stream(handler) => Ok(StreamAccept {
                request: req,
                handler: Arc::clone(handler),
                capacity: self.config.stream_channel_capacity(),
            }),
            Endpoint::Http(_) => Err(fail(
                &registry,
                Some(&entry.info),
                &DyneError::internal("HTTP route resolved for a stream request"),
            )),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry.load())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn invoke(registry: &Registry, entry: &RouteEntry, mut req: Request) -> Response {
    let mut early = Response::new();
    for hook in registry.request_hooks() {
        if hook.before(&mut req, &mut early).await == HookOutcome::Respond {
            tracing::debug!("request answered by pre-request hook");
            return early;
        }
    }

    if let Some(gate) = &entry.gate {
        if let Err(rejection) = gate.check(&mut req).await {
            return carry_headers(&early, rejection.response);
        }
    }

    let Endpoint::Http(handler) = &entry.endpoint else {
        return fail(
            registry,
            Some(&entry.info),
            &DyneError::internal("stream route resolved for an HTTP request"),
        );
    };
    let resp = match entry.chain.execute(req, |req| handler(req)).await {
        Ok(resp) => resp,
        Err(err) => fail(registry, Some(&entry.info), &err),
    };
    carry_headers(&early, resp)
}

/// Renders a failure, logging server defects and reporting them to the
/// error hook.
fn fail(registry: &Registry, route: Option<&RouteInfo>, err: &DyneError) -> Response {
    if err.is_server_fault() {
        tracing::error!(
            fault = "server",
            error_kind = err.error_kind(),
            error = ?err,
            "request failed"
        );
        registry.report(route, err);
    } else {
        tracing::debug!(fault = "client", error_kind = err.error_kind(), error = %err, "request rejected");
    }
    Response::from_error(err)
}

/// Copies headers a pre-request hook set onto the final response, unless
/// the response sets them itself.
fn carry_headers(from: &Response, mut into: Response) -> Response {
    for name in from.headers().keys() {
        if into.headers().contains_key(name) {
            continue;
        }
        for value in from.headers().get_all(name) {
            into.headers_mut().append(name.clone(), value.clone());
        }
    }
    into
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
