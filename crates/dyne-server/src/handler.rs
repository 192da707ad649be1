//! Type-erased handlers and pre-request hooks.
//!
//! Handlers are stored behind `Arc<dyn Fn>` so routes can be cloned into
//! registry snapshots. [`handler`] and [`stream_handler`] erase ordinary
//! async functions:
//!
//! ```rust
//! use dyne_core::{DyneError, Request, Response};
//! use dyne_server::handler;
//!
//! async fn hello(req: Request) -> Result<Response, DyneError> {
//!     let name = req.params().get_str("name").unwrap_or("world").to_string();
//!     Ok(Response::text(format!("hello, {name}!")))
//! }
//!
//! let erased = handler(hello);
//! ```

use std::future::Future;
use std::sync::Arc;

use dyne_core::{BoxFuture, DyneError, Request, Response, RouteInfo};

use crate::stream::StreamSession;

/// Future returned by an erased HTTP handler.
pub type HandlerFuture = BoxFuture<'static, Result<Response, DyneError>>;

/// An erased HTTP handler.
pub type HttpHandler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

/// An erased stream handler. It owns the session until it returns.
pub type StreamHandler = Arc<dyn Fn(StreamSession) -> BoxFuture<'static, ()> + Send + Sync>;

/// Observer for server-side failures, see [`ErrorReport`].
pub type ErrorHook = Arc<dyn Fn(&ErrorReport<'_>) + Send + Sync>;

/// Erases an async HTTP handler.
pub fn handler<F, Fut>(f: F) -> HttpHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, DyneError>> + Send + 'static,
{
    Arc::new(move |req| -> HandlerFuture { Box::pin(f(req)) })
}

/// Erases an async stream handler.
pub fn stream_handler<F, Fut>(f: F) -> StreamHandler
where
    F: Fn(StreamSession) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |session| -> BoxFuture<'static, ()> { Box::pin(f(session)) })
}

/// What a pre-request hook wants the dispatcher to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Run the next hook, then the route.
    Continue,
    /// Stop: send the hook's response and skip the route entirely.
    Respond,
}

/// Runs before every dispatched HTTP request, in registration order.
///
/// The hook sees the matched request and a response it may write to.
/// Headers it sets are carried onto the final response unless the route
/// sets the same header; returning [`HookOutcome::Respond`] sends the
/// hook's response as-is.
///
/// Plain closures are hooks:
///
/// ```rust
/// use dyne_core::{Request, Response};
/// use dyne_server::{HookOutcome, Registry};
///
/// let mut registry = Registry::new();
/// registry.before_request(|_req: &mut Request, resp: &mut Response| {
///     resp.set_header("x-served-by", "dyne");
///     HookOutcome::Continue
/// });
/// ```
pub trait RequestHook: Send + Sync + 'static {
    /// Inspects the request before its route runs.
    fn before<'a>(&'a self, req: &'a mut Request, resp: &'a mut Response) -> BoxFuture<'a, HookOutcome>;
}

impl<F> RequestHook for F
where
    F: Fn(&mut Request, &mut Response) -> HookOutcome + Send + Sync + 'static,
{
    fn before<'a>(&'a self, req: &'a mut Request, resp: &'a mut Response) -> BoxFuture<'a, HookOutcome> {
        let outcome = self(req, resp);
        Box::pin(async move { outcome })
    }
}

/// Runs before every stream acceptance, in registration order.
///
/// Stream hooks see the upgrade request ahead of the auth gate and the
/// handshake. Returning [`HookOutcome::Respond`] refuses the upgrade with
/// the hook's response; headers set on `resp` otherwise go nowhere, since
/// an accepted stream answers with `101 Switching Protocols`.
///
/// ```rust
/// use dyne_core::{Request, Response};
/// use dyne_server::{HookOutcome, Registry};
/// use http::StatusCode;
///
/// let mut registry = Registry::new();
/// registry.before_stream(|req: &mut Request, resp: &mut Response| {
///     if req.header("origin") == Some("https://evil.example") {
///         resp.set_status(StatusCode::FORBIDDEN);
///         return HookOutcome::Respond;
///     }
///     HookOutcome::Continue
/// });
/// ```
pub trait StreamHook: Send + Sync + 'static {
    /// Inspects the upgrade request before the stream is accepted.
    fn before<'a>(&'a self, req: &'a mut Request, resp: &'a mut Response) -> BoxFuture<'a, HookOutcome>;
}

impl<F> StreamHook for F
where
    F: Fn(&mut Request, &mut Response) -> HookOutcome + Send + Sync + 'static,
{
    fn before<'a>(&'a self, req: &'a mut Request, resp: &'a mut Response) -> BoxFuture<'a, HookOutcome> {
        let outcome = self(req, resp);
        Box::pin(async move { outcome })
    }
}

/// A server-side failure, as seen by the error hook.
#[derive(Debug)]
pub struct ErrorReport<'a> {
    /// The route being served, if one matched.
    pub route: Option<&'a RouteInfo>,
    /// What went wrong.
    pub error: &'a DyneError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[tokio::test]
    async fn test_erased_handler_runs() {
        let h = handler(|req: Request| async move { Ok(Response::text(req.path().to_string())) });
        let resp = h(Request::new(Method::GET, "/ping".parse().unwrap())).await.unwrap();
        assert_eq!(resp.body(), "/ping");
    }

    #[tokio::test]
    async fn test_closure_hook() {
        let hook = |req: &mut Request, resp: &mut Response| {
            resp.set_header("x-path", req.path());
            HookOutcome::Continue
        };
        let mut req = Request::new(Method::GET, "/a".parse().unwrap());
        let mut resp = Response::new();
        assert_eq!(RequestHook::before(&hook, &mut req, &mut resp).await, HookOutcome::Continue);
        assert_eq!(resp.header("x-path"), Some("/a"));
    }
}
