//! # dyne-server
//!
//! Route registration, dispatch and the HTTP server for dyne.
//!
//! - [`Registry`] holds routes, hooks and the error hook, and answers
//!   reverse lookups and metadata exports.
//! - [`Dispatcher`] runs a request through routing, pre-request hooks, the
//!   route's auth gate, its stage chain and its handler.
//! - [`StreamSession`] is the handler-side view of a persistent (WebSocket)
//!   stream.
//! - [`Server`] serves a dispatcher over HTTP/1.1 with graceful shutdown.
//!
//! ## Example
//!
//! ```rust
//! use dyne_core::{Request, Response};
//! use dyne_server::{handler, Dispatcher, Registry, Route};
//! use http::Method;
//!
//! # tokio_test::block_on(async {
//! let mut registry = Registry::new();
//! registry
//!     .register(Route::new("/users/{id:int}", handler(|req| async move {
//!         let id = req.params().get_int("id").unwrap_or_default();
//!         Ok(Response::text(format!("user {id}")))
//!     })).name("user"))
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(registry);
//! assert_eq!(dispatcher.url_for("user", [("id", 7)]).unwrap(), "/users/7");
//!
//! let resp = dispatcher.dispatch(Request::new(Method::GET, "/users/7".parse().unwrap())).await;
//! assert_eq!(resp.body(), "user 7");
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod metadata;
pub mod registry;
pub mod route;
pub mod server;
pub mod shutdown;
pub mod stream;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use dispatcher::Dispatcher;
pub use error::{RegistrationError, ServerError, StreamError, UrlError};
pub use handler::{
    handler, stream_handler, ErrorHook, ErrorReport, HandlerFuture, HookOutcome, HttpHandler, RequestHook,
    StreamHandler, StreamHook,
};
pub use metadata::{MetadataAggregator, RouteMetadata};
pub use registry::Registry;
pub use route::{Route, RouteHandle};
pub use server::{HttpResponse, Server};
pub use shutdown::shutdown_on_signal;
pub use stream::{accept_key, is_upgrade_request, Message, StreamAccept, StreamSession};
