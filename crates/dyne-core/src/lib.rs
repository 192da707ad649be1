//! # Dyne Core
//!
//! Core types shared by every dyne crate.
//!
//! ## Overview
//!
//! - [`Request`] / [`Response`]: buffered request and response, with path
//!   parameters, request-scoped state and the authenticated user
//! - [`RequestState`]: per-request typed extensions and injected values
//! - [`User`]: opaque identity produced by an auth backend
//! - [`DyneError`]: request-time error taxonomy and structured failure body
//! - [`BoxFuture`]: the boxed future returned by handlers, hooks, stages and
//!   auth backends

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;
mod request;
mod response;

use std::future::Future;
use std::pin::Pin;

pub use context::{RequestId, RequestState};
pub use error::{DyneError, DyneResult, ErrorBody, FieldErrors, SerializationError, ValidationError};
pub use identity::User;
pub use request::{Request, RouteInfo};
pub use response::Response;

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
