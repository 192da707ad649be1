//! Radix tree path matcher with typed segment converters.
//!
//! Route templates are compiled once, at registration time, into a tree of
//! literal and placeholder segments. Each placeholder names a converter
//! (`{id:int}`); matching converts segments as it walks the tree, and a
//! segment the converter rejects simply rules that branch out.
//!
//! # Features
//!
//! - **Typed parameters**: `str`, `int`, `float`, `uuid` and catch-all `path`,
//!   plus custom converters via [`ConverterRegistry`]
//! - **Disambiguation**: `/items/{id:int}` and `/items/{name}` coexist
//! - **404 vs 405**: every matching template is considered before the
//!   method filter, and the allowed methods are reported
//! - **Reverse URLs**: [`PathTemplate::build`] formats a path that routes back
//!   to the same template
//!
//! # Example
//!
//! ```rust
//! use dyne_router::{MethodSet, Protocol, Resolution, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! let users = router.compile("/users").unwrap();
//! let user = router.compile("/users/{id:int}").unwrap();
//! router.insert(&users, MethodSet::new().get().post(), Protocol::Http, 1);
//! router.insert(&user, MethodSet::new().get(), Protocol::Http, 2);
//!
//! assert!(matches!(
//!     router.resolve(&Method::GET, "/users/7", Protocol::Http),
//!     Resolution::Matched(m) if *m.value == 2
//! ));
//! assert!(matches!(
//!     router.resolve(&Method::DELETE, "/users", Protocol::Http),
//!     Resolution::MethodNotAllowed { .. }
//! ));
//! ```
//!
//! # Architecture
//!
//! ```text
//!                    (root)
//!                      │
//!              ┌───────┴───────┐
//!              │               │
//!            "users"        "files"
//!              │               │
//!        ┌─────┴─────┐   "{rest:path}"
//!        │           │
//!    [GET,POST]  "{id:int}"
//!                    │
//!                  [GET]
//! ```

mod converter;
mod error;
mod methods;
mod node;
mod params;
mod router;
mod template;

pub use converter::{
    Converter, ConverterRegistry, FloatConverter, IntConverter, ParamValue, PathConverter,
    StrConverter, UuidConverter, DEFAULT_CONVERTER,
};
pub use error::{BuildError, ConversionError, RouteTemplateError};
pub use methods::MethodSet;
pub use node::{Displaced, Endpoint};
pub use params::Params;
pub use router::{Resolution, RouteMatch, Router};
pub use template::{PathTemplate, Segment};

use serde::Serialize;

/// Protocol kind a route serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Request/response HTTP.
    Http,
    /// Persistent bidirectional stream (WebSocket).
    Stream,
}
