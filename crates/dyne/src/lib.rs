//! # dyne
//!
//! An async web toolkit:
//!
//! - typed path templates with pluggable converters and reverse URL building
//! - a dispatcher that tells "no such path" (404) from "wrong method" (405)
//! - declarative pipeline stages for input decoding and output encoding
//! - Basic, Token, Digest and chained auth backends with role requirements
//! - persistent WebSocket streams sharing the same routing and auth
//! - a route metadata export for documentation generators
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dyne::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     dyne::telemetry::init_logging(&LogConfig::production())?;
//!
//!     let mut registry = Registry::new();
//!     registry.register(Route::new("/hello/{name}", handler(|req| async move {
//!         let name = req.params().get_str("name").unwrap_or("world").to_string();
//!         Ok(Response::text(format!("hello {name}")))
//!     })))?;
//!
//!     Server::new(registry, ServerConfig::default()).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! Request → Router → pre-request hooks → AuthGate → stages (request) → Handler
//!              │                                                          ↓
//!           404/405            Response ←──────────────── stages (response)
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use dyne_core as core;

// Re-export routing types
pub use dyne_router as router;

// Re-export pipeline stages
pub use dyne_pipeline as pipeline;

// Re-export auth backends
pub use dyne_auth as auth;

// Re-export registry, dispatcher and server
pub use dyne_server as server;

// Re-export logging and metrics
pub use dyne_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust
/// use dyne::prelude::*;
///
/// let mut registry = Registry::new();
/// registry
///     .register(Route::new("/", handler(|_req| async { Ok(Response::text("ok")) })))
///     .unwrap();
/// assert_eq!(registry.len(), 1);
/// ```
pub mod prelude {
    pub use dyne_core::{DyneError, DyneResult, Request, Response, User};

    pub use dyne_router::{MethodSet, Protocol};

    pub use dyne_pipeline::{
        ExpectStage, FileRule, InputStage, Location, ObjectSchema, OutputStage, TypedSchema, UploadedFiles, WebhookStage,
    };

    pub use dyne_auth::{AuthContext, AuthGate, BasicAuth, DigestAuth, DigestConfig, MultiAuth, RoleRequirement, TokenAuth};

    pub use dyne_server::{
        handler, stream_handler, Dispatcher, HookOutcome, Message, Registry, Route, Server, ServerConfig,
        StreamSession,
    };

    pub use dyne_telemetry::{LogConfig, LogFormat};
}
