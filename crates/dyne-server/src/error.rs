//! Server crate errors.

use dyne_pipeline::StageConfigError;
use dyne_router::{BuildError, RouteTemplateError};
use thiserror::Error;

/// A route could not be registered. Fatal at setup time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The path template does not compile.
    #[error(transparent)]
    Template(#[from] RouteTemplateError),

    /// A stage conflicts with the route's existing stages.
    #[error(transparent)]
    Stage(#[from] StageConfigError),

    /// Another live route already uses this name with a different template.
    #[error("route name `{name}` is already registered for `{template}`")]
    DuplicateName {
        /// The contested name.
        name: String,
        /// Template of the existing route.
        template: String,
    },

    /// The handle refers to no registered route.
    #[error("no route registered under `{0}`")]
    UnknownRoute(String),

    /// HTTP routes need at least one method.
    #[error("route `{0}` accepts no methods")]
    NoMethods(String),
}

/// A URL could not be built for a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    /// No route has this name.
    #[error("no route named `{0}`")]
    UnknownRoute(String),

    /// The parameters do not fit the template.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// A stream session operation failed.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The peer went away, the session was closed, or the server is
    /// shutting down.
    #[error("stream closed")]
    Closed,

    /// A JSON message could not be encoded or decoded.
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
}

/// The server could not start or run.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the configured address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while serving.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
