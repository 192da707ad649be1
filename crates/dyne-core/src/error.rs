//! Error types for request processing.
//!
//! [`DyneError`] is the request-time error taxonomy. Every variant maps to a
//! status code and an `error_kind` string, and renders to the structured
//! failure body `{"error_kind": ..., "detail": ...}`.
//!
//! | Variant | Status | `error_kind` |
//! |---|---|---|
//! | `RouteNotFound` | 404 | `route_not_found` |
//! | `MethodNotAllowed` | 405 | `method_not_allowed` |
//! | `Validation` | 422 (configurable) | `validation_error` |
//! | `Unauthenticated` | 401 | `unauthenticated` |
//! | `MalformedCredentials` | 401 | `malformed_credentials` |
//! | `Unauthorized` | 403 | `unauthorized` |
//! | `Http` | any | `http_error` |
//! | `Timeout` | 504 | `timeout` |
//! | `Serialization` | 500 | `serialization_error` |
//! | `Internal` | 500 | `internal_error` |

use dyne_router::MethodSet;
use http::StatusCode;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`DyneError`].
pub type DyneResult<T> = Result<T, DyneError>;

/// Field-level validation messages, keyed by field path, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors {
    /// Map of field path to list of error messages.
    pub fields: IndexMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates a new empty `FieldErrors`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Moves every message of `other` under `prefix.field`.
    pub fn merge_prefixed(&mut self, prefix: &str, other: Self) {
        for (field, messages) in other.fields {
            let key = if field.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix}.{field}")
            };
            self.fields.entry(key).or_default().extend(messages);
        }
    }

    /// Messages for one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Returns `true` if there are no field errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Request input was rejected by a pipeline stage.
///
/// Defaults to 422; domain-specific stages may pick another 4xx status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Status written to the client.
    pub status: StatusCode,
    /// Summary message.
    pub message: String,
    /// Per-field detail.
    pub fields: FieldErrors,
}

impl ValidationError {
    /// Creates a 422 validation error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    /// Creates a 422 validation error carrying field detail.
    pub fn with_fields(message: impl Into<String>, fields: FieldErrors) -> Self {
        Self {
            fields,
            ..Self::new(message)
        }
    }

    /// Overrides the status code. Non-4xx codes are ignored.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        if status.is_client_error() {
            self.status = status;
        }
        self
    }
}

/// A handler produced output inconsistent with its declared contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SerializationError {
    /// Summary message.
    pub message: String,
    /// Per-field detail, when the schema can point at the offending data.
    pub fields: FieldErrors,
}

impl SerializationError {
    /// Creates a serialization error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    /// Creates a serialization error carrying field detail.
    pub fn with_fields(message: impl Into<String>, fields: FieldErrors) -> Self {
        Self {
            message: message.into(),
            fields,
        }
    }
}

/// Request-time error.
#[derive(Debug, Error)]
pub enum DyneError {
    /// No route template matches the path.
    #[error("no route matches `{path}`")]
    RouteNotFound {
        /// The request path.
        path: String,
    },

    /// A template matches the path but not the method.
    #[error("method `{method}` not allowed")]
    MethodNotAllowed {
        /// The request method.
        method: http::Method,
        /// Methods the matching templates accept.
        allowed: MethodSet,
    },

    /// A pipeline stage rejected the request input.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A pipeline stage could not serialize the handler output.
    #[error("serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    /// No valid credentials were presented.
    #[error("authentication required: {detail}")]
    Unauthenticated {
        /// Reason, for logs.
        detail: String,
    },

    /// The credential header could not be parsed.
    #[error("malformed credentials: {detail}")]
    MalformedCredentials {
        /// Parse failure, for logs.
        detail: String,
    },

    /// Authenticated, but the role requirement is not met.
    #[error("not authorized: {detail}")]
    Unauthorized {
        /// Which requirement failed.
        detail: String,
    },

    /// A handler-chosen status with a message.
    #[error("{status}: {detail}")]
    Http {
        /// Status code.
        status: StatusCode,
        /// Message written to the client.
        detail: String,
    },

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// A server-side defect.
    #[error("internal error: {message}")]
    Internal {
        /// Message written to the client.
        message: String,
        /// Underlying cause (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl DyneError {
    /// Creates an error with an explicit status code.
    pub fn http(status: StatusCode, detail: impl Into<String>) -> Self {
        Self::Http {
            status,
            detail: detail.into(),
        }
    }

    /// Creates a 400 error.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, detail)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Validation(e) => e.status,
            Self::Unauthenticated { .. } | Self::MalformedCredentials { .. } => StatusCode::UNAUTHORIZED,
            Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Self::Http { status, .. } => *status,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Serialization(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable kind written as `error_kind`.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "route_not_found",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::Validation(_) => "validation_error",
            Self::Serialization(_) => "serialization_error",
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::MalformedCredentials { .. } => "malformed_credentials",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Http { .. } => "http_error",
            Self::Timeout => "timeout",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// True for failures caused by the server rather than the client.
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        self.status_code().is_server_error() && !matches!(self, Self::Timeout)
    }

    /// Renders the structured failure body.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let detail = match self {
            Self::Validation(e) => serde_json::json!({
                "message": e.message,
                "fields": e.fields,
            }),
            Self::Serialization(e) => serde_json::json!({
                "message": e.message,
                "fields": e.fields,
            }),
            Self::MethodNotAllowed { method, allowed } => serde_json::json!({
                "message": format!("method `{method}` not allowed"),
                "allowed": allowed.iter().map(http::Method::as_str).collect::<Vec<_>>(),
            }),
            // Internal causes stay in the logs.
            Self::Internal { message, .. } => serde_json::Value::String(message.clone()),
            other => serde_json::Value::String(other.to_string()),
        };
        ErrorBody {
            error_kind: self.error_kind().to_string(),
            detail,
        }
    }
}

/// Structured failure body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable kind.
    pub error_kind: String,
    /// Message string or structured detail.
    pub detail: serde_json::Value,
}
