//! Failures of the test harness itself, as opposed to failing assertions.

use thiserror::Error;

use crate::response::TestResponse;

/// Something the harness could not do.
#[derive(Debug, Error)]
pub enum TestError {
    /// A header, URI or body given to the builder was invalid.
    #[error("invalid test request: {0}")]
    RequestBuild(String),
    /// The body could not be read the way it was asked for.
    #[error("unreadable body: {0}")]
    BodyRead(String),
    /// Encoding or decoding a JSON payload.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// The dispatcher answered the handshake with a plain response.
    #[error("stream refused with status {}", .0.status())]
    StreamRefused(Box<TestResponse>),
    /// The stream ended or failed.
    #[error("stream error: {0}")]
    Stream(String),
}
