//! The stage trait.

use dyne_core::{BoxFuture, Request, Response, SerializationError, ValidationError};

use crate::metadata::StageMetadata;

/// A composable wrapper around a handler.
///
/// A stage has a runtime effect in two phases and a declarative side:
///
/// - [`apply_request`](Stage::apply_request) runs before the handler, in
///   declaration order, and may reject the request with a
///   [`ValidationError`]; the handler then never runs.
/// - [`apply_response`](Stage::apply_response) runs after the handler, in
///   reverse declaration order, and reports contract violations as a
///   [`SerializationError`].
/// - [`metadata`](Stage::metadata) describes the stage for documentation,
///   whether or not it does any runtime work.
///
/// Both phases default to no-ops, so documentation-only stages implement
/// `name` and `metadata` alone.
///
/// # Example
///
/// ```
/// use dyne_core::{BoxFuture, Request, ValidationError};
/// use dyne_pipeline::{Stage, StageKind, StageMetadata};
///
/// struct RequireJson;
///
/// impl Stage for RequireJson {
///     fn name(&self) -> &'static str {
///         "require_json"
///     }
///
///     fn metadata(&self) -> StageMetadata {
///         StageMetadata::new(StageKind::Input)
///     }
///
///     fn apply_request<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, Result<(), ValidationError>> {
///         Box::pin(async move {
///             match req.content_type().as_deref() {
///                 Some("application/json") => Ok(()),
///                 _ => Err(ValidationError::new("expected JSON")),
///             }
///         })
///     }
/// }
/// ```
pub trait Stage: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Declarative description of the stage.
    fn metadata(&self) -> StageMetadata;

    /// Request phase.
    fn apply_request<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, Result<(), ValidationError>> {
        let _ = req;
        Box::pin(async { Ok(()) })
    }

    /// Response phase.
    fn apply_response<'a>(&'a self, resp: &'a mut Response) -> BoxFuture<'a, Result<(), SerializationError>> {
        let _ = resp;
        Box::pin(async { Ok(()) })
    }

    /// Injection key, for input stages. Keys must be unique per route.
    fn injection_key(&self) -> Option<&str> {
        None
    }
}
