//! Ordered stage composition.
//!
//! ```text
//! stages: [A, B, C]
//!
//! request  ──► A.req ──► B.req ──► C.req ──► handler
//!                                               │
//! response ◄── A.resp ◄── B.resp ◄── C.resp ◄───┘
//! ```
//!
//! A request-phase rejection short-circuits: later request phases, the
//! handler and every response phase are skipped.

use std::future::Future;
use std::sync::Arc;

use dyne_core::{DyneError, Request, Response, SerializationError, ValidationError};

use crate::error::StageConfigError;
use crate::metadata::StageMetadata;
use crate::stage::Stage;

/// A type-erased stage that can be stored in a vector.
pub type BoxedStage = Arc<dyn Stage>;

/// The stages attached to one route, in declaration order.
///
/// # Example
///
/// ```
/// use dyne_core::{Request, Response};
/// use dyne_pipeline::{ExpectStage, StageChain};
/// use http::Method;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let mut chain = StageChain::new();
/// chain.push(Arc::new(ExpectStage::new().response(404, "Item not found"))).unwrap();
///
/// let req = Request::new(Method::GET, "/items/1".parse().unwrap());
/// let resp = chain
///     .execute(req, |_req| async { Ok(Response::text("ok")) })
///     .await
///     .unwrap();
/// assert_eq!(resp.body(), "ok");
/// # });
/// ```
#[derive(Clone, Default)]
pub struct StageChain {
    stages: Vec<BoxedStage>,
}

impl StageChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage. Fails if its injection key is already taken.
    pub fn push(&mut self, stage: BoxedStage) -> Result<(), StageConfigError> {
        if let Some(key) = stage.injection_key() {
            if self.stages.iter().any(|s| s.injection_key() == Some(key)) {
                return Err(StageConfigError::DuplicateKey(key.to_string()));
            }
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in declaration order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Metadata of every stage, in declaration order.
    #[must_use]
    pub fn metadata(&self) -> Vec<StageMetadata> {
        self.stages.iter().map(|s| s.metadata()).collect()
    }

    /// Runs request phases in declaration order, stopping at the first
    /// rejection.
    pub async fn run_request(&self, req: &mut Request) -> Result<(), ValidationError> {
        for stage in &self.stages {
            if let Err(e) = stage.apply_request(req).await {
                tracing::debug!(stage = stage.name(), error = %e, "request rejected by stage");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Runs response phases in reverse declaration order.
    pub async fn run_response(&self, resp: &mut Response) -> Result<(), SerializationError> {
        for stage in self.stages.iter().rev() {
            if let Err(e) = stage.apply_response(resp).await {
                tracing::error!(stage = stage.name(), error = %e, "response rejected by stage");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Runs the whole chain around `handler`.
    ///
    /// A handler error is returned as-is without running response phases:
    /// those apply to the handler's declared output, not to its failures.
    pub async fn execute<H, Fut>(&self, mut req: Request, handler: H) -> Result<Response, DyneError>
    where
        H: FnOnce(Request) -> Fut,
        Fut: Future<Output = Result<Response, DyneError>>,
    {
        self.run_request(&mut req).await?;
        let mut resp = handler(req).await?;
        self.run_response(&mut resp).await?;
        Ok(resp)
    }
}

impl std::fmt::Debug for StageChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}
