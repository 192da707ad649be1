//! Registration-time stage errors.

use thiserror::Error;

/// A stage or stage chain is misconfigured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageConfigError {
    /// The input location is not one the core can read.
    #[error("unknown input location `{0}`")]
    UnknownLocation(String),

    /// Two input stages on one route inject under the same key.
    #[error("injection key `{0}` is used by more than one input stage")]
    DuplicateKey(String),
}
