//! Auth setup and header parsing errors.

use thiserror::Error;

/// Errors from constructing backends or parsing auth headers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The header does not follow the `scheme params` grammar.
    #[error("malformed auth header: {0}")]
    MalformedHeader(String),

    /// A required parameter is absent.
    #[error("missing `{0}` parameter")]
    MissingParam(&'static str),

    /// An algorithm other than `MD5` or `MD5-sess`.
    #[error("unsupported digest algorithm `{0}`")]
    UnsupportedAlgorithm(String),

    /// The challenge offers no quality of protection this client speaks.
    #[error("unsupported qop `{0}`")]
    UnsupportedQop(String),

    /// The signing key was rejected.
    #[error("invalid nonce signing key: {0}")]
    InvalidKey(String),
}
