//! # Dyne Auth
//!
//! Pluggable authentication backends and role-based access checks.
//!
//! | Backend | Credential | Challenge |
//! |---|---|---|
//! | [`BasicAuth`] | `Authorization: Basic base64(user:pass)` | `Basic realm="..."` |
//! | [`TokenAuth`] | `Authorization: Bearer <token>` or a custom header | `Bearer realm="..."` |
//! | [`DigestAuth`] | `Authorization: Digest ...` | `Digest realm=..,nonce=..,opaque=..` |
//! | [`MultiAuth`] | any of the above, tried in order | all of them, last backend's first |
//!
//! Backends report an [`AuthResult`]. An [`AuthGate`] runs the backend for a
//! route, then checks the resolved roles against a [`RoleRequirement`]:
//! failing authentication is a 401, failing the role check a 403, and the
//! backend's error handler sees which one happened.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod backend;
mod basic;
mod digest;
mod error;
mod gate;
mod header;
mod multi;
mod nonce;
mod roles;
mod token;

pub use backend::{
    AuthBackend, AuthFailure, AuthResult, BackendHooks, ErrorHandler, Identity, RoleResolver, SchemeDoc, SchemeKind,
};
pub use basic::BasicAuth;
pub use digest::{digest_ha1, Algorithm, DigestAuth, DigestChallenge, DigestConfig};
pub use error::AuthError;
pub use gate::{AuthContext, AuthGate, AuthRejection, AuthRequirement};
pub use header::parse_params;
pub use multi::MultiAuth;
pub use nonce::{InMemoryNonceStore, NonceManager, NonceStatus, SignedNonces};
pub use roles::{RoleRequirement, RoleSet};
pub use token::TokenAuth;

/// Realm used when none is configured.
pub const DEFAULT_REALM: &str = "Authentication Required";
