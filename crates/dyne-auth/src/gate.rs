//! Per-route auth enforcement.

use std::sync::Arc;

use dyne_core::{Request, Response, User};
use dyne_telemetry::metrics::record_auth_failure;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::backend::{AuthBackend, AuthFailure, AuthResult, Identity, SchemeDoc};
use crate::roles::{RoleRequirement, RoleSet};

/// Authenticated caller, stored in the request state by [`AuthGate`].
///
/// Roles are resolved on first use and cached for the rest of the request.
///
/// ```ignore
/// let ctx = req.state().get::<AuthContext>().unwrap();
/// if ctx.roles().await.contains("admin") { /* ... */ }
/// ```
#[derive(Debug)]
pub struct AuthContext {
    identity: Identity,
    roles: OnceCell<RoleSet>,
}

impl AuthContext {
    /// Wraps a verified identity.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            roles: OnceCell::new(),
        }
    }

    /// The authenticated user.
    pub fn user(&self) -> &User {
        &self.identity.user
    }

    /// The user's roles, resolved once.
    pub async fn roles(&self) -> &RoleSet {
        self.roles.get_or_init(|| self.identity.resolve_roles()).await
    }
}

/// A route's auth requirement as exported to documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequirement {
    /// Accepted credential schemes.
    pub schemes: Vec<SchemeDoc>,
    /// Demanded roles, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<RoleRequirement>,
}

/// A rejected request and the response to send.
#[derive(Debug)]
pub struct AuthRejection {
    /// What went wrong.
    pub failure: AuthFailure,
    /// The backend's response for it.
    pub response: Response,
}

/// Backend plus optional role requirement, checked before a route's stages.
///
/// On success the user is set on the request and an [`AuthContext`] is put
/// into its state.
#[derive(Clone)]
pub struct AuthGate {
    backend: Arc<dyn AuthBackend>,
    roles: Option<RoleRequirement>,
}

impl AuthGate {
    /// Requires authentication by `backend`.
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend, roles: None }
    }

    /// Additionally requires roles.
    #[must_use]
    pub fn require_roles(mut self, roles: impl Into<RoleRequirement>) -> Self {
        self.roles = Some(roles.into());
        self
    }

    /// The backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn AuthBackend> {
        &self.backend
    }

    /// Documentation view of the requirement.
    #[must_use]
    pub fn requirement(&self) -> AuthRequirement {
        AuthRequirement {
            schemes: self.backend.schemes(),
            roles: self.roles.clone(),
        }
    }

    /// Authenticates and authorizes `req`.
    pub async fn check(&self, req: &mut Request) -> Result<(), AuthRejection> {
        let identity = match self.backend.authenticate(req).await {
            AuthResult::Authenticated(identity) => identity,
            other => {
                let failure = AuthFailure::from_result(&other).unwrap_or(AuthFailure::Unauthenticated { stale: false });
                return Err(self.reject(req, failure).await);
            }
        };

        let ctx = AuthContext::new(identity);
        if let Some(required) = &self.roles {
            if !required.is_satisfied_by(ctx.roles().await) {
                return Err(self.reject(req, AuthFailure::Unauthorized).await);
            }
        }

        req.set_user(ctx.user().clone());
        req.state_mut().insert(ctx);
        Ok(())
    }

    async fn reject(&self, req: &Request, failure: AuthFailure) -> AuthRejection {
        tracing::info!(scheme = self.backend.name(), kind = failure.kind(), "auth rejected request");
        record_auth_failure(self.backend.name(), failure.kind());
        AuthRejection {
            response: self.backend.failure_response(req, &failure).await,
            failure,
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("backend", &self.backend.name())
            .field("roles", &self.roles)
            .finish()
    }
}
