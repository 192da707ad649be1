//! The auth backend protocol.
//!
//! A backend turns a request into an [`AuthResult`], knows the challenge it
//! sends with a 401, and carries the callbacks registered on it: a role
//! resolver and an error handler. Each registration point holds a single
//! callback; registering again replaces it.
//!
//! Callbacks may suspend. Those that see the request read what they need
//! from it up front and return an owned future.

use std::future::Future;
use std::sync::Arc;

use dyne_core::{BoxFuture, DyneError, Request, Response, User};
use http::header::WWW_AUTHENTICATE;
use http::StatusCode;
use serde::Serialize;

use crate::roles::RoleSet;

/// Resolves the roles of an authenticated user.
pub type RoleResolver = Arc<dyn Fn(User) -> BoxFuture<'static, RoleSet> + Send + Sync>;

/// Shapes the response for an auth failure of a request.
pub type ErrorHandler = Arc<dyn Fn(&Request, &AuthFailure) -> BoxFuture<'static, Response> + Send + Sync>;

/// A user accepted by a backend, with the backend's role resolver.
#[derive(Clone)]
pub struct Identity {
    /// The verified user.
    pub user: User,
    pub(crate) resolver: Option<RoleResolver>,
}

impl Identity {
    /// Wraps a user with no role resolver.
    pub fn new(user: User) -> Self {
        Self { user, resolver: None }
    }

    /// Resolves roles, empty when the backend has no resolver.
    pub async fn resolve_roles(&self) -> RoleSet {
        match &self.resolver {
            Some(resolve) => resolve(self.user.clone()).await,
            None => RoleSet::new(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user", &self.user)
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Outcome of checking a request's credentials.
#[derive(Debug, Clone)]
pub enum AuthResult {
    /// Credentials verified.
    Authenticated(Identity),
    /// Missing or wrong credentials. `stale` marks a digest response that was
    /// correct for a nonce that is no longer accepted.
    Unauthenticated {
        /// Retry with a fresh challenge.
        stale: bool,
    },
    /// The credential header could not be parsed.
    Malformed(String),
}

impl AuthResult {
    /// Plain rejection.
    pub const fn rejected() -> Self {
        Self::Unauthenticated { stale: false }
    }
}

/// Why a request was turned away at the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// Credentials missing or wrong (401).
    Unauthenticated {
        /// The nonce was stale; the challenge says so.
        stale: bool,
    },
    /// The credential header could not be parsed (401).
    Malformed(String),
    /// Authenticated, but the role requirement is not met (403).
    Unauthorized,
}

impl AuthFailure {
    /// Status code of the default response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } | Self::Malformed(_) => StatusCode::UNAUTHORIZED,
            Self::Unauthorized => StatusCode::FORBIDDEN,
        }
    }

    /// Metrics label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated { stale: false } => "unauthenticated",
            Self::Unauthenticated { stale: true } => "stale",
            Self::Malformed(_) => "malformed",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Whether the challenge should carry `stale=TRUE`.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Unauthenticated { stale: true })
    }

    pub(crate) fn from_result(result: &AuthResult) -> Option<Self> {
        match result {
            AuthResult::Authenticated(_) => None,
            AuthResult::Unauthenticated { stale } => Some(Self::Unauthenticated { stale: *stale }),
            AuthResult::Malformed(detail) => Some(Self::Malformed(detail.clone())),
        }
    }
}

/// Scheme family, used to name security schemes in exported metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    /// HTTP Basic.
    Basic,
    /// HTTP Digest.
    Digest,
    /// Token in the `Authorization` header.
    Token,
    /// Token in a custom header.
    ApiKey,
}

/// Documentation descriptor of one credential scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemeDoc {
    /// Scheme family.
    pub kind: SchemeKind,
    /// `Authorization` scheme name (`Basic`, `Bearer`, ...), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// Header carrying the credential when it is not `Authorization`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Protection realm.
    pub realm: String,
}

/// Role resolver and error handler shared by every backend.
#[derive(Clone, Default)]
pub struct BackendHooks {
    roles: Option<RoleResolver>,
    error_handler: Option<ErrorHandler>,
}

impl BackendHooks {
    /// Registers the role resolver.
    pub fn set_roles<F, Fut, R>(&mut self, resolve: F)
    where
        F: Fn(User) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let resolve = Arc::new(resolve);
        self.roles = Some(Arc::new(move |user| -> BoxFuture<'static, RoleSet> {
            let fut = resolve(user);
            Box::pin(async move { fut.await.into_iter().collect() })
        }));
    }

    /// Registers the error handler.
    pub fn set_error_handler<F, Fut>(&mut self, handler: F)
    where
        F: Fn(&Request, &AuthFailure) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: ErrorHandler =
            Arc::new(move |req: &Request, failure: &AuthFailure| -> BoxFuture<'static, Response> {
                Box::pin(handler(req, failure))
            });
        self.error_handler = Some(handler);
    }

    /// Attaches the role resolver to a verified user.
    pub fn identify(&self, user: User) -> Identity {
        Identity {
            user,
            resolver: self.roles.clone(),
        }
    }

    /// The registered error handler.
    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.error_handler.as_ref()
    }
}

impl std::fmt::Debug for BackendHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHooks")
            .field("roles", &self.roles.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// A pluggable credential scheme.
///
/// Implementations only need [`name`](Self::name),
/// [`authenticate`](Self::authenticate), [`challenge`](Self::challenge),
/// [`hooks`](Self::hooks) and [`schemes`](Self::schemes);
/// [`failure_response`](Self::failure_response) has a default built on them.
pub trait AuthBackend: Send + Sync + 'static {
    /// Short label for logs and metrics (`basic`, `digest`, ...).
    fn name(&self) -> &'static str;

    /// Checks the request's credentials.
    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, AuthResult>;

    /// `WWW-Authenticate` value sent with a 401 to `req`.
    fn challenge<'a>(&'a self, req: &'a Request, stale: bool) -> BoxFuture<'a, Option<String>>;

    /// Registered callbacks.
    fn hooks(&self) -> &BackendHooks;

    /// Credential schemes this backend accepts, for documentation.
    fn schemes(&self) -> Vec<SchemeDoc>;

    /// Builds the failure response.
    ///
    /// With an error handler registered, its response is used and a 401
    /// without a challenge gets this backend's challenge added. Otherwise a
    /// 401 is a bare status with the challenge, and a 403 carries the
    /// structured error body.
    fn failure_response<'a>(&'a self, req: &'a Request, failure: &'a AuthFailure) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut resp = match self.hooks().error_handler() {
                Some(handler) => handler(req, failure).await,
                None => match failure {
                    AuthFailure::Unauthorized => Response::from_error(&DyneError::Unauthorized {
                        detail: "insufficient role".to_string(),
                    }),
                    _ => Response::with_status_code(StatusCode::UNAUTHORIZED),
                },
            };
            if resp.status() == StatusCode::UNAUTHORIZED && resp.header(WWW_AUTHENTICATE.as_str()).is_none() {
                if let Some(challenge) = self.challenge(req, failure.is_stale()).await {
                    resp.set_header(WWW_AUTHENTICATE.as_str(), &challenge);
                }
            }
            resp
        })
    }
}

impl std::fmt::Debug for dyn AuthBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthBackend").field("name", &self.name()).finish()
    }
}

/// Implements the builder-style callback registration shared by backends.
macro_rules! hook_builders {
    ($ty:ty) => {
        impl $ty {
            /// Registers the role resolver, replacing any previous one.
            #[must_use]
            pub fn roles<F, Fut, R>(mut self, resolve: F) -> Self
            where
                F: Fn(dyne_core::User) -> Fut + Send + Sync + 'static,
                Fut: std::future::Future<Output = R> + Send + 'static,
                R: IntoIterator,
                R::Item: Into<String>,
            {
                self.hooks.set_roles(resolve);
                self
            }

            /// Registers the error handler, replacing any previous one.
            #[must_use]
            pub fn error_handler<F, Fut>(mut self, handler: F) -> Self
            where
                F: Fn(&dyne_core::Request, &$crate::AuthFailure) -> Fut + Send + Sync + 'static,
                Fut: std::future::Future<Output = dyne_core::Response> + Send + 'static,
            {
                self.hooks.set_error_handler(handler);
                self
            }
        }
    };
}

pub(crate) use hook_builders;
