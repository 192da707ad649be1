//! HTTP Basic authentication.

use std::future::Future;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dyne_core::{BoxFuture, Request, User};

use crate::backend::{hook_builders, AuthBackend, AuthResult, BackendHooks, SchemeDoc, SchemeKind};
use crate::header::{credentials, quote};
use crate::DEFAULT_REALM;

type VerifyPassword = Arc<dyn Fn(String, String) -> BoxFuture<'static, Option<User>> + Send + Sync>;

/// `Authorization: Basic base64(username:password)`.
///
/// # Example
///
/// ```
/// use dyne_auth::BasicAuth;
/// use dyne_core::User;
///
/// let auth = BasicAuth::new().verify(|username, password| async move {
///     (username == "john" && password == "hello").then(|| User::new(username))
/// });
/// ```
#[derive(Clone)]
pub struct BasicAuth {
    realm: String,
    verify: Option<VerifyPassword>,
    hooks: BackendHooks,
}

impl BasicAuth {
    /// Creates a backend with the default realm and no verifier.
    pub fn new() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            verify: None,
            hooks: BackendHooks::default(),
        }
    }

    /// Sets the realm sent in the challenge.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Registers the credential verifier, called with `(username, password)`.
    #[must_use]
    pub fn verify<F, Fut>(mut self, verify: F) -> Self
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<User>> + Send + 'static,
    {
        self.verify = Some(Arc::new(move |username, password| -> BoxFuture<'static, Option<User>> {
            Box::pin(verify(username, password))
        }));
        self
    }
}

hook_builders!(BasicAuth);

impl Default for BasicAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("realm", &self.realm)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Decodes `base64(username:password)`.
fn decode(token: &str) -> Result<(String, String), String> {
    let raw = STANDARD
        .decode(token)
        .map_err(|e| format!("invalid base64: {e}"))?;
    let pair = String::from_utf8(raw).map_err(|_| "credentials are not UTF-8".to_string())?;
    pair.split_once(':')
        .map(|(u, p)| (u.to_string(), p.to_string()))
        .ok_or_else(|| "missing `:` separator".to_string())
}

impl AuthBackend for BasicAuth {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, AuthResult> {
        Box::pin(async move {
            let Some(token) = credentials(req, "Basic") else {
                return AuthResult::rejected();
            };
            let (username, password) = match decode(token) {
                Ok(pair) => pair,
                Err(detail) => return AuthResult::Malformed(detail),
            };
            let Some(verify) = &self.verify else {
                tracing::warn!(scheme = "basic", "no credential verifier registered");
                return AuthResult::rejected();
            };
            match verify(username, password).await {
                Some(user) => AuthResult::Authenticated(self.hooks.identify(user)),
                None => AuthResult::rejected(),
            }
        })
    }

    fn challenge<'a>(&'a self, _req: &'a Request, _stale: bool) -> BoxFuture<'a, Option<String>> {
        let challenge = format!("Basic realm={}", quote(&self.realm));
        Box::pin(async move { Some(challenge) })
    }

    fn hooks(&self) -> &BackendHooks {
        &self.hooks
    }

    fn schemes(&self) -> Vec<SchemeDoc> {
        vec![SchemeDoc {
            kind: SchemeKind::Basic,
            scheme: Some("Basic".to_string()),
            header: None,
            realm: self.realm.clone(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};

    fn backend() -> BasicAuth {
        BasicAuth::new().verify(|u, p| async move { (u == "john" && p == "hello").then(|| User::new(u)) })
    }

    fn request(auth: Option<&str>) -> Request {
        let req = Request::new(Method::GET, "/".parse().unwrap());
        match auth {
            Some(value) => req.with_header("authorization", value),
            None => req,
        }
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let result = backend().authenticate(&request(Some(&basic("john", "hello")))).await;
        match result {
            AuthResult::Authenticated(identity) => assert_eq!(identity.user.name(), Some("john")),
            other => panic!("expected authenticated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_password_and_missing_header() {
        let auth = backend();
        assert!(matches!(
            auth.authenticate(&request(Some(&basic("john", "nope")))).await,
            AuthResult::Unauthenticated { stale: false }
        ));
        assert!(matches!(
            auth.authenticate(&request(None)).await,
            AuthResult::Unauthenticated { .. }
        ));
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let result = backend().authenticate(&request(Some("Basic !!!"))).await;
        assert!(matches!(result, AuthResult::Malformed(_)));
        let no_colon = format!("Basic {}", STANDARD.encode("johnhello"));
        assert!(matches!(
            backend().authenticate(&request(Some(&no_colon))).await,
            AuthResult::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_default_failure_response_has_challenge() {
        let resp = backend()
            .realm("api")
            .failure_response(&request(None), &crate::AuthFailure::Unauthenticated { stale: false })
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.header("www-authenticate"), Some(r#"Basic realm="api""#));
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn test_custom_handler_gets_challenge_added() {
        let auth = backend().error_handler(|_req: &Request, failure: &crate::AuthFailure| {
            let status = failure.status();
            async move { dyne_core::Response::text("go away").with_status(status) }
        });
        let req = request(None);
        let resp = auth
            .failure_response(&req, &crate::AuthFailure::Unauthenticated { stale: false })
            .await;
        assert_eq!(resp.body(), "go away");
        assert!(resp.header("www-authenticate").is_some());

        let forbidden = auth.failure_response(&req, &crate::AuthFailure::Unauthorized).await;
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert!(forbidden.header("www-authenticate").is_none());
    }
}
