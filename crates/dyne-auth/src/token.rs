//! Token authentication: bearer tokens or API keys.

use std::future::Future;
use std::sync::Arc;

use dyne_core::{BoxFuture, Request, User};
use http::HeaderName;

use crate::backend::{hook_builders, AuthBackend, AuthResult, BackendHooks, SchemeDoc, SchemeKind};
use crate::header::{credentials, quote};
use crate::DEFAULT_REALM;

type VerifyToken = Arc<dyn Fn(String) -> BoxFuture<'static, Option<User>> + Send + Sync>;

/// Token in `Authorization: <scheme> <token>`, or the raw value of a custom
/// header.
///
/// # Example
///
/// ```
/// use dyne_auth::TokenAuth;
/// use dyne_core::User;
///
/// let bearer = TokenAuth::new().verify(|token| async move {
///     (token == "secret").then(|| User::new("service".to_string()))
/// });
///
/// let api_key = TokenAuth::new()
///     .header(http::HeaderName::from_static("x-api-key"))
///     .verify(|key| async move { (key == "k1").then(|| User::new("partner".to_string())) });
/// ```
#[derive(Clone)]
pub struct TokenAuth {
    scheme: String,
    header: Option<HeaderName>,
    realm: String,
    verify: Option<VerifyToken>,
    hooks: BackendHooks,
}

impl TokenAuth {
    /// `Bearer` tokens in the `Authorization` header.
    pub fn new() -> Self {
        Self {
            scheme: "Bearer".to_string(),
            header: None,
            realm: DEFAULT_REALM.to_string(),
            verify: None,
            hooks: BackendHooks::default(),
        }
    }

    /// Uses another `Authorization` scheme name.
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Reads the token from this header instead of `Authorization`.
    #[must_use]
    pub fn header(mut self, header: HeaderName) -> Self {
        self.header = Some(header);
        self
    }

    /// Sets the realm sent in the challenge.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Registers the token verifier.
    #[must_use]
    pub fn verify<F, Fut>(mut self, verify: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<User>> + Send + 'static,
    {
        self.verify = Some(Arc::new(move |token| -> BoxFuture<'static, Option<User>> {
            Box::pin(verify(token))
        }));
        self
    }

    fn token<'a>(&self, req: &'a Request) -> Option<&'a str> {
        let token = match &self.header {
            Some(name) => req.headers().get(name)?.to_str().ok()?.trim(),
            None => credentials(req, &self.scheme)?,
        };
        (!token.is_empty()).then_some(token)
    }
}

hook_builders!(TokenAuth);

impl Default for TokenAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuth")
            .field("scheme", &self.scheme)
            .field("header", &self.header)
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

impl AuthBackend for TokenAuth {
    fn name(&self) -> &'static str {
        if self.header.is_some() {
            "api_key"
        } else {
            "token"
        }
    }

    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, AuthResult> {
        Box::pin(async move {
            let Some(token) = self.token(req) else {
                return AuthResult::rejected();
            };
            let Some(verify) = &self.verify else {
                tracing::warn!(scheme = self.name(), "no token verifier registered");
                return AuthResult::rejected();
            };
            match verify(token.to_string()).await {
                Some(user) => AuthResult::Authenticated(self.hooks.identify(user)),
                None => AuthResult::rejected(),
            }
        })
    }

    fn challenge<'a>(&'a self, _req: &'a Request, _stale: bool) -> BoxFuture<'a, Option<String>> {
        let challenge = format!("{} realm={}", self.scheme, quote(&self.realm));
        Box::pin(async move { Some(challenge) })
    }

    fn hooks(&self) -> &BackendHooks {
        &self.hooks
    }

    fn schemes(&self) -> Vec<SchemeDoc> {
        let (kind, scheme, header) = match &self.header {
            Some(name) => (SchemeKind::ApiKey, None, Some(name.as_str().to_string())),
            None => (SchemeKind::Token, Some(self.scheme.clone()), None),
        };
        vec![SchemeDoc {
            kind,
            scheme,
            header,
            realm: self.realm.clone(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn verified(expected: &'static str) -> impl Fn(String) -> std::future::Ready<Option<User>> {
        move |token| std::future::ready((token == expected).then(|| User::new("svc".to_string())))
    }

    fn request(name: &str, value: &str) -> Request {
        Request::new(Method::GET, "/".parse().unwrap()).with_header(name, value)
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let auth = TokenAuth::new().verify(verified("abc"));
        assert!(matches!(
            auth.authenticate(&request("authorization", "Bearer abc")).await,
            AuthResult::Authenticated(_)
        ));
        assert!(matches!(
            auth.authenticate(&request("authorization", "Bearer xyz")).await,
            AuthResult::Unauthenticated { .. }
        ));
        assert!(matches!(
            auth.authenticate(&request("authorization", "Bearer ")).await,
            AuthResult::Unauthenticated { .. }
        ));
    }

    #[tokio::test]
    async fn test_custom_scheme() {
        let auth = TokenAuth::new().scheme("ApiKey").verify(verified("abc"));
        assert!(matches!(
            auth.authenticate(&request("authorization", "ApiKey abc")).await,
            AuthResult::Authenticated(_)
        ));
        let req = request("authorization", "ApiKey abc");
        assert_eq!(
            auth.challenge(&req, false).await.as_deref(),
            Some(r#"ApiKey realm="Authentication Required""#)
        );
    }

    #[tokio::test]
    async fn test_custom_header_is_api_key() {
        let auth = TokenAuth::new()
            .header(HeaderName::from_static("x-api-key"))
            .verify(verified("k1"));
        assert!(matches!(
            auth.authenticate(&request("x-api-key", "k1")).await,
            AuthResult::Authenticated(_)
        ));
        assert_eq!(auth.name(), "api_key");
        assert_eq!(auth.schemes()[0].kind, SchemeKind::ApiKey);
        assert_eq!(auth.schemes()[0].header.as_deref(), Some("x-api-key"));
    }
}
