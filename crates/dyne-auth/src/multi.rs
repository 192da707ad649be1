//! Several backends accepted on one route.

use std::sync::Arc;

use dyne_core::{BoxFuture, Request, Response};
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, StatusCode};

use crate::backend::{AuthBackend, AuthFailure, AuthResult, BackendHooks, SchemeDoc};

/// Tries each backend in order; the first to authenticate wins.
///
/// When every backend rejects the request, the last backend's result and
/// error handler shape the failure. The failure is stale if any backend
/// found a stale nonce, and a 401 offers every backend's challenge, the
/// last backend's first.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use dyne_auth::{BasicAuth, MultiAuth, TokenAuth};
///
/// let auth = MultiAuth::new(vec![
///     Arc::new(TokenAuth::new()),
///     Arc::new(BasicAuth::new()),
/// ]);
/// assert_eq!(auth.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct MultiAuth {
    backends: Vec<Arc<dyn AuthBackend>>,
    hooks: BackendHooks,
}

impl MultiAuth {
    /// Combines `backends`, tried in the given order.
    pub fn new(backends: Vec<Arc<dyn AuthBackend>>) -> Self {
        Self {
            backends,
            hooks: BackendHooks::default(),
        }
    }

    /// Appends a backend.
    #[must_use]
    pub fn with(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Number of backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Returns true if there are no backends.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// The combined backends.
    #[must_use]
    pub fn backends(&self) -> &[Arc<dyn AuthBackend>] {
        &self.backends
    }
}

impl std::fmt::Debug for MultiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.backends.iter().map(|b| b.name())).finish()
    }
}

impl AuthBackend for MultiAuth {
    fn name(&self) -> &'static str {
        "multi"
    }

    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, AuthResult> {
        Box::pin(async move {
            let mut last = AuthResult::rejected();
            let mut stale = false;
            for backend in &self.backends {
                last = backend.authenticate(req).await;
                match last {
                    AuthResult::Authenticated(_) => {
                        tracing::debug!(scheme = backend.name(), "authenticated by backend");
                        return last;
                    }
                    AuthResult::Unauthenticated { stale: true } => stale = true,
                    _ => {}
                }
            }
            if stale {
                AuthResult::Unauthenticated { stale: true }
            } else {
                last
            }
        })
    }

    fn challenge<'a>(&'a self, req: &'a Request, stale: bool) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            match self.backends.last() {
                Some(last) => last.challenge(req, stale).await,
                None => None,
            }
        })
    }

    fn hooks(&self) -> &BackendHooks {
        &self.hooks
    }

    fn schemes(&self) -> Vec<SchemeDoc> {
        self.backends.iter().flat_map(|b| b.schemes()).collect()
    }

    fn failure_response<'a>(&'a self, req: &'a Request, failure: &'a AuthFailure) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some((last, others)) = self.backends.split_last() else {
                return Response::with_status_code(failure.status());
            };
            let mut resp = last.failure_response(req, failure).await;
            if resp.status() == StatusCode::UNAUTHORIZED {
                for backend in others {
                    let challenge = backend.challenge(req, failure.is_stale()).await;
                    if let Some(value) = challenge.and_then(|c| HeaderValue::from_str(&c).ok()) {
                        resp.headers_mut().append(WWW_AUTHENTICATE, value);
                    }
                }
            }
            resp
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BasicAuth, TokenAuth};
    use dyne_core::User;
    use http::{Method, StatusCode};

    #[tokio::test]
    async fn test_first_success_wins() {
        let token = TokenAuth::new().verify(|t| async move { (t == "tok").then(|| User::new("from-token".to_string())) });
        let multi = MultiAuth::new(vec![Arc::new(token), Arc::new(BasicAuth::new())]);
        let req = Request::new(Method::GET, "/".parse().unwrap()).with_header("authorization", "Bearer tok");
        match multi.authenticate(&req).await {
            AuthResult::Authenticated(identity) => assert_eq!(identity.user.name(), Some("from-token")),
            other => panic!("unexpected {other:?}"),
        }
    }

    fn get() -> Request {
        Request::new(Method::GET, "/".parse().unwrap())
    }

    #[tokio::test]
    async fn test_failure_shaped_by_last_backend() {
        let basic = BasicAuth::new().error_handler(|_req: &Request, f: &AuthFailure| {
            let status = f.status();
            async move { Response::text("basic says no").with_status(status) }
        });
        let multi = MultiAuth::new(vec![Arc::new(TokenAuth::new()), Arc::new(basic)]);
        let resp = multi
            .failure_response(&get(), &AuthFailure::Unauthenticated { stale: false })
            .await;
        assert_eq!(resp.body(), "basic says no");
        let challenges: Vec<_> = resp.headers().get_all("www-authenticate").iter().collect();
        assert_eq!(challenges.len(), 2);
        assert!(challenges[0].to_str().unwrap().starts_with("Basic "));
        assert!(challenges[1].to_str().unwrap().starts_with("Bearer "));
    }

    /// Rejects like a digest backend that saw a correct response for an
    /// expired nonce.
    struct StaleBackend(BackendHooks);

    impl AuthBackend for StaleBackend {
        fn name(&self) -> &'static str {
            "stale"
        }

        fn authenticate<'a>(&'a self, _req: &'a Request) -> BoxFuture<'a, AuthResult> {
            Box::pin(async { AuthResult::Unauthenticated { stale: true } })
        }

        fn challenge<'a>(&'a self, _req: &'a Request, stale: bool) -> BoxFuture<'a, Option<String>> {
            Box::pin(async move { Some(format!("Stale fresh={}", !stale)) })
        }

        fn hooks(&self) -> &BackendHooks {
            &self.0
        }

        fn schemes(&self) -> Vec<SchemeDoc> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_stale_survives_later_rejection() {
        let multi = MultiAuth::new(vec![Arc::new(StaleBackend(BackendHooks::default())), Arc::new(BasicAuth::new())]);
        let req = get();
        let result = multi.authenticate(&req).await;
        assert!(matches!(result, AuthResult::Unauthenticated { stale: true }));

        let failure = AuthFailure::from_result(&result).unwrap();
        let resp = multi.failure_response(&req, &failure).await;
        let challenges: Vec<_> = resp.headers().get_all("www-authenticate").iter().collect();
        assert!(challenges[0].to_str().unwrap().starts_with("Basic "));
        assert_eq!(challenges[1], "Stale fresh=false");
    }

    #[tokio::test]
    async fn test_empty_multi_rejects() {
        let resp = MultiAuth::default().failure_response(&get(), &AuthFailure::Unauthorized).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
