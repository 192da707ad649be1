//! HTTP Digest authentication (RFC 7616 `MD5`/`MD5-sess`, RFC 2069 legacy).
//!
//! ```text
//! client                                server
//!   │ GET /secret                         │
//!   │────────────────────────────────────►│
//!   │ 401 WWW-Authenticate: Digest        │ nonce + opaque issued
//!   │◄────────────────────────────────────│
//!   │ GET /secret                         │
//!   │ Authorization: Digest response=...  │ nonce, opaque, uri, response checked
//!   │────────────────────────────────────►│
//!   │ 200                                 │
//!   │◄────────────────────────────────────│
//! ```
//!
//! A correct response computed against a nonce that has expired (or, with
//! [`InMemoryNonceStore`](crate::InMemoryNonceStore), a replayed nonce count)
//! is answered with a new challenge carrying `stale=TRUE`, so clients retry
//! without prompting for credentials again. A nonce count is committed only
//! once the response has matched.
//!
//! The realm is part of HA1. Stored HA1 values must be computed with the
//! realm configured here, or every response will mismatch.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dyne_core::{BoxFuture, Request, User};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::backend::{hook_builders, AuthBackend, AuthResult, BackendHooks, SchemeDoc, SchemeKind};
use crate::error::AuthError;
use crate::header::{credentials, parse_params, quote};
use crate::nonce::{NonceManager, NonceStatus, SignedNonces};
use crate::DEFAULT_REALM;

type PasswordLookup = Arc<dyn Fn(String) -> BoxFuture<'static, Option<String>> + Send + Sync>;
type GenerateFn = Arc<dyn Fn(&Request) -> BoxFuture<'static, String> + Send + Sync>;
type VerifyFn = Arc<dyn Fn(&Request, &str) -> BoxFuture<'static, bool> + Send + Sync>;

/// Digest hash algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// `MD5`.
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    /// `MD5-sess`: HA1 is re-keyed with the nonce and client nonce.
    #[serde(rename = "MD5-sess")]
    Md5Sess,
}

impl Algorithm {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("MD5") {
            Ok(Self::Md5)
        } else if s.eq_ignore_ascii_case("MD5-sess") {
            Ok(Self::Md5Sess)
        } else {
            Err(AuthError::UnsupportedAlgorithm(s.to_string()))
        }
    }
}

/// Digest backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DigestConfig {
    /// Protection realm; also an input to HA1.
    pub realm: String,
    /// Seconds a nonce stays fresh.
    pub nonce_ttl_secs: u64,
    /// Hash algorithm.
    pub algorithm: Algorithm,
    /// Require `qop="auth"`. When false, only the legacy form is accepted.
    pub qop_auth: bool,
    /// Treat the password callback's value as a precomputed HA1 as well as a
    /// plaintext password.
    pub use_ha1: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            nonce_ttl_secs: 300,
            algorithm: Algorithm::Md5,
            qop_auth: true,
            use_ha1: false,
        }
    }
}

/// `MD5(username:realm:password)`, for storing HA1 instead of passwords.
#[must_use]
pub fn digest_ha1(username: &str, realm: &str, password: &str) -> String {
    md5_hex(&[username, realm, password])
}

fn md5_hex(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b":");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Inputs of one response computation.
struct ResponseInput<'a> {
    algorithm: Algorithm,
    method: &'a str,
    uri: &'a str,
    nonce: &'a str,
    /// `(nc, cnonce)` when `qop=auth`.
    qop: Option<(&'a str, &'a str)>,
}

impl ResponseInput<'_> {
    fn compute(&self, ha1: &str) -> String {
        let ha1 = match (self.algorithm, self.qop) {
            (Algorithm::Md5Sess, Some((_, cnonce))) => md5_hex(&[ha1, self.nonce, cnonce]),
            _ => ha1.to_string(),
        };
        let ha2 = md5_hex(&[self.method, self.uri]);
        match self.qop {
            Some((nc, cnonce)) => md5_hex(&[ha1.as_str(), self.nonce, nc, cnonce, "auth", ha2.as_str()]),
            None => md5_hex(&[ha1.as_str(), self.nonce, ha2.as_str()]),
        }
    }
}

/// Server side of digest authentication.
///
/// # Example
///
/// ```
/// use dyne_auth::{DigestAuth, DigestConfig};
///
/// let auth = DigestAuth::new(DigestConfig::default())
///     .unwrap()
///     .password(|username| async move {
///         (username == "john").then(|| "hello".to_string())
///     });
/// ```
#[derive(Clone)]
pub struct DigestAuth {
    config: DigestConfig,
    nonces: Arc<dyn NonceManager>,
    password: Option<PasswordLookup>,
    nonce_generator: Option<GenerateFn>,
    nonce_verifier: Option<VerifyFn>,
    opaque_generator: Option<GenerateFn>,
    opaque_verifier: Option<VerifyFn>,
    hooks: BackendHooks,
}

impl DigestAuth {
    /// Creates a backend with self-verifying nonces under a random key.
    pub fn new(config: DigestConfig) -> Result<Self, AuthError> {
        let nonces = SignedNonces::new(Duration::from_secs(config.nonce_ttl_secs))?;
        Ok(Self::with_nonce_manager(config, Arc::new(nonces)))
    }

    /// Creates a backend with a custom nonce manager, such as an
    /// [`InMemoryNonceStore`](crate::InMemoryNonceStore) or signed nonces
    /// sharing a key across instances.
    pub fn with_nonce_manager(config: DigestConfig, nonces: Arc<dyn NonceManager>) -> Self {
        Self {
            config,
            nonces,
            password: None,
            nonce_generator: None,
            nonce_verifier: None,
            opaque_generator: None,
            opaque_verifier: None,
            hooks: BackendHooks::default(),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Registers the password lookup. The value is a plaintext password, or
    /// an HA1 when `use_ha1` is configured.
    #[must_use]
    pub fn password<F, Fut>(mut self, lookup: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.password = Some(Arc::new(move |username| -> BoxFuture<'static, Option<String>> {
            Box::pin(lookup(username))
        }));
        self
    }

    /// Replaces nonce generation. The callback sees the request being
    /// challenged.
    #[must_use]
    pub fn generate_nonce<F, Fut>(mut self, generate: F) -> Self
    where
        F: Fn(&Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        self.nonce_generator = Some(Arc::new(move |req: &Request| -> BoxFuture<'static, String> {
            Box::pin(generate(req))
        }));
        self
    }

    /// Replaces nonce verification. A rejected nonce is invalid, never stale,
    /// and nonce counts are left to the callback.
    #[must_use]
    pub fn verify_nonce<F, Fut>(mut self, verify: F) -> Self
    where
        F: Fn(&Request, &str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.nonce_verifier = Some(Arc::new(move |req: &Request, nonce: &str| -> BoxFuture<'static, bool> {
            Box::pin(verify(req, nonce))
        }));
        self
    }

    /// Replaces opaque generation.
    #[must_use]
    pub fn generate_opaque<F, Fut>(mut self, generate: F) -> Self
    where
        F: Fn(&Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        self.opaque_generator = Some(Arc::new(move |req: &Request| -> BoxFuture<'static, String> {
            Box::pin(generate(req))
        }));
        self
    }

    /// Replaces opaque verification.
    #[must_use]
    pub fn verify_opaque<F, Fut>(mut self, verify: F) -> Self
    where
        F: Fn(&Request, &str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.opaque_verifier = Some(Arc::new(move |req: &Request, opaque: &str| -> BoxFuture<'static, bool> {
            Box::pin(verify(req, opaque))
        }));
        self
    }

    async fn issue(&self, req: &Request) -> (String, String) {
        let nonce = match &self.nonce_generator {
            Some(generate) => generate(req).await,
            None => self.nonces.generate_nonce().await,
        };
        let opaque = match &self.opaque_generator {
            Some(generate) => generate(req).await,
            None => self.nonces.generate_opaque(&nonce).await,
        };
        (nonce, opaque)
    }

    async fn check_nonce(&self, req: &Request, nonce: &str, nc: Option<u32>) -> NonceStatus {
        match &self.nonce_verifier {
            Some(verify) => match verify(req, nonce).await {
                true => NonceStatus::Valid,
                false => NonceStatus::Invalid,
            },
            None => self.nonces.check_nonce(nonce, nc).await,
        }
    }

    async fn commit_nonce(&self, nonce: &str, nc: Option<u32>) -> NonceStatus {
        match &self.nonce_verifier {
            Some(_) => NonceStatus::Valid,
            None => self.nonces.commit_nonce(nonce, nc).await,
        }
    }

    async fn check_opaque(&self, req: &Request, nonce: &str, opaque: &str) -> bool {
        match &self.opaque_verifier {
            Some(verify) => verify(req, opaque).await,
            None => self.nonces.verify_opaque(nonce, opaque).await,
        }
    }

    async fn verify(&self, req: &Request, header: &str) -> AuthResult {
        let params = match parse_params(header) {
            Ok(params) => params,
            Err(e) => return AuthResult::Malformed(e.to_string()),
        };
        let required = |name: &'static str| params.get(name).map(String::as_str).ok_or(name);
        let fields = (|| {
            Ok::<_, &'static str>((
                required("username")?,
                required("realm")?,
                required("nonce")?,
                required("uri")?,
                required("response")?,
            ))
        })();
        let (username, realm, nonce, uri, response) = match fields {
            Ok(fields) => fields,
            Err(name) => return AuthResult::Malformed(format!("missing `{name}` parameter")),
        };

        if realm != self.config.realm {
            tracing::debug!(scheme = "digest", realm, "realm mismatch");
            return AuthResult::rejected();
        }
        let target = req.uri().path_and_query().map_or(req.path(), |pq| pq.as_str());
        if uri != target && uri != req.path() {
            tracing::debug!(scheme = "digest", uri, target, "digest uri does not match request target");
            return AuthResult::rejected();
        }
        let algorithm = match params.get("algorithm") {
            Some(name) => match name.parse::<Algorithm>() {
                Ok(algorithm) => algorithm,
                Err(e) => return AuthResult::Malformed(e.to_string()),
            },
            None => Algorithm::Md5,
        };
        if algorithm != self.config.algorithm {
            return AuthResult::rejected();
        }

        let qop = match (params.get("qop").map(String::as_str), self.config.qop_auth) {
            (Some("auth"), true) => match (params.get("nc"), params.get("cnonce")) {
                (Some(nc), Some(cnonce)) => match u32::from_str_radix(nc, 16) {
                    Ok(count) => Some((nc.as_str(), cnonce.as_str(), count)),
                    Err(_) => return AuthResult::Malformed(format!("invalid nonce count `{nc}`")),
                },
                _ => return AuthResult::Malformed("qop=auth requires nc and cnonce".to_string()),
            },
            (None, false) => None,
            _ => return AuthResult::rejected(),
        };

        let opaque = params.get("opaque").map_or("", String::as_str);
        if !self.check_opaque(req, nonce, opaque).await {
            return AuthResult::rejected();
        }
        let count = qop.map(|(_, _, count)| count);
        let status = self.check_nonce(req, nonce, count).await;
        if status == NonceStatus::Invalid {
            return AuthResult::rejected();
        }

        let Some(lookup) = &self.password else {
            tracing::warn!(scheme = "digest", "no password lookup registered");
            return AuthResult::rejected();
        };
        let Some(secret) = lookup(username.to_string()).await else {
            return AuthResult::rejected();
        };

        let input = ResponseInput {
            algorithm,
            method: req.method().as_str(),
            uri,
            nonce,
            qop: qop.map(|(nc, cnonce, _)| (nc, cnonce)),
        };
        let mut candidates = vec![digest_ha1(username, &self.config.realm, &secret)];
        if self.config.use_ha1 {
            candidates.push(secret.to_ascii_lowercase());
        }
        let presented = response.to_ascii_lowercase();
        let matched = candidates
            .iter()
            .any(|ha1| bool::from(input.compute(ha1).as_bytes().ct_eq(presented.as_bytes())));

        match (matched, status) {
            (false, _) => AuthResult::rejected(),
            (true, NonceStatus::Valid) => match self.commit_nonce(nonce, count).await {
                NonceStatus::Valid => AuthResult::Authenticated(self.hooks.identify(User::new(username.to_string()))),
                _ => {
                    tracing::debug!(scheme = "digest", "nonce count already used");
                    AuthResult::Unauthenticated { stale: true }
                }
            },
            (true, _) => AuthResult::Unauthenticated { stale: true },
        }
    }
}

hook_builders!(DigestAuth);

impl fmt::Debug for DigestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuth")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl AuthBackend for DigestAuth {
    fn name(&self) -> &'static str {
        "digest"
    }

    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, AuthResult> {
        Box::pin(async move {
            match credentials(req, "Digest") {
                Some(header) => self.verify(req, header).await,
                None => AuthResult::rejected(),
            }
        })
    }

    fn challenge<'a>(&'a self, req: &'a Request, stale: bool) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let (nonce, opaque) = self.issue(req).await;
            let mut challenge = format!(
                "Digest realm={},nonce={},opaque={},algorithm={}",
                quote(&self.config.realm),
                quote(&nonce),
                quote(&opaque),
                self.config.algorithm,
            );
            if self.config.qop_auth {
                challenge.push_str(",qop=\"auth\"");
            }
            if stale {
                challenge.push_str(",stale=TRUE");
            }
            Some(challenge)
        })
    }

    fn hooks(&self) -> &BackendHooks {
        &self.hooks
    }

    fn schemes(&self) -> Vec<SchemeDoc> {
        vec![SchemeDoc {
            kind: SchemeKind::Digest,
            scheme: Some("Digest".to_string()),
            header: None,
            realm: self.config.realm.clone(),
        }]
    }
}

/// A parsed `WWW-Authenticate: Digest` challenge, for clients.
///
/// # Example
///
/// ```
/// use dyne_auth::DigestChallenge;
/// use http::Method;
///
/// let challenge = DigestChallenge::parse(
///     r#"Digest realm="api",nonce="abc",opaque="xyz",algorithm=MD5,qop="auth""#,
/// ).unwrap();
/// let header = challenge.respond(&Method::GET, "/secret", "john", "hello", 1, "0a4f113b");
/// assert!(header.starts_with("Digest username=\"john\""));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    /// Protection realm.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Opaque value to echo back.
    pub opaque: Option<String>,
    /// Hash algorithm.
    pub algorithm: Algorithm,
    /// Whether the server offered `qop="auth"`.
    pub qop_auth: bool,
    /// Whether the previous attempt used a stale nonce.
    pub stale: bool,
}

impl DigestChallenge {
    /// Parses a `WWW-Authenticate` header value.
    pub fn parse(header: &str) -> Result<Self, AuthError> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
        if !scheme.eq_ignore_ascii_case("Digest") {
            return Err(AuthError::MalformedHeader(format!("expected Digest scheme, got `{scheme}`")));
        }
        let params = parse_params(rest)?;
        let realm = params.get("realm").cloned().ok_or(AuthError::MissingParam("realm"))?;
        let nonce = params.get("nonce").cloned().ok_or(AuthError::MissingParam("nonce"))?;
        let algorithm = match params.get("algorithm") {
            Some(name) => name.parse()?,
            None => Algorithm::Md5,
        };
        let qop_auth = match params.get("qop") {
            Some(qop) if qop.split(',').any(|q| q.trim() == "auth") => true,
            Some(qop) => return Err(AuthError::UnsupportedQop(qop.clone())),
            None => false,
        };
        Ok(Self {
            realm,
            nonce,
            opaque: params.get("opaque").cloned(),
            algorithm,
            qop_auth,
            stale: params.get("stale").is_some_and(|s| s.eq_ignore_ascii_case("true")),
        })
    }

    /// `Authorization` header value for a plaintext password.
    #[must_use]
    pub fn respond(&self, method: &http::Method, uri: &str, username: &str, password: &str, nc: u32, cnonce: &str) -> String {
        let ha1 = digest_ha1(username, &self.realm, password);
        self.respond_with_ha1(method, uri, username, &ha1, nc, cnonce)
    }

    /// `Authorization` header value for a precomputed HA1.
    #[must_use]
    pub fn respond_with_ha1(&self, method: &http::Method, uri: &str, username: &str, ha1: &str, nc: u32, cnonce: &str) -> String {
        let nc = format!("{nc:08x}");
        let input = ResponseInput {
            algorithm: self.algorithm,
            method: method.as_str(),
            uri,
            nonce: &self.nonce,
            qop: self.qop_auth.then_some((nc.as_str(), cnonce)),
        };
        let response = input.compute(ha1);

        let mut header = format!(
            "Digest username={},realm={},nonce={},uri={},response={},algorithm={}",
            quote(username),
            quote(&self.realm),
            quote(&self.nonce),
            quote(uri),
            quote(&response),
            self.algorithm,
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(",opaque={}", quote(opaque)));
        }
        if self.qop_auth {
            header.push_str(&format!(",qop=auth,nc={nc},cnonce={}", quote(cnonce)));
        }
        header
    }
}
