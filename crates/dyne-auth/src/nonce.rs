//! Digest nonce and opaque lifecycle.
//!
//! The default [`SignedNonces`] is stateless: a nonce is
//! `hex(issued_at).hex(random).hex(mac)` where `mac` is HMAC-SHA256 over the
//! first two parts, so any instance holding the key can check it without
//! shared state. The opaque value is an HMAC of the nonce, binding the pair.
//!
//! [`InMemoryNonceStore`] adds server-side tracking on top: issued nonces are
//! remembered until they expire, and the highest nonce count seen per nonce
//! is recorded so a replayed request is answered with a stale challenge.
//!
//! Checking and recording are separate steps. A presented nonce is checked
//! first, and its count is committed only after the digest response proved
//! the password, so a forged request cannot use up a client's count.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use dyne_core::BoxFuture;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Result of checking a presented nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    /// Issued by us, unexpired, not replayed.
    Valid,
    /// Issued by us but expired or replayed; the client should retry.
    Stale,
    /// Not something we issued.
    Invalid,
}

/// Issues and checks digest nonces and opaque values.
///
/// Every operation may suspend, so a store can live in a shared cache.
pub trait NonceManager: Send + Sync + 'static {
    /// A fresh nonce for a challenge.
    fn generate_nonce(&self) -> BoxFuture<'_, String>;

    /// The opaque value paired with `nonce`.
    fn generate_opaque<'a>(&'a self, nonce: &'a str) -> BoxFuture<'a, String>;

    /// Checks a nonce presented with nonce count `nc` (absent without qop).
    /// Records nothing.
    fn check_nonce<'a>(&'a self, nonce: &'a str, nc: Option<u32>) -> BoxFuture<'a, NonceStatus>;

    /// Records that an authenticated request used `nonce` with count `nc`.
    ///
    /// Returns [`NonceStatus::Stale`] if another request committed the same
    /// or a higher count first. Stateless managers have nothing to record.
    fn commit_nonce<'a>(&'a self, _nonce: &'a str, _nc: Option<u32>) -> BoxFuture<'a, NonceStatus> {
        Box::pin(async { NonceStatus::Valid })
    }

    /// Checks that `opaque` was issued with `nonce`.
    fn verify_opaque<'a>(&'a self, nonce: &'a str, opaque: &'a str) -> BoxFuture<'a, bool>;
}

/// Stateless HMAC-signed nonces.
#[derive(Clone)]
pub struct SignedNonces {
    mac: HmacSha256,
    ttl: Duration,
}

impl SignedNonces {
    /// Signs with a random per-process key.
    pub fn new(ttl: Duration) -> Result<Self, AuthError> {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::with_secret(&key, ttl)
    }

    /// Signs with a shared key, so several instances accept each other's
    /// nonces.
    pub fn with_secret(secret: &[u8], ttl: Duration) -> Result<Self, AuthError> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self { mac, ttl })
    }

    /// Nonce lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn opaque_for(&self, nonce: &str) -> String {
        hex::encode(self.sign(&[b"opaque:", nonce.as_bytes()]))
    }

    fn sign(&self, parts: &[&[u8]]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        for part in parts {
            mac.update(part);
        }
        mac.finalize().into_bytes().to_vec()
    }

    /// A nonce stamped as issued at `issued_at` (Unix seconds).
    #[must_use]
    pub fn generate_at(&self, issued_at: u64) -> String {
        let mut random = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random);
        let payload = format!("{issued_at:x}.{}", hex::encode(random));
        let tag = self.sign(&[payload.as_bytes()]);
        format!("{payload}.{}", hex::encode(tag))
    }

    /// Signature check and age, without replay tracking.
    fn check(&self, nonce: &str) -> NonceStatus {
        let Some((payload, tag)) = nonce.rsplit_once('.') else {
            return NonceStatus::Invalid;
        };
        let Ok(tag) = hex::decode(tag) else {
            return NonceStatus::Invalid;
        };
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        if mac.verify_slice(&tag).is_err() {
            return NonceStatus::Invalid;
        }
        let issued_at = payload
            .split_once('.')
            .and_then(|(ts, _)| u64::from_str_radix(ts, 16).ok());
        match issued_at {
            Some(ts) if unix_now().saturating_sub(ts) <= self.ttl.as_secs() => NonceStatus::Valid,
            Some(_) => NonceStatus::Stale,
            None => NonceStatus::Invalid,
        }
    }
}

impl std::fmt::Debug for SignedNonces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedNonces").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl NonceManager for SignedNonces {
    fn generate_nonce(&self) -> BoxFuture<'_, String> {
        let nonce = self.generate_at(unix_now());
        Box::pin(async move { nonce })
    }

    fn generate_opaque<'a>(&'a self, nonce: &'a str) -> BoxFuture<'a, String> {
        Box::pin(async move { self.opaque_for(nonce) })
    }

    fn check_nonce<'a>(&'a self, nonce: &'a str, _nc: Option<u32>) -> BoxFuture<'a, NonceStatus> {
        Box::pin(async move { self.check(nonce) })
    }

    fn verify_opaque<'a>(&'a self, nonce: &'a str, opaque: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.opaque_for(nonce).as_bytes().ct_eq(opaque.as_bytes()).into() })
    }
}

#[derive(Debug)]
struct Issued {
    at: Instant,
    max_nc: u32,
}

/// Server-tracked nonces with nonce-count replay detection.
///
/// Safe to share between concurrent requests; two challenges issued at the
/// same time get independent entries.
#[derive(Debug)]
pub struct InMemoryNonceStore {
    signer: SignedNonces,
    issued: DashMap<String, Issued>,
}

impl InMemoryNonceStore {
    /// Tracks nonces signed by `signer`, using its TTL.
    pub fn new(signer: SignedNonces) -> Self {
        Self {
            signer,
            issued: DashMap::new(),
        }
    }

    /// Number of nonces currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    /// Returns true if no nonce is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    /// Drops expired entries.
    pub fn purge_expired(&self) {
        let ttl = self.signer.ttl();
        self.issued.retain(|_, issued| issued.at.elapsed() <= ttl);
    }

    fn check(&self, nonce: &str, nc: Option<u32>) -> NonceStatus {
        let signed = self.signer.check(nonce);
        if signed == NonceStatus::Invalid {
            return NonceStatus::Invalid;
        }
        let Some(issued) = self.issued.get(nonce) else {
            // Ours, but forgotten (expired and purged, or issued before a restart).
            return NonceStatus::Stale;
        };
        if signed == NonceStatus::Stale || issued.at.elapsed() > self.signer.ttl() {
            drop(issued);
            self.issued.remove(nonce);
            return NonceStatus::Stale;
        }
        // Without qop there is no count; a nonce is then good for one request.
        if nc.unwrap_or(1) <= issued.max_nc {
            return NonceStatus::Stale;
        }
        NonceStatus::Valid
    }

    fn commit(&self, nonce: &str, nc: Option<u32>) -> NonceStatus {
        let Some(mut issued) = self.issued.get_mut(nonce) else {
            return NonceStatus::Stale;
        };
        let nc = nc.unwrap_or(1);
        if nc <= issued.max_nc {
            return NonceStatus::Stale;
        }
        issued.max_nc = nc;
        NonceStatus::Valid
    }
}

impl NonceManager for InMemoryNonceStore {
    fn generate_nonce(&self) -> BoxFuture<'_, String> {
        self.purge_expired();
        let nonce = self.signer.generate_at(unix_now());
        self.issued.insert(
            nonce.clone(),
            Issued {
                at: Instant::now(),
                max_nc: 0,
            },
        );
        Box::pin(async move { nonce })
    }

    fn generate_opaque<'a>(&'a self, nonce: &'a str) -> BoxFuture<'a, String> {
        self.signer.generate_opaque(nonce)
    }

    fn check_nonce<'a>(&'a self, nonce: &'a str, nc: Option<u32>) -> BoxFuture<'a, NonceStatus> {
        Box::pin(async move { self.check(nonce, nc) })
    }

    fn commit_nonce<'a>(&'a self, nonce: &'a str, nc: Option<u32>) -> BoxFuture<'a, NonceStatus> {
        Box::pin(async move { self.commit(nonce, nc) })
    }

    fn verify_opaque<'a>(&'a self, nonce: &'a str, opaque: &'a str) -> BoxFuture<'a, bool> {
        self.signer.verify_opaque(nonce, opaque)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> SignedNonces {
        SignedNonces::with_secret(b"test-secret", Duration::from_secs(60)).unwrap()
    }

    #[tokio::test]
    async fn test_signed_nonce_verifies() {
        let nonces = signer();
        let nonce = nonces.generate_nonce().await;
        assert_eq!(nonce.split('.').count(), 3);
        assert_eq!(nonces.check_nonce(&nonce, Some(1)).await, NonceStatus::Valid);
        assert_eq!(nonces.commit_nonce(&nonce, Some(1)).await, NonceStatus::Valid);
    }

    #[tokio::test]
    async fn test_tampered_or_foreign_nonce_is_invalid() {
        let nonces = signer();
        let nonce = nonces.generate_nonce().await;
        let tampered = format!("0{nonce}");
        assert_eq!(nonces.check_nonce(&tampered, None).await, NonceStatus::Invalid);
        assert_eq!(nonces.check_nonce("not-a-nonce", None).await, NonceStatus::Invalid);

        let other = SignedNonces::with_secret(b"other", Duration::from_secs(60)).unwrap();
        assert_eq!(other.check_nonce(&nonce, None).await, NonceStatus::Invalid);
    }

    #[tokio::test]
    async fn test_expired_nonce_is_stale() {
        let nonces = signer();
        let old = nonces.generate_at(unix_now() - 3600);
        assert_eq!(nonces.check_nonce(&old, Some(1)).await, NonceStatus::Stale);
    }

    #[tokio::test]
    async fn test_opaque_is_bound_to_nonce() {
        let nonces = signer();
        let a = nonces.generate_nonce().await;
        let b = nonces.generate_nonce().await;
        let opaque = nonces.generate_opaque(&a).await;
        assert!(nonces.verify_opaque(&a, &opaque).await);
        assert!(!nonces.verify_opaque(&b, &opaque).await);
    }

    #[tokio::test]
    async fn test_store_detects_replayed_count() {
        let store = InMemoryNonceStore::new(signer());
        let nonce = store.generate_nonce().await;
        assert_eq!(store.commit_nonce(&nonce, Some(1)).await, NonceStatus::Valid);
        assert_eq!(store.check_nonce(&nonce, Some(2)).await, NonceStatus::Valid);
        assert_eq!(store.commit_nonce(&nonce, Some(2)).await, NonceStatus::Valid);
        assert_eq!(store.check_nonce(&nonce, Some(2)).await, NonceStatus::Stale);
        assert_eq!(store.check_nonce(&nonce, None).await, NonceStatus::Stale);
    }

    #[tokio::test]
    async fn test_store_check_records_nothing() {
        let store = InMemoryNonceStore::new(signer());
        let nonce = store.generate_nonce().await;
        for _ in 0..3 {
            assert_eq!(store.check_nonce(&nonce, Some(1)).await, NonceStatus::Valid);
        }
        assert_eq!(store.commit_nonce(&nonce, Some(1)).await, NonceStatus::Valid);
        // A second request racing on the same count loses at commit.
        assert_eq!(store.commit_nonce(&nonce, Some(1)).await, NonceStatus::Stale);
    }

    #[tokio::test]
    async fn test_store_legacy_nonce_is_single_use() {
        let store = InMemoryNonceStore::new(signer());
        let nonce = store.generate_nonce().await;
        assert_eq!(store.check_nonce(&nonce, None).await, NonceStatus::Valid);
        assert_eq!(store.commit_nonce(&nonce, None).await, NonceStatus::Valid);
        assert_eq!(store.check_nonce(&nonce, None).await, NonceStatus::Stale);
    }

    #[tokio::test]
    async fn test_store_unknown_signed_nonce_is_stale() {
        let signer = signer();
        let store = InMemoryNonceStore::new(signer.clone());
        let elsewhere = signer.generate_nonce().await;
        assert_eq!(store.check_nonce(&elsewhere, Some(1)).await, NonceStatus::Stale);
        assert_eq!(store.commit_nonce(&elsewhere, Some(1)).await, NonceStatus::Stale);
        assert!(store.is_empty());
    }
}
