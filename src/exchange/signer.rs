//! Private API request signing.
//!
//! `API-Sign = base64(HMAC-SHA512(base64decode(secret), path || SHA256(nonce || body)))`
//!
//! The secret is decoded once at construction; a secret that isn't valid
//! base64 is a configuration error and is never retried.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret, SecretString};
use sha2::{Digest, Sha256, Sha512};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::TradeError;

type HmacSha512 = Hmac<Sha512>;

// ---------------------------------------------------------------------------
// Nonce
// ---------------------------------------------------------------------------

/// Strictly increasing nonce source.
///
/// Uses milliseconds since epoch, bumped past the last issued value when
/// two calls land in the same millisecond (or the clock steps back).
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

pub struct Signer {
    key: Secret<Vec<u8>>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("key", &"[REDACTED]").finish()
    }
}

impl Signer {
    /// Decode the account's base64 private key.
    pub fn new(secret: &SecretString) -> Result<Self, TradeError> {
        let key = STANDARD
            .decode(secret.expose_secret().trim())
            .map_err(|_| TradeError::Configuration("API secret is not valid base64".into()))?;
        if key.is_empty() {
            return Err(TradeError::Configuration("API secret is empty".into()));
        }
        Ok(Self { key: Secret::new(key) })
    }

    /// Sign a request. `body` is the URL-encoded POST body, which must
    /// already contain `nonce=<nonce>`.
    pub fn sign(&self, path: &str, nonce: u64, body: &str) -> String {
        let mut sha = Sha256::new();
        sha.update(nonce.to_string().as_bytes());
        sha.update(body.as_bytes());
        let digest = sha.finalize();

        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = <HmacSha512 as Mac>::new_from_slice(self.key.expose_secret())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(path.as_bytes());
        mac.update(&digest);

        STANDARD.encode(mac.finalize().into_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
