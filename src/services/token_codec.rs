//! HMAC-SHA256 access tokens.
//!
//! A token is the URL-safe, unpadded base64 encoding of
//! `HMAC-SHA256(secret, payload)`. Tokens are never stored; verification
//! recomputes the MAC and compares in constant time.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Process-wide signing key. Loaded once at startup and never printed.
#[derive(Clone)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(***)")
    }
}

/// Signs and verifies opaque string payloads.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl TokenCodec {
    pub fn new(secret: &SigningSecret) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_bytes())?,
        })
    }

    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Returns `false` for any mismatch, including tokens of the wrong length.
    pub fn verify(&self, payload: &str, token: &str) -> bool {
        let expected = self.sign(payload);
        expected.as_bytes().ct_eq(token.as_bytes()).into()
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}
