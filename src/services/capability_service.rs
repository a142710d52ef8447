//! Temporary-access URLs.
//!
//! A capability URL has the form
//! `{base}/temp/{percent-encoded key}?expires={unix secs}&token={token}` where
//! the token signs `"{key}:{expires}"`. Anyone holding the URL may read the
//! object until `expires` has passed; tokens are reusable until then.

use super::{clock::Clock, token_codec::TokenCodec};
use std::sync::Arc;
use url::Url;

/// Result of checking an incoming `(key, expires, token)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Expired,
    Invalid,
    Malformed,
}

/// A freshly minted capability URL and the parts it embeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityUrl {
    pub url: String,
    pub expires: i64,
    pub token: String,
}

#[derive(Clone)]
pub struct CapabilityUrlService {
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
}

impl CapabilityUrlService {
    pub fn new(codec: TokenCodec, clock: Arc<dyn Clock>) -> Self {
        Self { codec, clock }
    }

    /// Mint a URL that stays valid for `ttl_secs` from now.
    pub fn mint(
        &self,
        key: &str,
        ttl_secs: u64,
        base_url: &str,
    ) -> Result<CapabilityUrl, url::ParseError> {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let expires = self.clock.now_unix().saturating_add(ttl);
        self.mint_until(key, expires, base_url)
    }

    /// Mint a URL with an absolute expiry. Same inputs give the same URL.
    pub fn mint_until(
        &self,
        key: &str,
        expires: i64,
        base_url: &str,
    ) -> Result<CapabilityUrl, url::ParseError> {
        let token = self.codec.sign(&canonical_payload(key, expires));

        let mut url = Url::parse(base_url)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push("temp")
            .push(key);
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("token", &token);

        Ok(CapabilityUrl {
            url: url.into(),
            expires,
            token,
        })
    }

    /// Check a request against the current clock.
    pub fn verify(&self, key: &str, expires: Option<&str>, token: Option<&str>) -> Verification {
        self.verify_at(key, expires, token, self.clock.now_unix())
    }

    /// Checks run in a fixed order: presence, integer parse, expiry, signature.
    /// An expired link is reported as expired even when its token is forged.
    pub fn verify_at(
        &self,
        key: &str,
        expires: Option<&str>,
        token: Option<&str>,
        now: i64,
    ) -> Verification {
        let (Some(expires), Some(token)) = (
            expires.filter(|e| !e.is_empty()),
            token.filter(|t| !t.is_empty()),
        ) else {
            return Verification::Malformed;
        };
        let Ok(expires) = expires.parse::<i64>() else {
            return Verification::Malformed;
        };
        if expires < now {
            return Verification::Expired;
        }
        if !self.codec.verify(&canonical_payload(key, expires), token) {
            return Verification::Invalid;
        }
        Verification::Valid
    }
}

fn canonical_payload(key: &str, expires: i64) -> String {
    format!("{}:{}", key, expires)
}
