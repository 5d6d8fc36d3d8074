//! API key verification.
//!
//! The configured secret is never compared directly: it is tagged once with a
//! random per-process HMAC key, and presented keys are checked with
//! `ring::hmac::verify`, which compares tags in constant time.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use ring::{hmac, rand::SystemRandom};
use std::fmt;
use thiserror::Error;

use crate::errors::{Error, Result};

/// Alternate header carrying the raw key
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials: send 'Authorization: Bearer <key>' or 'X-Api-Key: <key>'")]
    MissingCredentials,
    #[error("invalid API key")]
    InvalidCredentials,
}

pub struct ApiKeyVerifier {
    key: hmac::Key,
    expected: hmac::Tag,
}

impl ApiKeyVerifier {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::config("API key cannot be empty"));
        }

        let rng = SystemRandom::new();
        let key = hmac::Key::generate(hmac::HMAC_SHA256, &rng)
            .map_err(|_| Error::internal("failed to generate API key verification key"))?;
        let expected = hmac::sign(&key, secret.as_bytes());

        Ok(Self { key, expected })
    }

    /// Constant-time check of a single presented key
    pub fn matches(&self, presented: &str) -> bool {
        hmac::verify(&self.key, presented.as_bytes(), self.expected.as_ref()).is_ok()
    }

    /// Check the request headers.
    ///
    /// `Authorization: Bearer` is tried first, then `X-Api-Key`; either
    /// matching is enough.
    pub fn verify_headers(&self, headers: &HeaderMap) -> std::result::Result<(), AuthError> {
        let presented = presented_keys(headers);
        if presented.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        if presented.iter().any(|candidate| self.matches(candidate)) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

impl fmt::Debug for ApiKeyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyVerifier").finish_non_exhaustive()
    }
}

/// Keys presented by the caller, in precedence order
fn presented_keys(headers: &HeaderMap) -> Vec<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|token| !token.is_empty());

    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty());

    bearer.into_iter().chain(api_key).collect()
}
