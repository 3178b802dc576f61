//! Signed session tokens.
//!
//! [`TokenService`] mints and verifies HS256 JWTs. It holds nothing mutable besides the
//! signing key, so one instance is shared by every request.

pub mod claims;
pub mod codec;
mod issue;
mod validate;

use std::sync::Arc;

use chrono::Duration;

pub use claims::{
    ApiKeyClaims, Principal, TokenClaims, TokenKind, UserIdentity, ANONYMOUS_SUBJECT,
    SERVICE_SUBJECT,
};
pub use codec::TokenCodec;
pub use issue::IssuedTokens;

use crate::util::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    /// Other issuers whose API-key tokens are honoured.
    pub accepted_issuers: Vec<String>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub anonymous_ttl: Duration,
    pub service_ttl: Duration,
}

impl TokenConfig {
    pub fn with_issuer(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            accepted_issuers: Vec::new(),
            access_ttl: Duration::hours(1),
            refresh_ttl: Duration::days(7),
            anonymous_ttl: Duration::hours(1),
            service_ttl: Duration::days(365),
        }
    }
}

#[derive(Debug)]
pub struct TokenService {
    codec: TokenCodec,
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(secret: &[u8], config: TokenConfig) -> Self {
        Self::with_clock(secret, config, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: &[u8], config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            codec: TokenCodec::from_secret(secret),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn token_type() -> &'static str {
        "bearer"
    }
}
