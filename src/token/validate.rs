use tracing::{event, Level};

use super::claims::{ApiKeyClaims, TokenClaims, TokenKind};
use super::codec::TokenCodec;
use super::TokenService;
use crate::error::Error;

impl TokenService {
    /// Verifies signature, algorithm, issuer and expiry, then insists on `kind`.
    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, Error> {
        let claims = self.validate_any(token)?;
        if claims.token_type != kind {
            event!(
                Level::DEBUG,
                expected = ?kind,
                presented = ?claims.token_type,
                "Token presented for the wrong purpose"
            );
            return Err(Error::TokenInvalid);
        }
        Ok(claims)
    }

    pub fn validate_access(&self, token: &str) -> Result<TokenClaims, Error> {
        self.validate(token, TokenKind::Access)
    }

    pub fn validate_refresh(&self, token: &str) -> Result<TokenClaims, Error> {
        self.validate(token, TokenKind::Refresh)
    }

    /// Like [`validate`](Self::validate) without the kind check.
    pub fn validate_any(&self, token: &str) -> Result<TokenClaims, Error> {
        let mut validation = TokenCodec::validation();
        validation.iss = Some(self.config.issuer.clone());
        self.codec.decode::<TokenClaims>(token, &validation)
    }

    /// Validation for anon/service/authenticated client keys. Compatible issuers are
    /// accepted, but the role must be one of the three built-in roles.
    pub fn validate_api_key(&self, token: &str) -> Result<ApiKeyClaims, Error> {
        let validation = TokenCodec::validation();
        let claims = self.codec.decode::<ApiKeyClaims>(token, &validation)?;

        let issuer_known = claims.iss == self.config.issuer
            || self.config.accepted_issuers.iter().any(|i| i == &claims.iss);
        if !issuer_known {
            event!(Level::WARN, iss = %claims.iss, "API key from unrecognized issuer");
            return Err(Error::TokenInvalid);
        }

        if !claims.role.is_api_key_role() {
            event!(Level::WARN, role = %claims.role, "API key carries unsupported role");
            return Err(Error::TokenInvalid);
        }

        Ok(claims)
    }
}
