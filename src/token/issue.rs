use chrono::Duration;
use tracing::{event, Level};

use super::claims::{TokenClaims, TokenKind, UserIdentity, ANONYMOUS_SUBJECT, SERVICE_SUBJECT};
use super::TokenService;
use crate::core::types::{Role, SessionId, TokenId};
use crate::error::Error;
use crate::util::random::FromRandom;

#[derive(Debug, Clone, serde::Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: SessionId,
    pub expires_in: i64,
}

impl TokenService {
    /// Access and refresh token bound to one fresh session.
    #[tracing::instrument(skip_all, fields(sub = %identity.subject, role = %identity.role))]
    pub fn issue(&self, identity: &UserIdentity) -> Result<IssuedTokens, Error> {
        Self::check_user_role(identity)?;
        let session_id = SessionId::from_random();

        let access_token = self.mint(
            TokenKind::Access,
            identity,
            Some(session_id.clone()),
            false,
            self.config.access_ttl,
        )?;
        let refresh_token = self.mint(
            TokenKind::Refresh,
            identity,
            Some(session_id.clone()),
            false,
            self.config.refresh_ttl,
        )?;

        event!(Level::DEBUG, session = ?session_id, "Issued token pair");
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            session_id,
            expires_in: self.config.access_ttl.num_seconds(),
        })
    }

    /// Every call opens a new session id, including calls made on refresh.
    #[tracing::instrument(skip_all, fields(sub = %identity.subject))]
    pub fn mint_access(&self, identity: &UserIdentity) -> Result<(String, SessionId), Error> {
        Self::check_user_role(identity)?;
        let session_id = SessionId::from_random();
        let token = self.mint(
            TokenKind::Access,
            identity,
            Some(session_id.clone()),
            false,
            self.config.access_ttl,
        )?;
        Ok((token, session_id))
    }

    #[tracing::instrument(skip(self))]
    pub fn mint_anonymous(&self) -> Result<String, Error> {
        let identity = UserIdentity::new(ANONYMOUS_SUBJECT, Role::Anon);
        self.mint(
            TokenKind::Access,
            &identity,
            None,
            true,
            self.config.anonymous_ttl,
        )
    }

    #[tracing::instrument(skip(self))]
    pub fn mint_service(&self) -> Result<String, Error> {
        let identity = UserIdentity::new(SERVICE_SUBJECT, Role::ServiceRole);
        self.mint(
            TokenKind::Access,
            &identity,
            None,
            false,
            self.config.service_ttl,
        )
    }

    fn check_user_role(identity: &UserIdentity) -> Result<(), Error> {
        match identity.role {
            Role::Anon | Role::ServiceRole => Err(Error::Config(format!(
                "role {} is reserved for synthetic identities",
                identity.role
            ))),
            _ => Ok(()),
        }
    }

    fn mint(
        &self,
        kind: TokenKind,
        identity: &UserIdentity,
        session_id: Option<SessionId>,
        is_anonymous: bool,
        ttl: Duration,
    ) -> Result<String, Error> {
        let now = self.clock.now();
        let iat = now.timestamp().max(0) as u64;
        let exp = (now + ttl).timestamp().max(0) as u64;

        let claims = TokenClaims {
            iss: self.config.issuer.clone(),
            sub: identity.subject.clone(),
            iat,
            iat_ms: Some(now.timestamp_millis()),
            nbf: iat,
            exp,
            jti: TokenId::from_random(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role.clone(),
            session_id,
            token_type: kind,
            is_anonymous,
            user_metadata: identity.user_metadata.clone(),
            app_metadata: identity.app_metadata.clone(),
        };

        event!(Level::TRACE, ?kind, jti = ?claims.jti, "Signing token");
        self.codec.encode(&claims)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::service;
    use super::*;

    #[test]
    fn pair_shares_one_session() {
        let tokens = service();
        let issued = tokens
            .issue(&UserIdentity::new("user-1", Role::Authenticated))
            .unwrap();
        let access = tokens.validate_access(&issued.access_token).unwrap();
        let refresh = tokens.validate_refresh(&issued.refresh_token).unwrap();
        assert_eq!(access.session_id, Some(issued.session_id.clone()));
        assert_eq!(refresh.session_id, Some(issued.session_id));
        assert_ne!(access.jti, refresh.jti);
    }

    #[test]
    fn each_access_mint_opens_a_new_session() {
        let tokens = service();
        let identity = UserIdentity::new("user-1", Role::Authenticated);
        let (_, first) = tokens.mint_access(&identity).unwrap();
        let (_, second) = tokens.mint_access(&identity).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn synthetic_tokens_have_no_session() {
        let tokens = service();
        let anon = tokens.validate_access(&tokens.mint_anonymous().unwrap()).unwrap();
        assert_eq!(anon.sub, ANONYMOUS_SUBJECT);
        assert_eq!(anon.role, Role::Anon);
        assert!(anon.is_anonymous);
        assert!(anon.session_id.is_none());

        let service_claims = tokens.validate_access(&tokens.mint_service().unwrap()).unwrap();
        assert_eq!(service_claims.sub, SERVICE_SUBJECT);
        assert_eq!(service_claims.role, Role::ServiceRole);
        assert!(service_claims.session_id.is_none());
    }

    #[test]
    fn service_tokens_outlive_access_tokens() {
        let tokens = service();
        let access = tokens
            .validate_access(
                &tokens
                    .mint_access(&UserIdentity::new("u", Role::Authenticated))
                    .unwrap()
                    .0,
            )
            .unwrap();
        let service_claims = tokens.validate_access(&tokens.mint_service().unwrap()).unwrap();
        assert!(service_claims.exp > access.exp);
    }

    #[test]
    fn users_cannot_claim_synthetic_roles() {
        let tokens = service();
        let result = tokens.issue(&UserIdentity::new("user-1", Role::ServiceRole));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
