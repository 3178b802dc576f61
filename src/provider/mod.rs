//! Orchestration of tokens, revocation, SAML and OAuth logins into sessions, and the
//! daemon wiring.

pub mod linker;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{event, Level};

use crate::captcha::{self, CaptchaProvider};
use crate::config::Config;
use crate::core::types::Role;
use crate::csrf::{CsrfBackend, CsrfStore, MemoryCsrfStore};
use crate::db::DbStore;
use crate::error::Error;
use crate::http::server::Server;
use crate::oauth::{AuthorizationStart, CallbackState, OAuthFlows};
use crate::revocation::{MemoryLedger, RevocationLedger};
use crate::saml::{
    InMemoryRegistry, LoginStart, LoginSurface, MemoryReplayLedger, MetadataFetcher,
    ReplayGuard, ReplayLedger, SamlEngine,
};
use crate::sweep::{Sweep, Sweeper};
use crate::token::{TokenClaims, TokenService};
use crate::util::clock::SystemClock;

pub use linker::{IdentityLinker, StatelessLinker};

/// Credentials handed to a client after sign-in or refresh.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

#[derive(Debug)]
pub struct IdentityProvider {
    tokens: TokenService,
    ledger: Arc<dyn RevocationLedger>,
    saml: SamlEngine,
    oauth: OAuthFlows,
    captcha: Option<Arc<dyn CaptchaProvider>>,
    linker: Arc<dyn IdentityLinker>,
}

impl IdentityProvider {
    pub fn new(
        tokens: TokenService,
        ledger: Arc<dyn RevocationLedger>,
        saml: SamlEngine,
        oauth: OAuthFlows,
        captcha: Option<Arc<dyn CaptchaProvider>>,
        linker: Arc<dyn IdentityLinker>,
    ) -> Self {
        Self {
            tokens,
            ledger,
            saml,
            oauth,
            captcha,
            linker,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn saml(&self) -> &SamlEngine {
        &self.saml
    }

    fn check_not_revoked(&self, claims: &TokenClaims) -> Result<(), Error> {
        if self.ledger.is_revoked(&claims.jti)? {
            event!(Level::DEBUG, jti = ?claims.jti, "Token revoked");
            return Err(Error::TokenRevoked);
        }

        if let Some(user_id) = claims.user_id() {
            if let Some(cutoff) = self.ledger.user_revoked_at(user_id)? {
                if claims.issued_at_millis() <= cutoff.timestamp_millis() {
                    event!(Level::DEBUG, %cutoff, "Token predates user revocation");
                    return Err(Error::TokenRevoked);
                }
            }
        }
        Ok(())
    }

    /// Validates an access token and checks it against the revocation ledger.
    #[tracing::instrument(skip_all)]
    pub fn authenticate(&self, access_token: &str) -> Result<TokenClaims, Error> {
        let claims = self.tokens.validate_access(access_token)?;
        self.check_not_revoked(&claims)?;
        Ok(claims)
    }

    /// Trades a refresh token for a new access token. The new token is bound to a new
    /// session id.
    #[tracing::instrument(skip_all)]
    pub fn refresh(&self, refresh_token: &str) -> Result<Session, Error> {
        let claims = self.tokens.validate_refresh(refresh_token)?;
        self.check_not_revoked(&claims)?;

        let (access_token, session_id) = self.tokens.mint_access(&claims.identity())?;
        event!(Level::DEBUG, sub = %claims.sub, "Refreshed session");
        Ok(Session {
            access_token,
            token_type: TokenService::token_type(),
            expires_in: self.tokens.config().access_ttl.num_seconds(),
            refresh_token: None,
            session_id: Some(session_id.0),
            redirect_to: None,
        })
    }

    /// Revokes one token until its own expiry. Already expired tokens need nothing.
    #[tracing::instrument(skip(self, token))]
    pub fn revoke(&self, token: &str, reason: &str) -> Result<(), Error> {
        let claims = match self.tokens.validate_any(token) {
            Ok(claims) => claims,
            Err(Error::TokenExpired) => {
                event!(Level::DEBUG, "Revocation of an expired token ignored");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if claims.role == Role::ServiceRole {
            event!(Level::WARN, "Refusing to revoke a service_role token");
            return Err(Error::CannotRevokeServiceRole);
        }

        let expires_at = Utc
            .timestamp_opt(claims.exp as i64, 0)
            .single()
            .ok_or(Error::TokenInvalid)?;
        self.ledger
            .add(&claims.jti, claims.user_id(), reason, expires_at)?;

        event!(Level::INFO, jti = ?claims.jti, "Token revoked");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn revoke_all_for_user(&self, user_id: &str, reason: &str) -> Result<(), Error> {
        self.ledger.revoke_all_for_user(user_id, reason)?;
        event!(Level::INFO, "Revoked all tokens of user");
        Ok(())
    }

    /// Mints an anonymous session, gated by CAPTCHA when one is configured.
    #[tracing::instrument(skip(self, captcha_token))]
    pub async fn anonymous_sign_in(
        &self,
        captcha_token: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Result<Session, Error> {
        if let Some(captcha) = &self.captcha {
            let token = captcha_token.ok_or(Error::CaptchaFailed)?;
            if !captcha.verify(token, remote_ip).await? {
                event!(Level::DEBUG, "Anonymous sign-in failed CAPTCHA");
                return Err(Error::CaptchaFailed);
            }
        }

        Ok(Session {
            access_token: self.tokens.mint_anonymous()?,
            token_type: TokenService::token_type(),
            expires_in: self.tokens.config().anonymous_ttl.num_seconds(),
            refresh_token: None,
            session_id: None,
            redirect_to: None,
        })
    }

    pub fn saml_metadata(&self, provider: &str) -> Result<String, Error> {
        self.saml.sp_metadata(provider)
    }

    pub fn saml_login(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
        surface: LoginSurface,
    ) -> Result<LoginStart, Error> {
        self.saml.start_login(provider, redirect_to, surface)
    }

    /// Validates a SAML response and opens a session for the linked user.
    #[tracing::instrument(skip(self, saml_response, relay_state))]
    pub fn saml_acs(
        &self,
        provider: &str,
        saml_response: &str,
        relay_state: Option<&str>,
    ) -> Result<Session, Error> {
        let login = self.saml.consume(provider, saml_response, relay_state)?;
        let identity = self.linker.link(&login)?;
        let issued = self.tokens.issue(&identity)?;

        Ok(Session {
            access_token: issued.access_token,
            token_type: TokenService::token_type(),
            expires_in: issued.expires_in,
            refresh_token: Some(issued.refresh_token),
            session_id: Some(issued.session_id.0),
            redirect_to: login.redirect_to,
        })
    }

    pub fn oauth_authorize(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
    ) -> Result<AuthorizationStart, Error> {
        self.oauth.begin(provider, redirect_to)
    }

    pub fn oauth_callback(&self, provider: &str, state: &str) -> Result<CallbackState, Error> {
        self.oauth.callback(provider, state)
    }
}

async fn shinraid(config: Config) -> Result<(), Error> {
    let clock = Arc::new(SystemClock);
    let providers = config.providers()?;

    let store = match &config.database_url {
        Some(url) => {
            let store = Arc::new(DbStore::acquire(url)?.with_clock(clock.clone()));
            store.migrate()?;
            Some(store)
        }
        None => {
            event!(Level::WARN, "DATABASE_URL not set, ledgers are process-local");
            None
        }
    };

    let mut sweeper = Sweeper::new(config.sweep_interval());

    let (ledger, replay): (Arc<dyn RevocationLedger>, Arc<dyn ReplayLedger>) = match &store {
        Some(store) => {
            sweeper = sweeper.with(store.clone() as Arc<dyn Sweep>);
            (
                store.clone() as Arc<dyn RevocationLedger>,
                store.clone() as Arc<dyn ReplayLedger>,
            )
        }
        None => {
            let ledger = Arc::new(MemoryLedger::with_clock(clock.clone()));
            let replay = Arc::new(MemoryReplayLedger::with_clock(clock.clone()));
            sweeper = sweeper
                .with(ledger.clone() as Arc<dyn Sweep>)
                .with(replay.clone() as Arc<dyn Sweep>);
            (ledger, replay)
        }
    };

    let csrf: Arc<dyn CsrfStore> = match (config.csrf_backend, &store) {
        (CsrfBackend::Database, Some(store)) => store.clone() as Arc<dyn CsrfStore>,
        (CsrfBackend::Database, None) => {
            return Err(Error::Config(
                "CSRF_BACKEND=database requires DATABASE_URL".to_string(),
            ))
        }
        (CsrfBackend::Memory, _) => {
            let memory = Arc::new(MemoryCsrfStore::with_clock(clock.clone()));
            sweeper = sweeper.with(memory.clone() as Arc<dyn Sweep>);
            memory
        }
    };

    let saml = SamlEngine::new(
        Arc::new(InMemoryRegistry::default()),
        MetadataFetcher::new(config.metadata_timeout(), config.allow_insecure_metadata),
        csrf.clone(),
        ReplayGuard::new(replay),
        clock.clone(),
    );
    let registered = saml.register_all(providers.saml).await;
    event!(Level::INFO, registered, "SAML providers ready");

    let captcha = providers
        .captcha
        .as_ref()
        .map(captcha::from_config)
        .transpose()?;

    let provider = Arc::new(IdentityProvider::new(
        TokenService::with_clock(config.jwt_secret.as_bytes(), config.token_config(), clock),
        ledger,
        saml,
        OAuthFlows::new(providers.oauth, csrf),
        captcha,
        Arc::new(StatelessLinker),
    ));

    let sweeper = sweeper.spawn();

    let server = Server::new(provider);
    server.serve(config.listen_addr).await;

    sweeper.shutdown().await;
    Ok(())
}

pub async fn main() -> Result<(), Error> {
    use clap::Parser;

    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();
    let config = Config::parse();
    shinraid(config).await
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;

    use super::*;
    use crate::token::{TokenConfig, UserIdentity};
    use crate::util::clock::{Clock, FixedClock};

    pub(crate) struct Fixture {
        pub clock: Arc<FixedClock>,
        pub provider: IdentityProvider,
    }

    pub(crate) fn fixture_with(captcha: Option<Arc<dyn CaptchaProvider>>) -> Fixture {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let csrf = Arc::new(MemoryCsrfStore::with_clock(clock.clone()));
        let saml = SamlEngine::new(
            Arc::new(InMemoryRegistry::default()),
            MetadataFetcher::new(StdDuration::from_secs(1), false),
            csrf.clone(),
            ReplayGuard::new(Arc::new(MemoryReplayLedger::with_clock(clock.clone()))),
            clock.clone(),
        );
        let provider = IdentityProvider::new(
            TokenService::with_clock(
                b"test-signing-secret",
                TokenConfig::with_issuer("shinrai"),
                clock.clone(),
            ),
            Arc::new(MemoryLedger::with_clock(clock.clone())),
            saml,
            OAuthFlows::new(Vec::new(), csrf),
            captcha,
            Arc::new(StatelessLinker),
        );
        Fixture { clock, provider }
    }

    pub(crate) fn fixture() -> Fixture {
        fixture_with(None)
    }

    fn user() -> UserIdentity {
        UserIdentity::new("user-1", Role::Authenticated).with_email("ada@example.com")
    }

    #[test]
    fn revoked_access_token_fails_authentication() {
        let f = fixture();
        let issued = f.provider.tokens().issue(&user()).unwrap();
        assert!(f.provider.authenticate(&issued.access_token).is_ok());

        f.provider.revoke(&issued.access_token, "logout").unwrap();
        assert!(matches!(
            f.provider.authenticate(&issued.access_token),
            Err(Error::TokenRevoked)
        ));
    }

    #[test]
    fn service_role_tokens_cannot_be_revoked() {
        let f = fixture();
        let token = f.provider.tokens().mint_service().unwrap();
        assert!(matches!(
            f.provider.revoke(&token, "oops"),
            Err(Error::CannotRevokeServiceRole)
        ));
        assert!(f.provider.authenticate(&token).is_ok());
    }

    #[test]
    fn anonymous_tokens_can_be_revoked() {
        let f = fixture();
        let token = f.provider.tokens().mint_anonymous().unwrap();
        f.provider.revoke(&token, "abuse").unwrap();
        assert!(matches!(
            f.provider.authenticate(&token),
            Err(Error::TokenRevoked)
        ));
    }

    #[test]
    fn refresh_yields_new_session_for_same_user() {
        let f = fixture();
        let issued = f.provider.tokens().issue(&user()).unwrap();
        let session = f.provider.refresh(&issued.refresh_token).unwrap();

        let claims = f.provider.authenticate(&session.access_token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "ada@example.com");
        assert_ne!(session.session_id, Some(issued.session_id.0));
    }

    #[test]
    fn refresh_rejects_access_tokens_and_revoked_refresh_tokens() {
        let f = fixture();
        let issued = f.provider.tokens().issue(&user()).unwrap();
        assert!(matches!(
            f.provider.refresh(&issued.access_token),
            Err(Error::TokenInvalid)
        ));

        f.provider.revoke(&issued.refresh_token, "logout").unwrap();
        assert!(matches!(
            f.provider.refresh(&issued.refresh_token),
            Err(Error::TokenRevoked)
        ));
    }

    #[test]
    fn user_cutoff_covers_earlier_tokens_only() {
        let f = fixture();
        f.clock.set(f.clock.now() - Duration::seconds(30));
        let before = f.provider.tokens().issue(&user()).unwrap();

        f.clock.advance(Duration::seconds(5));
        f.provider.revoke_all_for_user("user-1", "password reset").unwrap();
        assert!(matches!(
            f.provider.authenticate(&before.access_token),
            Err(Error::TokenRevoked)
        ));
        assert!(matches!(
            f.provider.refresh(&before.refresh_token),
            Err(Error::TokenRevoked)
        ));

        f.clock.advance(Duration::seconds(5));
        let after = f.provider.tokens().issue(&user()).unwrap();
        assert!(f.provider.authenticate(&after.access_token).is_ok());
    }

    #[test]
    fn user_cutoff_is_millisecond_precise() {
        let f = fixture();
        let second = Utc.timestamp_opt(f.clock.now().timestamp() - 30, 0).unwrap();
        f.clock.set(second + Duration::milliseconds(100));
        let before = f.provider.tokens().issue(&user()).unwrap();

        f.clock.set(second + Duration::milliseconds(200));
        f.provider.revoke_all_for_user("user-1", "sign out everywhere").unwrap();

        f.clock.set(second + Duration::milliseconds(300));
        let after = f.provider.tokens().issue(&user()).unwrap();

        assert!(matches!(
            f.provider.authenticate(&before.access_token),
            Err(Error::TokenRevoked)
        ));
        assert!(f.provider.authenticate(&after.access_token).is_ok());
        assert!(f.provider.refresh(&after.refresh_token).is_ok());
    }

    #[test]
    fn revoking_an_expired_token_is_a_no_op() {
        let f = fixture();
        let now = f.clock.now();
        f.clock.set(now - Duration::hours(3));
        let issued = f.provider.tokens().issue(&user()).unwrap();
        f.clock.set(now);

        assert!(matches!(
            f.provider.tokens().validate_any(&issued.access_token),
            Err(Error::TokenExpired)
        ));
        assert!(f.provider.revoke(&issued.access_token, "late").is_ok());
    }

    #[tokio::test]
    async fn anonymous_sign_in_without_captcha() {
        let f = fixture();
        let session = f.provider.anonymous_sign_in(None, None).await.unwrap();
        let claims = f.provider.authenticate(&session.access_token).unwrap();
        assert!(claims.is_anonymous);
        assert!(session.refresh_token.is_none());
    }

    #[derive(Debug)]
    struct Always(bool);

    #[async_trait::async_trait]
    impl CaptchaProvider for Always {
        async fn verify(&self, _token: &str, _ip: Option<&str>) -> Result<bool, Error> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn anonymous_sign_in_is_gated_by_captcha() {
        let f = fixture_with(Some(Arc::new(Always(false))));
        assert!(matches!(
            f.provider.anonymous_sign_in(Some("t"), None).await,
            Err(Error::CaptchaFailed)
        ));
        assert!(matches!(
            f.provider.anonymous_sign_in(None, None).await,
            Err(Error::CaptchaFailed)
        ));

        let f = fixture_with(Some(Arc::new(Always(true))));
        assert!(f.provider.anonymous_sign_in(Some("t"), None).await.is_ok());
    }
}
