//! SAML 2.0 service-provider engine.
//!
//! A login runs `RequestIssued -> AssertionReceived -> Validated | Rejected`. The engine
//! holds no per-login state of its own: the AuthnRequest id and post-login redirect travel
//! through the [`CsrfStore`] under the RelayState key.

pub mod assertion;
pub mod config;
pub mod groups;
pub mod identity;
pub mod metadata;
pub mod provider;
pub mod registry;
pub mod relay_state;
pub mod replay;

use std::sync::Arc;

use chrono::Duration;
use tracing::{event, Level};

pub use self::assertion::ParsedAssertion;
pub use self::config::{LoginSurface, MetadataSource, SamlProviderConfig};
pub use self::identity::FederatedIdentity;
pub use self::metadata::MetadataFetcher;
pub use self::provider::{AuthnRedirect, SamlProvider};
pub use self::registry::{InMemoryRegistry, ProviderRegistry};
pub use self::replay::{MemoryReplayLedger, ReplayGuard, ReplayLedger};

use self::relay_state::validate_redirect;

use crate::core::models::CsrfMetadata;
use crate::core::types::CsrfKey;
use crate::csrf::CsrfStore;
use crate::error::Error;
use crate::util::clock::Clock;
use crate::util::random::FromRandom;

/// How long an assertion id is remembered when the assertion sets no `NotOnOrAfter`.
const OPEN_ENDED_REPLAY_RETENTION_MINS: i64 = 60;

#[derive(Debug, Clone)]
pub struct LoginStart {
    pub state: CsrfKey,
    pub request_id: String,
    pub redirect: AuthnRedirect,
}

/// A validated federated login, ready to be turned into a session.
#[derive(Debug, Clone)]
pub struct SamlLogin {
    pub identity: FederatedIdentity,
    pub redirect_to: Option<String>,
    pub idp_initiated: bool,
    pub auto_create_users: bool,
    pub default_role: String,
}

#[derive(Debug)]
pub struct SamlEngine {
    registry: Arc<dyn ProviderRegistry>,
    fetcher: MetadataFetcher,
    csrf: Arc<dyn CsrfStore>,
    replay: ReplayGuard,
    clock: Arc<dyn Clock>,
}

impl SamlEngine {
    pub fn new(
        registry: Arc<dyn ProviderRegistry>,
        fetcher: MetadataFetcher,
        csrf: Arc<dyn CsrfStore>,
        replay: ReplayGuard,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            csrf,
            replay,
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<dyn ProviderRegistry> {
        &self.registry
    }

    /// Loads IdP metadata and (re)registers the provider. Metadata is fetched before the
    /// registry is touched.
    #[tracing::instrument(skip_all, fields(provider = %config.name))]
    pub async fn register(&self, config: SamlProviderConfig) -> Result<(), Error> {
        let xml = match &config.idp_metadata {
            MetadataSource::Url { idp_metadata_url } => self.fetcher.fetch(idp_metadata_url).await?,
            MetadataSource::Xml { idp_metadata_xml } => idp_metadata_xml.clone(),
        };

        let descriptor = metadata::parse_idp_metadata(&xml)?;
        let provider = SamlProvider::compile(config, descriptor)?;
        self.registry.register(Arc::new(provider));

        event!(Level::INFO, "Registered SAML provider");
        Ok(())
    }

    /// Registers every provider it can, logging the rest. Returns how many succeeded.
    pub async fn register_all(&self, configs: Vec<SamlProviderConfig>) -> usize {
        let mut registered = 0;
        for config in configs {
            let name = config.name.clone();
            match self.register(config).await {
                Ok(()) => registered += 1,
                Err(e) => {
                    event!(Level::ERROR, provider = %name, error = %e, "Skipping SAML provider")
                }
            }
        }
        registered
    }

    pub fn sp_metadata(&self, name: &str) -> Result<String, Error> {
        Ok(self.registry.get(name)?.sp_metadata())
    }

    fn enabled(&self, name: &str) -> Result<Arc<SamlProvider>, Error> {
        let provider = self.registry.get(name)?;
        if !provider.config().enabled {
            return Err(Error::ProviderDisabled(name.to_string()));
        }
        Ok(provider)
    }

    /// Builds an AuthnRequest and parks its id and the redirect target under a fresh
    /// RelayState key.
    #[tracing::instrument(skip(self))]
    pub fn start_login(
        &self,
        name: &str,
        redirect_to: Option<&str>,
        surface: LoginSurface,
    ) -> Result<LoginStart, Error> {
        let provider = self.enabled(name)?;
        let config = provider.config();
        if !config.login_surfaces.allows(surface) {
            event!(Level::DEBUG, ?surface, "Provider not enabled for surface");
            return Err(Error::ProviderDisabled(name.to_string()));
        }

        let redirect_uri = validate_redirect(
            redirect_to.unwrap_or(""),
            &config.allowed_redirect_hosts,
        )?;

        let state = CsrfKey::from_random();
        let out = provider.authn_request(&state)?;

        let mut metadata = CsrfMetadata::for_provider(name);
        metadata.redirect_uri = redirect_uri;
        metadata.request_id = Some(out.request_id.clone());
        self.csrf.set(&state, metadata, None)?;

        event!(Level::DEBUG, request_id = %out.request_id, "Issued AuthnRequest");
        Ok(LoginStart {
            state,
            request_id: out.request_id,
            redirect: out.redirect,
        })
    }

    /// Handles a response POSTed to the ACS.
    ///
    /// RelayState naming a live state entry for this provider makes the response
    /// solicited: it must answer the stored AuthnRequest and the stored redirect is used.
    /// Anything else is unsolicited, accepted only when the provider allows IdP-initiated
    /// login, and its RelayState must pass redirect validation.
    #[tracing::instrument(skip(self, saml_response))]
    pub fn consume(
        &self,
        name: &str,
        saml_response: &str,
        relay_state: Option<&str>,
    ) -> Result<SamlLogin, Error> {
        let provider = self.enabled(name)?;
        let config = provider.config();
        let relay_state = relay_state.unwrap_or("");

        let solicited = if relay_state.is_empty() {
            None
        } else {
            self.csrf
                .validate_and_consume(&CsrfKey(relay_state.to_string()))?
        };

        let (request_id, redirect_to, idp_initiated) = match solicited {
            Some(state) if state.provider == name => (state.request_id, state.redirect_uri, false),
            Some(state) => {
                event!(Level::WARN, issued_for = %state.provider, "RelayState issued for another provider");
                return Err(Error::InvalidState);
            }
            None if config.allow_idp_initiated => {
                let redirect =
                    validate_redirect(relay_state, &config.allowed_redirect_hosts)?;
                (None, redirect, true)
            }
            None => {
                event!(Level::WARN, "Unsolicited SAML response refused");
                return Err(Error::InvalidState);
            }
        };

        let request_ids: Vec<&str> = request_id.iter().map(String::as_str).collect();
        let assertion = provider.parse_response(
            saml_response,
            if idp_initiated {
                None
            } else {
                Some(request_ids.as_slice())
            },
        )?;

        let identity = self.accept_assertion(&provider, assertion)?;
        Ok(SamlLogin {
            identity,
            redirect_to,
            idp_initiated,
            auto_create_users: config.auto_create_users,
            default_role: config.default_role.clone(),
        })
    }

    /// Everything after signature verification: time window, audience, replay, identity
    /// mapping and group rules, in that order.
    pub fn accept_assertion(
        &self,
        provider: &SamlProvider,
        assertion: ParsedAssertion,
    ) -> Result<FederatedIdentity, Error> {
        let config = provider.config();
        let now = self.clock.now();

        assertion.check_window(now)?;
        assertion.check_audience(&config.entity_id, &config.metadata_url)?;

        let retain_until = assertion
            .not_on_or_after
            .unwrap_or_else(|| now + Duration::minutes(OPEN_ENDED_REPLAY_RETENTION_MINS));
        self.replay.check(&assertion.id, retain_until, now)?;

        let identity = identity::resolve_identity(&config.name, &config.attribute_mapping, &assertion)?;
        groups::authorize_groups(&config.group_rules, &identity.groups)?;

        event!(
            Level::INFO,
            provider = %config.name,
            email = %identity.email,
            "SAML assertion accepted"
        );
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Utc;

    use super::assertion::tests::{assertion, ResponseXml};
    use super::metadata::tests::unsigned_idp_metadata;
    use super::provider::tests::{compiled, config};
    use super::*;
    use crate::csrf::MemoryCsrfStore;
    use crate::util::clock::FixedClock;

    struct Fixture {
        clock: Arc<FixedClock>,
        csrf: Arc<MemoryCsrfStore>,
        engine: SamlEngine,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let csrf = Arc::new(MemoryCsrfStore::with_clock(clock.clone()));
        let engine = SamlEngine::new(
            Arc::new(InMemoryRegistry::default()),
            MetadataFetcher::new(StdDuration::from_secs(1), false),
            csrf.clone(),
            ReplayGuard::new(Arc::new(MemoryReplayLedger::with_clock(clock.clone()))),
            clock.clone(),
        );
        Fixture {
            clock,
            csrf,
            engine,
        }
    }

    fn audience_of(provider: &SamlProvider) -> String {
        provider.config().entity_id.clone()
    }

    #[tokio::test]
    async fn register_inline_and_reject_insecure_urls() {
        let f = fixture();
        f.engine.register(config("okta")).await.unwrap();
        assert_eq!(f.engine.registry().list(), vec!["okta".to_string()]);

        let mut insecure = config("legacy");
        insecure.idp_metadata = MetadataSource::Url {
            idp_metadata_url: "http://idp.internal/metadata".into(),
        };
        assert!(matches!(
            f.engine.register(insecure).await,
            Err(Error::MetadataInsecureUrl(_))
        ));
    }

    #[tokio::test]
    async fn register_all_skips_broken_providers() {
        let f = fixture();
        let mut broken = config("broken");
        broken.idp_metadata = MetadataSource::Xml {
            idp_metadata_xml: "<not-metadata".into(),
        };
        let count = f
            .engine
            .register_all(vec![config("okta"), broken, config("adfs")])
            .await;
        assert_eq!(count, 2);
        assert!(matches!(
            f.engine.registry().get("broken"),
            Err(Error::ProviderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn start_login_parks_request_id_and_redirect() {
        let f = fixture();
        f.engine.register(config("okta")).await.unwrap();

        let start = f
            .engine
            .start_login("okta", Some("/welcome"), LoginSurface::App)
            .unwrap();
        let parked = f.csrf.validate_and_consume(&start.state).unwrap().unwrap();
        assert_eq!(parked.provider, "okta");
        assert_eq!(parked.request_id.as_deref(), Some(start.request_id.as_str()));
        assert_eq!(parked.redirect_uri.as_deref(), Some("/welcome"));
    }

    #[tokio::test]
    async fn start_login_checks_provider_surface_and_redirect() {
        let f = fixture();
        let mut cfg = config("okta");
        cfg.login_surfaces.dashboard = false;
        f.engine.register(cfg).await.unwrap();
        let mut off = config("off");
        off.enabled = false;
        f.engine.register(off).await.unwrap();

        assert!(matches!(
            f.engine.start_login("okta", None, LoginSurface::Dashboard),
            Err(Error::ProviderDisabled(_))
        ));
        assert!(matches!(
            f.engine.start_login("off", None, LoginSurface::App),
            Err(Error::ProviderDisabled(_))
        ));
        assert!(matches!(
            f.engine.start_login("nope", None, LoginSurface::App),
            Err(Error::ProviderNotFound(_))
        ));
        assert!(matches!(
            f.engine.start_login("okta", Some("//evil.com"), LoginSurface::App),
            Err(Error::InvalidRedirect(_))
        ));
        assert!(f.csrf.is_empty());
    }

    #[tokio::test]
    async fn relay_state_is_single_use_even_when_the_response_is_bad() {
        let f = fixture();
        f.engine.register(config("okta")).await.unwrap();
        let start = f.engine.start_login("okta", None, LoginSurface::App).unwrap();

        assert!(matches!(
            f.engine.consume("okta", "garbage", Some(&start.state.0)),
            Err(Error::AssertionInvalid(_))
        ));
        assert!(matches!(
            f.engine.consume("okta", "garbage", Some(&start.state.0)),
            Err(Error::InvalidState)
        ));
    }

    #[tokio::test]
    async fn relay_state_is_bound_to_its_provider() {
        let f = fixture();
        f.engine.register(config("okta")).await.unwrap();
        f.engine.register(config("adfs")).await.unwrap();
        let start = f.engine.start_login("okta", None, LoginSurface::App).unwrap();

        assert!(matches!(
            f.engine.consume("adfs", "garbage", Some(&start.state.0)),
            Err(Error::InvalidState)
        ));
    }

    #[tokio::test]
    async fn unsolicited_responses_need_opt_in() {
        let f = fixture();
        f.engine.register(config("okta")).await.unwrap();
        assert!(matches!(
            f.engine.consume("okta", "garbage", None),
            Err(Error::InvalidState)
        ));

        let mut open = config("open");
        open.allow_idp_initiated = true;
        f.engine.register(open).await.unwrap();
        assert!(matches!(
            f.engine.consume("open", "garbage", Some("https://evil.com/")),
            Err(Error::InvalidRedirect(_))
        ));
        assert!(matches!(
            f.engine.consume("open", "garbage", Some("/home")),
            Err(Error::AssertionInvalid(_))
        ));
    }

    #[test]
    fn accepted_assertion_yields_identity_once() {
        let f = fixture();
        let provider = compiled(config("okta"));
        let mut a = assertion(f.clock.now());
        a.audiences = vec![audience_of(&provider)];

        let identity = f.engine.accept_assertion(&provider, a.clone()).unwrap();
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.provider, "okta");
        assert_eq!(identity.session_index.as_deref(), Some("_s1"));

        f.clock.advance(Duration::seconds(2));
        assert!(matches!(
            f.engine.accept_assertion(&provider, a),
            Err(Error::AssertionReplayed)
        ));
    }

    #[test]
    fn gates_run_in_order() {
        let f = fixture();
        let provider = compiled(config("okta"));

        let mut expired = assertion(f.clock.now());
        expired.not_on_or_after = Some(f.clock.now());
        expired.audiences = vec!["someone-else".into()];
        assert!(matches!(
            f.engine.accept_assertion(&provider, expired),
            Err(Error::AssertionExpired)
        ));

        let mut foreign = assertion(f.clock.now());
        foreign.audiences = vec!["someone-else".into()];
        assert!(matches!(
            f.engine.accept_assertion(&provider, foreign),
            Err(Error::AudienceMismatch)
        ));

        let mut anonymous = assertion(f.clock.now());
        anonymous.id = crate::core::types::AssertionId("_no_mail".into());
        anonymous.audiences.clear();
        anonymous.attributes.clear();
        assert!(matches!(
            f.engine.accept_assertion(&provider, anonymous),
            Err(Error::MissingEmail)
        ));
    }

    #[test]
    fn group_rules_apply_after_mapping() {
        let f = fixture();
        let mut cfg = config("okta");
        cfg.group_rules.required_any = vec!["eng".into()];
        let provider = compiled(cfg);

        let mut a = assertion(f.clock.now());
        a.audiences.clear();
        assert!(matches!(
            f.engine.accept_assertion(&provider, a.clone()),
            Err(Error::GroupAccessDenied(_))
        ));

        a.id = crate::core::types::AssertionId("_a2".into());
        a.attributes.insert("groups".into(), vec!["eng".into()]);
        assert!(f.engine.accept_assertion(&provider, a).is_ok());
    }

    #[tokio::test]
    async fn consume_correlates_solicited_responses_with_their_request() {
        let f = fixture();
        let mut cfg = config("okta");
        cfg.allow_idp_initiated = true;
        cfg.idp_metadata = MetadataSource::Xml {
            idp_metadata_xml: unsigned_idp_metadata(),
        };
        f.engine.register(cfg.clone()).await.unwrap();

        let start = f
            .engine
            .start_login("okta", Some("/welcome"), LoginSurface::App)
            .unwrap();
        let mut stray = ResponseXml::new(&cfg.acs_url, &cfg.entity_id);
        stray.in_response_to = Some("_another-request".into());
        assert!(matches!(
            f.engine.consume("okta", &stray.encoded(), Some(&start.state.0)),
            Err(Error::AssertionInvalid(_))
        ));

        let start = f
            .engine
            .start_login("okta", Some("/welcome"), LoginSurface::App)
            .unwrap();
        let mut answer = ResponseXml::new(&cfg.acs_url, &cfg.entity_id);
        answer.in_response_to = Some(start.request_id.clone());
        let login = f
            .engine
            .consume("okta", &answer.encoded(), Some(&start.state.0))
            .unwrap();
        assert_eq!(login.identity.email, "ada@example.com");
        assert_eq!(login.identity.groups, vec!["staff".to_string(), "admins".to_string()]);
        assert_eq!(login.redirect_to.as_deref(), Some("/welcome"));
        assert!(!login.idp_initiated);
    }
}
