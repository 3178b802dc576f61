//! Start and callback halves of an OAuth 2.0 / OIDC authorization-code login.
//!
//! The code exchange itself belongs to the caller; this module only produces the
//! authorization URL and later hands back what the exchange needs.

pub mod pkce;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{event, Level};
use url::Url;

use self::pkce::Verifier;
use crate::core::models::CsrfMetadata;
use crate::core::types::CsrfKey;
use crate::csrf::CsrfStore;
use crate::error::Error;
use crate::saml::relay_state::validate_redirect;
use crate::util::random::{random_string, FromRandom};

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct OAuthProviderConfig {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub authorization_url: String,
    pub client_id: String,
    /// Our callback registered with the provider.
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub allowed_redirect_hosts: Vec<String>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationStart {
    pub url: String,
    pub state: CsrfKey,
}

/// What the code exchange needs once the provider calls back.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackState {
    pub pkce_verifier: Verifier,
    pub nonce: Option<String>,
    pub redirect_to: Option<String>,
}

#[derive(Debug)]
pub struct OAuthFlows {
    providers: HashMap<String, OAuthProviderConfig>,
    csrf: Arc<dyn CsrfStore>,
}

impl OAuthFlows {
    pub fn new(providers: Vec<OAuthProviderConfig>, csrf: Arc<dyn CsrfStore>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.name.clone(), p)).collect(),
            csrf,
        }
    }

    fn provider(&self, name: &str) -> Result<&OAuthProviderConfig, Error> {
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| Error::ProviderNotFound(name.to_string()))?;
        if !provider.enabled {
            return Err(Error::ProviderDisabled(name.to_string()));
        }
        Ok(provider)
    }

    #[tracing::instrument(skip(self))]
    pub fn begin(&self, name: &str, redirect_to: Option<&str>) -> Result<AuthorizationStart, Error> {
        let provider = self.provider(name)?;
        let redirect_uri =
            validate_redirect(redirect_to.unwrap_or(""), &provider.allowed_redirect_hosts)?;

        let mut url = Url::parse(&provider.authorization_url).map_err(|_| {
            Error::Config(format!(
                "bad authorization URL for provider {:?}",
                provider.name
            ))
        })?;

        let state = CsrfKey::from_random();
        let verifier = Verifier::from_random();
        let challenge = verifier.challenge();
        let nonce = random_string(16);

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &provider.client_id)
            .append_pair("redirect_uri", &provider.redirect_uri)
            .append_pair("scope", &provider.scopes.join(" "))
            .append_pair("state", state.as_ref())
            .append_pair("code_challenge", &challenge.code)
            .append_pair("code_challenge_method", challenge.method.as_str())
            .append_pair("nonce", &nonce);

        let metadata = CsrfMetadata {
            provider: name.to_string(),
            redirect_uri,
            pkce_verifier: Some(verifier.value),
            nonce: Some(nonce),
            request_id: None,
        };
        self.csrf.set(&state, metadata, None)?;

        event!(Level::DEBUG, "Started authorization");
        Ok(AuthorizationStart {
            url: url.to_string(),
            state,
        })
    }

    #[tracing::instrument(skip(self, state))]
    pub fn callback(&self, name: &str, state: &str) -> Result<CallbackState, Error> {
        self.provider(name)?;

        let metadata = self
            .csrf
            .validate_and_consume(&CsrfKey(state.to_string()))?
            .ok_or(Error::InvalidState)?;

        if metadata.provider != name {
            event!(Level::WARN, issued_for = %metadata.provider, "State issued for another provider");
            return Err(Error::InvalidState);
        }

        let pkce_verifier = metadata
            .pkce_verifier
            .map(|value| Verifier { value })
            .ok_or(Error::InvalidState)?;

        Ok(CallbackState {
            pkce_verifier,
            nonce: metadata.nonce,
            redirect_to: metadata.redirect_uri,
        })
    }
}
