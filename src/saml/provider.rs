use base64::{engine::general_purpose::STANDARD, Engine};
use samael::metadata::EntityDescriptor;
use samael::service_provider::{Error as SpError, ServiceProvider, ServiceProviderBuilder};
use samael::traits::ToXml;
use tracing::{event, Level};

use super::assertion::ParsedAssertion;
use super::config::SamlProviderConfig;
use super::metadata::{self, Binding, IdpEndpoints};
use crate::core::types::CsrfKey;
use crate::error::Error;

/// How the browser is sent to the IdP.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum AuthnRedirect {
    Redirect {
        url: String,
    },
    /// Fields for an auto-submitting form.
    Post {
        action: String,
        #[serde(rename = "SAMLRequest")]
        saml_request: String,
        #[serde(rename = "RelayState")]
        relay_state: String,
    },
}

#[derive(Debug, Clone)]
pub struct AuthnRequestOut {
    pub request_id: String,
    pub redirect: AuthnRedirect,
}

/// A provider compiled from its config and the IdP's metadata.
///
/// samael checks audiences against a single SP id and skips InResponseTo whenever
/// IdP-initiated login is on, so one `ServiceProvider` is built per accepted audience
/// (entity id first, then metadata URL) for each kind of response.
pub struct SamlProvider {
    config: SamlProviderConfig,
    idp: IdpEndpoints,
    solicited: Vec<ServiceProvider>,
    unsolicited: Vec<ServiceProvider>,
}

impl std::fmt::Debug for SamlProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamlProvider")
            .field("name", &self.config.name)
            .field("idp", &self.idp)
            .finish()
    }
}

impl SamlProvider {
    pub fn compile(config: SamlProviderConfig, descriptor: EntityDescriptor) -> Result<Self, Error> {
        let idp = metadata::extract_endpoints(&descriptor)?;

        let mut audiences = vec![config.entity_id.clone()];
        if config.metadata_url != config.entity_id {
            audiences.push(config.metadata_url.clone());
        }

        let build = |audience: &String, idp_initiated: bool| {
            ServiceProviderBuilder::default()
                .entity_id(audience.clone())
                .acs_url(config.acs_url.clone())
                .metadata_url(config.metadata_url.clone())
                .idp_metadata(descriptor.clone())
                .allow_idp_initiated(idp_initiated)
                .build()
                .map_err(|e| Error::Config(format!("cannot build service provider: {}", e)))
        };

        let solicited = audiences
            .iter()
            .map(|a| build(a, false))
            .collect::<Result<Vec<_>, _>>()?;
        let unsolicited = if config.allow_idp_initiated {
            audiences
                .iter()
                .map(|a| build(a, true))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        event!(
            Level::DEBUG,
            provider = %config.name,
            sso = %idp.sso_url,
            binding = ?idp.sso_binding,
            "Compiled SAML provider"
        );
        Ok(Self {
            config,
            idp,
            solicited,
            unsolicited,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SamlProviderConfig {
        &self.config
    }

    pub fn idp(&self) -> &IdpEndpoints {
        &self.idp
    }

    pub fn sp_metadata(&self) -> String {
        metadata::sp_metadata_xml(&self.config)
    }

    pub fn authn_request(&self, relay_state: &CsrfKey) -> Result<AuthnRequestOut, Error> {
        let sp = self
            .solicited
            .first()
            .ok_or_else(|| Error::Config("no service provider compiled".to_string()))?;
        let request = sp
            .make_authentication_request(&self.idp.sso_url)
            .map_err(|e| Error::Config(format!("cannot build AuthnRequest: {}", e)))?;
        let request_id = request.id.clone();

        let redirect = match self.idp.sso_binding {
            Binding::Redirect => {
                let url = request
                    .redirect(relay_state.as_ref())
                    .map_err(|e| Error::Config(format!("cannot encode AuthnRequest: {}", e)))?
                    .ok_or_else(|| Error::Config("AuthnRequest has no destination".to_string()))?;
                AuthnRedirect::Redirect {
                    url: url.to_string(),
                }
            }
            Binding::Post => {
                let xml = request
                    .to_xml()
                    .map_err(|e| Error::Config(format!("cannot encode AuthnRequest: {}", e)))?;
                AuthnRedirect::Post {
                    action: self.idp.sso_url.clone(),
                    saml_request: STANDARD.encode(xml),
                    relay_state: relay_state.0.clone(),
                }
            }
        };

        Ok(AuthnRequestOut {
            request_id,
            redirect,
        })
    }

    /// Decodes and verifies a POSTed `SAMLResponse`. `request_ids` are the AuthnRequest ids
    /// the response must answer; `None` for unsolicited responses.
    ///
    /// An audience naming neither the entity id nor the metadata URL is `AudienceMismatch`;
    /// an expired assertion is `AssertionExpired`.
    pub fn parse_response(
        &self,
        saml_response: &str,
        request_ids: Option<&[&str]>,
    ) -> Result<ParsedAssertion, Error> {
        let candidates = match request_ids {
            Some(_) => &self.solicited,
            None => &self.unsolicited,
        };
        if candidates.is_empty() {
            return Err(Error::AssertionInvalid(
                "unsolicited responses are not accepted".to_string(),
            ));
        }

        for sp in candidates {
            let e = match sp.parse_base64_response(saml_response, request_ids) {
                Ok(assertion) => return ParsedAssertion::from_samael(&assertion),
                Err(e) => e,
            };
            match e.downcast_ref::<SpError>() {
                Some(SpError::AssertionConditionAudienceRestrictionFailed { .. }) => continue,
                Some(SpError::AssertionExpired { .. })
                | Some(SpError::AssertionConditionExpired { .. }) => {
                    event!(Level::DEBUG, provider = %self.config.name, error = %e, "SAML assertion expired");
                    return Err(Error::AssertionExpired);
                }
                _ => {
                    event!(Level::WARN, provider = %self.config.name, error = %e, "SAML response rejected");
                    return Err(Error::AssertionInvalid(e.to_string()));
                }
            }
        }

        event!(Level::WARN, provider = %self.config.name, "SAML assertion for another audience");
        Err(Error::AudienceMismatch)
    }
}
