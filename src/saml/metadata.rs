//! IdP metadata retrieval and parsing, and our own SP metadata document.

use std::time::Duration;

use samael::metadata::{EntityDescriptor, HTTP_POST_BINDING, HTTP_REDIRECT_BINDING};
use tracing::{event, Level};
use url::Url;

use super::config::SamlProviderConfig;
use crate::error::Error;

const NAME_ID_FORMAT_EMAIL: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Redirect,
    Post,
}

impl Binding {
    pub fn urn(self) -> &'static str {
        match self {
            Self::Redirect => HTTP_REDIRECT_BINDING,
            Self::Post => HTTP_POST_BINDING,
        }
    }
}

/// What we need from the IdP's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct IdpEndpoints {
    pub entity_id: Option<String>,
    pub sso_url: String,
    pub sso_binding: Binding,
    pub slo_url: Option<String>,
    /// Base64 DER of the first signing (or unqualified) certificate.
    pub signing_certificate: Option<String>,
}

/// Fetches IdP metadata over HTTP(S).
#[derive(Debug, Clone)]
pub struct MetadataFetcher {
    client: reqwest::Client,
    timeout: Duration,
    allow_insecure: bool,
}

impl MetadataFetcher {
    pub fn new(timeout: Duration, allow_insecure: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            allow_insecure,
        }
    }

    pub fn check_url(&self, url: &str) -> Result<(), Error> {
        check_metadata_url(url, self.allow_insecure)
    }

    /// Single attempt, bounded by the configured timeout.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String, Error> {
        self.check_url(url)?;

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::MetadataFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            event!(Level::ERROR, status = %response.status(), "IdP metadata request failed");
            return Err(Error::MetadataFetchFailed(format!(
                "status {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::MetadataFetchFailed(e.to_string()))
    }
}

pub fn check_metadata_url(url: &str, allow_insecure: bool) -> Result<(), Error> {
    let parsed = Url::parse(url).map_err(|_| Error::Config(format!("bad metadata URL {:?}", url)))?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" if allow_insecure => {
            event!(Level::WARN, url, "Using insecure IdP metadata URL");
            Ok(())
        }
        _ => Err(Error::MetadataInsecureUrl(url.to_string())),
    }
}

pub fn parse_idp_metadata(xml: &str) -> Result<EntityDescriptor, Error> {
    samael::metadata::de::from_str(xml)
        .map_err(|e| Error::Config(format!("unparseable IdP metadata: {}", e)))
}

/// Picks the first IdP descriptor offering a usable SSO binding, preferring Redirect over
/// POST within it.
pub fn extract_endpoints(descriptor: &EntityDescriptor) -> Result<IdpEndpoints, Error> {
    let idps = descriptor.idp_sso_descriptors.as_deref().unwrap_or(&[]);

    for idp in idps {
        let find = |binding: Binding| {
            idp.single_sign_on_services
                .iter()
                .find(|s| s.binding == binding.urn())
                .map(|s| (s.location.clone(), binding))
        };

        let (sso_url, sso_binding) = match find(Binding::Redirect).or_else(|| find(Binding::Post)) {
            Some(found) => found,
            None => continue,
        };

        let slo_url = idp
            .single_logout_services
            .iter()
            .find(|s| s.binding == HTTP_REDIRECT_BINDING)
            .or_else(|| idp.single_logout_services.first())
            .map(|s| s.location.clone());

        let signing_certificate = idp
            .key_descriptors
            .iter()
            .filter(|k| k.key_use.as_deref().map_or(true, |u| u == "signing"))
            .filter_map(|k| k.key_info.x509_data.as_ref())
            .flat_map(|x| x.certificates.iter())
            .next()
            .map(|c| c.split_whitespace().collect::<String>());

        return Ok(IdpEndpoints {
            entity_id: descriptor.entity_id.clone(),
            sso_url,
            sso_binding,
            slo_url,
            signing_certificate,
        });
    }

    Err(Error::Config(
        "IdP metadata offers no HTTP-Redirect or HTTP-POST single sign-on service".to_string(),
    ))
}

/// SP metadata for `config`: entity id, POST ACS, email NameID.
pub fn sp_metadata_xml(config: &SamlProviderConfig) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}">
  <md:SPSSODescriptor AuthnRequestsSigned="false" WantAssertionsSigned="true" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:NameIDFormat>{name_id_format}</md:NameIDFormat>
    <md:AssertionConsumerService Binding="{binding}" Location="{acs_url}" index="0" isDefault="true"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
        entity_id = escape_attr(&config.entity_id),
        name_id_format = NAME_ID_FORMAT_EMAIL,
        binding = HTTP_POST_BINDING,
        acs_url = escape_attr(&config.acs_url),
    )
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
