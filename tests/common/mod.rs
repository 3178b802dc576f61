#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shinrai::csrf::MemoryCsrfStore;
use shinrai::oauth::{OAuthFlows, OAuthProviderConfig};
use shinrai::provider::{IdentityProvider, StatelessLinker};
use shinrai::revocation::MemoryLedger;
use shinrai::saml::{
    InMemoryRegistry, MemoryReplayLedger, MetadataFetcher, ReplayGuard, SamlEngine,
    SamlProviderConfig,
};
use shinrai::token::{TokenConfig, TokenService};
use shinrai::util::clock::FixedClock;

pub const SECRET: &[u8] = b"integration-secret";

const CERT: &str = "MIIBszCCAVmgAwIBAgIUYmFzZTY0LWZpeHR1cmUtY2VydDAKBggqhkjOPQQDAjAPMQ0wCwYDVQQDDARpZHBzMB4XDTI0MDEwMTAwMDAwMFoXDTM0MDEwMTAwMDAwMFowDzENMAsGA1UEAwwEaWRwczBZMBMGByqGSM49AgEGCCqGSM49AwEHA0IABA==";

pub fn idp_metadata() -> String {
    format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example.com/metadata">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <ds:X509Data>
                    <ds:X509Certificate>{}</ds:X509Certificate>
                </ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>
        <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/slo"/>
        <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/sso/redirect"/>
    </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
        CERT
    )
}

pub fn saml_config(name: &str) -> SamlProviderConfig {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "entity_id": format!("https://sp.example.com/saml/v1/{}/metadata", name),
        "acs_url": format!("https://sp.example.com/saml/v1/{}/acs", name),
        "metadata_url": format!("https://sp.example.com/saml/v1/{}/metadata", name),
        "idp_metadata_xml": idp_metadata(),
        "allowed_redirect_hosts": ["app.example.com"],
        "attribute_mapping": { "email": "mail", "groups": "memberOf" },
        "group_rules": { "denied": ["contractors"] },
    }))
    .unwrap()
}

pub fn oauth_config(name: &str) -> OAuthProviderConfig {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "authorization_url": "https://accounts.example.com/o/authorize",
        "client_id": "shinrai-client",
        "redirect_uri": "https://sp.example.com/oauth/v1/callback",
        "scopes": ["openid", "email"],
        "allowed_redirect_hosts": ["app.example.com"],
    }))
    .unwrap()
}

pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub provider: Arc<IdentityProvider>,
}

pub async fn harness() -> Harness {
    let clock = Arc::new(FixedClock::at(Utc::now()));
    let csrf = Arc::new(MemoryCsrfStore::with_clock(clock.clone()));

    let saml = SamlEngine::new(
        Arc::new(InMemoryRegistry::default()),
        MetadataFetcher::new(Duration::from_secs(1), false),
        csrf.clone(),
        ReplayGuard::new(Arc::new(MemoryReplayLedger::with_clock(clock.clone()))),
        clock.clone(),
    );
    assert_eq!(saml.register_all(vec![saml_config("acme")]).await, 1);

    let provider = IdentityProvider::new(
        TokenService::with_clock(SECRET, TokenConfig::with_issuer("shinrai"), clock.clone()),
        Arc::new(MemoryLedger::with_clock(clock.clone())),
        saml,
        OAuthFlows::new(vec![oauth_config("google")], csrf),
        None,
        Arc::new(StatelessLinker),
    );

    Harness {
        clock,
        provider: Arc::new(provider),
    }
}
