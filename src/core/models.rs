use chrono::{DateTime, Utc};

use super::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct RevocationEntry {
    pub jti: TokenId,
    /// Absent for anonymous tokens.
    pub user_id: Option<String>,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}

impl RevocationEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRevocation {
    pub user_id: String,
    pub reason: String,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    pub assertion_id: AssertionId,
    pub expires_at: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
}

/// Data carried across a federated-login redirect.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CsrfMetadata {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkce_verifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// SAML AuthnRequest id, checked against InResponseTo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl CsrfMetadata {
    pub fn for_provider(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsrfStateEntry {
    pub key: CsrfKey,
    pub metadata: CsrfMetadata,
    pub expires_at: DateTime<Utc>,
}

impl Expire for CsrfStateEntry {
    const EXPIRES_IN_SECS: i64 = 10 * 60;
}

impl CsrfStateEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
