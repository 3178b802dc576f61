use std::fmt::Debug;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::core::types::Role;
use crate::error::Error;
use crate::saml::SamlLogin;
use crate::token::UserIdentity;

/// Resolves a federated login to the local user it signs in as.
pub trait IdentityLinker: Debug + Send + Sync {
    fn link(&self, login: &SamlLogin) -> Result<UserIdentity, Error>;
}

/// Derives a stable subject from provider and NameID without a user directory.
///
/// Every login is linked, so `auto_create_users` has no effect here; a directory-backed
/// linker is expected to honour it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatelessLinker;

impl StatelessLinker {
    pub fn subject_for(provider: &str, name_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update(b"\n");
        hasher.update(name_id.as_bytes());
        format!("saml_{}", URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }
}

impl IdentityLinker for StatelessLinker {
    fn link(&self, login: &SamlLogin) -> Result<UserIdentity, Error> {
        let federated = &login.identity;
        let subject = Self::subject_for(&federated.provider, &federated.name_id);

        let mut identity = UserIdentity::new(subject, Role::from(login.default_role.as_str()))
            .with_email(federated.email.clone())
            .with_name(federated.name.clone());
        identity.user_metadata = serde_json::json!({
            "email": federated.email,
            "full_name": federated.name,
            "groups": federated.groups,
        });
        identity.app_metadata = serde_json::json!({
            "provider": format!("saml:{}", federated.provider),
            "name_id": federated.name_id,
        });
        Ok(identity)
    }
}
