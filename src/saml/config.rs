use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One federated identity provider, as configured by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamlProviderConfig {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Our entity id as presented to this IdP.
    pub entity_id: String,
    pub acs_url: String,
    /// Where our SP metadata for this provider is served.
    pub metadata_url: String,
    #[serde(flatten)]
    pub idp_metadata: MetadataSource,
    #[serde(default)]
    pub attribute_mapping: AttributeMapping,
    #[serde(default)]
    pub auto_create_users: bool,
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default)]
    pub allow_idp_initiated: bool,
    #[serde(default)]
    pub allowed_redirect_hosts: Vec<String>,
    #[serde(default)]
    pub group_rules: GroupRules,
    #[serde(default)]
    pub login_surfaces: LoginSurfaces,
}

fn enabled_by_default() -> bool {
    true
}

fn default_role() -> String {
    "authenticated".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataSource {
    Url { idp_metadata_url: String },
    Xml { idp_metadata_xml: String },
}

/// Assertion attribute names for each logical field. Unset fields fall back to the
/// common names used by major IdPs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub email: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub groups: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRules {
    #[serde(default)]
    pub required_any: Vec<String>,
    #[serde(default)]
    pub required_all: Vec<String>,
    #[serde(default)]
    pub denied: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginSurfaces {
    #[serde(default = "enabled_by_default")]
    pub dashboard: bool,
    #[serde(default = "enabled_by_default")]
    pub app: bool,
}

impl Default for LoginSurfaces {
    fn default() -> Self {
        Self {
            dashboard: true,
            app: true,
        }
    }
}

impl LoginSurfaces {
    pub fn allows(&self, surface: LoginSurface) -> bool {
        match surface {
            LoginSurface::Dashboard => self.dashboard,
            LoginSurface::App => self.app,
        }
    }
}

/// Where a login was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginSurface {
    Dashboard,
    App,
}

impl Default for LoginSurface {
    fn default() -> Self {
        Self::App
    }
}

impl FromStr for LoginSurface {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dashboard" => Ok(Self::Dashboard),
            "app" => Ok(Self::App),
            other => Err(Error::Config(format!("unknown login surface {:?}", other))),
        }
    }
}
