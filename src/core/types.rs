use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unique token identifier (`jti`), the revocation key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// Opaque single-use key shared by SAML RelayState and OAuth `state`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct CsrfKey(pub String);

impl FromStr for CsrfKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for CsrfKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct AssertionId(pub String);

#[derive(Debug)]
pub struct BearerToken(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Anon,
    ServiceRole,
    Authenticated,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Anon => "anon",
            Self::ServiceRole => "service_role",
            Self::Authenticated => "authenticated",
            Self::Other(s) => s,
        }
    }

    /// Roles accepted on API-key style tokens.
    pub fn is_api_key_role(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            "anon" => Self::Anon,
            "service_role" => Self::ServiceRole,
            "authenticated" => Self::Authenticated,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

impl Serialize for Role {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Records kept for a fixed lifetime.
pub trait Expire {
    const EXPIRES_IN_SECS: i64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_its_wire_name() {
        let role: Role = serde_json::from_str("\"service_role\"").unwrap();
        assert_eq!(role, Role::ServiceRole);
        assert_eq!(serde_json::to_string(&Role::from("editor")).unwrap(), "\"editor\"");
    }

    #[test]
    fn only_builtin_roles_are_api_key_roles() {
        assert!(Role::Anon.is_api_key_role());
        assert!(Role::Authenticated.is_api_key_role());
        assert!(!Role::from("admin").is_api_key_role());
    }
}
