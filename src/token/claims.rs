use crate::core::types::{Role, SessionId, TokenId};

/// Well-known subject carried by anonymous tokens.
pub const ANONYMOUS_SUBJECT: &str = "00000000-0000-0000-0000-00000000a000";
/// Well-known subject carried by service-role tokens.
pub const SERVICE_SUBJECT: &str = "00000000-0000-0000-0000-00000000f000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    pub iat: u64,
    /// `iat` at millisecond precision, for comparison against user revocation cutoffs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) iat_ms: Option<i64>,
    pub nbf: u64,
    pub exp: u64,
    pub jti: TokenId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub token_type: TokenKind,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub user_metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub app_metadata: serde_json::Value,
}

impl TokenClaims {
    /// Issue time in unix milliseconds; whole seconds for tokens minted without `iat_ms`.
    pub fn issued_at_millis(&self) -> i64 {
        self.iat_ms.unwrap_or(self.iat as i64 * 1000)
    }

    pub fn principal(&self) -> Principal {
        if self.role == Role::ServiceRole {
            Principal::Service
        } else if self.is_anonymous {
            Principal::Anonymous
        } else {
            Principal::User(self.sub.clone())
        }
    }

    /// Subject of a real user; `None` for synthetic identities.
    pub fn user_id(&self) -> Option<&str> {
        match self.principal() {
            Principal::User(_) => Some(&self.sub),
            _ => None,
        }
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            subject: self.sub.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            user_metadata: self.user_metadata.clone(),
            app_metadata: self.app_metadata.clone(),
        }
    }
}

/// Who a token speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User(String),
    Anonymous,
    Service,
}

/// Claims of API-key style tokens, which may come from other compatible issuers and
/// carry only a subset of [`TokenClaims`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ApiKeyClaims {
    pub iss: String,
    pub role: Role,
    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub sub: Option<String>,
}

/// Input to user token issuance.
#[derive(Debug, Clone, PartialEq)]
pub struct UserIdentity {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub user_metadata: serde_json::Value,
    pub app_metadata: serde_json::Value,
}

impl UserIdentity {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            email: String::new(),
            name: String::new(),
            role,
            user_metadata: serde_json::Value::Null,
            app_metadata: serde_json::Value::Null,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
