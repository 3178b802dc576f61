use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("token is invalid")]
    TokenInvalid,
    #[error("token has expired")]
    TokenExpired,
    #[error("token has been revoked")]
    TokenRevoked,
    #[error("service_role tokens cannot be revoked")]
    CannotRevokeServiceRole,

    #[error("SAML assertion is invalid: {0}")]
    AssertionInvalid(String),
    #[error("SAML assertion has expired")]
    AssertionExpired,
    #[error("SAML assertion has already been used")]
    AssertionReplayed,
    #[error("SAML assertion audience does not match this service provider")]
    AudienceMismatch,
    #[error("no usable email address in SAML assertion")]
    MissingEmail,

    #[error("identity provider {0:?} not found")]
    ProviderNotFound(String),
    #[error("identity provider {0:?} is disabled")]
    ProviderDisabled(String),
    #[error("redirect target {0:?} is not allowed")]
    InvalidRedirect(String),
    #[error("state parameter is invalid or expired")]
    InvalidState,
    #[error("failed to fetch identity provider metadata: {0}")]
    MetadataFetchFailed(String),
    #[error("identity provider metadata URL {0:?} must use https")]
    MetadataInsecureUrl(String),
    #[error("group membership does not permit access: {0}")]
    GroupAccessDenied(String),
    #[error("captcha verification failed")]
    CaptchaFailed,

    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Only storage and network failures may be retried by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Db(_) | Self::Pool(_) | Self::Http(_) | Self::MetadataFetchFailed(_)
        )
    }

    pub fn code(&self) -> &'static str {
        use Error::*;

        match self {
            TokenInvalid => "token_invalid",
            TokenExpired => "token_expired",
            TokenRevoked => "token_revoked",
            CannotRevokeServiceRole => "cannot_revoke_service_role",
            AssertionInvalid(_) => "assertion_invalid",
            AssertionExpired => "assertion_expired",
            AssertionReplayed => "assertion_replayed",
            AudienceMismatch => "audience_mismatch",
            MissingEmail => "missing_email",
            ProviderNotFound(_) => "provider_not_found",
            ProviderDisabled(_) => "provider_disabled",
            InvalidRedirect(_) => "invalid_redirect",
            InvalidState => "invalid_state",
            MetadataFetchFailed(_) => "metadata_fetch_failed",
            MetadataInsecureUrl(_) => "metadata_insecure_url",
            GroupAccessDenied(_) => "group_access_denied",
            CaptchaFailed => "captcha_failed",
            Config(_) => "configuration_error",
            Signing(_) | Db(_) | Pool(_) | Serde(_) | Http(_) => "server_error",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
