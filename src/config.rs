use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;
use clap::Parser;

use crate::captcha::CaptchaConfig;
use crate::csrf::CsrfBackend;
use crate::error::Error;
use crate::oauth::OAuthProviderConfig;
use crate::saml::SamlProviderConfig;
use crate::token::TokenConfig;

#[derive(Debug, Parser)]
#[clap(
    name = "shinraid",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Config {
    /// Without a database every ledger lives in memory.
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[clap(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,
    #[clap(long, env = "JWT_ISSUER", default_value = "shinrai")]
    pub jwt_issuer: String,
    /// Further issuers whose API keys are accepted, comma separated.
    #[clap(long, env = "JWT_ACCEPTED_ISSUERS", value_delimiter = ',')]
    pub jwt_accepted_issuers: Vec<String>,
    /// Seconds.
    #[clap(long, env = "ACCESS_TOKEN_TTL", default_value = "3600")]
    pub access_token_ttl: i64,
    #[clap(long, env = "REFRESH_TOKEN_TTL", default_value = "604800")]
    pub refresh_token_ttl: i64,
    #[clap(long, env = "ANONYMOUS_TOKEN_TTL", default_value = "3600")]
    pub anonymous_token_ttl: i64,
    #[clap(long, env = "SERVICE_TOKEN_TTL", default_value = "31536000")]
    pub service_token_ttl: i64,
    #[clap(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8001")]
    pub listen_addr: SocketAddr,
    /// JSON file with `saml`, `oauth` and `captcha` sections.
    #[clap(long, env = "PROVIDERS_FILE")]
    pub providers_file: Option<PathBuf>,
    #[clap(long, env = "CSRF_BACKEND", default_value = "memory")]
    pub csrf_backend: CsrfBackend,
    #[clap(long, env = "ALLOW_INSECURE_METADATA")]
    pub allow_insecure_metadata: bool,
    /// Seconds allowed for one IdP metadata fetch.
    #[clap(long, env = "METADATA_TIMEOUT", default_value = "10")]
    pub metadata_timeout: u64,
    #[clap(long, env = "SWEEP_INTERVAL", default_value = "60")]
    pub sweep_interval: u64,
}

impl Config {
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            issuer: self.jwt_issuer.clone(),
            accepted_issuers: self
                .jwt_accepted_issuers
                .iter()
                .filter(|i| !i.is_empty())
                .cloned()
                .collect(),
            access_ttl: Duration::seconds(self.access_token_ttl),
            refresh_ttl: Duration::seconds(self.refresh_token_ttl),
            anonymous_ttl: Duration::seconds(self.anonymous_token_ttl),
            service_ttl: Duration::seconds(self.service_token_ttl),
        }
    }

    pub fn metadata_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.metadata_timeout)
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval.max(1))
    }

    pub fn providers(&self) -> Result<ProvidersFile, Error> {
        match &self.providers_file {
            Some(path) => ProvidersFile::load(path),
            None => Ok(ProvidersFile::default()),
        }
    }
}

#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct ProvidersFile {
    #[serde(default)]
    pub saml: Vec<SamlProviderConfig>,
    #[serde(default)]
    pub oauth: Vec<OAuthProviderConfig>,
    #[serde(default)]
    pub captcha: Option<CaptchaConfig>,
}

impl ProvidersFile {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::CaptchaKind;

    #[test]
    fn defaults_apply() {
        let config = Config::try_parse_from(&["shinraid", "--jwt-secret", "s"]).unwrap();
        assert_eq!(config.csrf_backend, CsrfBackend::Memory);
        let tokens = config.token_config();
        assert_eq!(tokens.issuer, "shinrai");
        assert_eq!(tokens.access_ttl, Duration::hours(1));
        assert_eq!(tokens.service_ttl, Duration::days(365));
    }

    #[test]
    fn accepted_issuers_split_on_commas() {
        let config = Config::try_parse_from(&[
            "shinraid",
            "--jwt-secret",
            "s",
            "--jwt-accepted-issuers",
            "supabase,legacy",
            "--csrf-backend",
            "database",
        ])
        .unwrap();
        assert_eq!(
            config.token_config().accepted_issuers,
            vec!["supabase".to_string(), "legacy".to_string()]
        );
        assert_eq!(config.csrf_backend, CsrfBackend::Database);
    }

    #[test]
    fn providers_file_sections_are_optional() {
        let file: ProvidersFile = serde_json::from_str(
            r#"{"captcha": {"kind": "turnstile", "secret": "x"}}"#,
        )
        .unwrap();
        assert!(file.saml.is_empty());
        assert_eq!(file.captcha.unwrap().kind, CaptchaKind::Turnstile);
    }
}
