//! CAPTCHA verification against the supported siteverify services.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use crate::error::Error;

const HCAPTCHA_VERIFY_URL: &str = "https://api.hcaptcha.com/siteverify";
const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";
const DEFAULT_MIN_SCORE: f64 = 0.5;

#[async_trait]
pub trait CaptchaProvider: Debug + Send + Sync {
    /// Whether `token` is a passing solution. Transport failures are errors, not `false`.
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaKind {
    #[serde(rename = "hcaptcha")]
    HCaptcha,
    #[serde(rename = "recaptcha_v3")]
    ReCaptchaV3,
    Turnstile,
    Cap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptchaConfig {
    pub kind: CaptchaKind,
    pub secret: String,
    /// reCAPTCHA v3 only.
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Overrides the service's siteverify URL. Required for Cap.
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

impl SiteVerifyResponse {
    fn passes(&self, min_score: Option<f64>) -> bool {
        if !self.success {
            return false;
        }
        match min_score {
            Some(min) => self.score.map_or(false, |score| score >= min),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
struct SiteVerify {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl SiteVerify {
    fn new(url: impl Into<String>, secret: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            secret: secret.to_string(),
        }
    }

    async fn form(&self, token: &str, remote_ip: Option<&str>) -> Result<SiteVerifyResponse, Error> {
        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self.client.post(&self.url).form(&form).send().await?;
        let body: SiteVerifyResponse = response.error_for_status()?.json().await?;
        if !body.success {
            event!(Level::DEBUG, errors = ?body.error_codes, "CAPTCHA rejected");
        }
        Ok(body)
    }

    async fn json(&self, token: &str) -> Result<SiteVerifyResponse, Error> {
        let body = serde_json::json!({ "secret": self.secret, "response": token });
        let response = self.client.post(&self.url).json(&body).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }
}

#[derive(Debug, Clone)]
pub struct HCaptcha(SiteVerify);

#[derive(Debug, Clone)]
pub struct ReCaptchaV3 {
    inner: SiteVerify,
    min_score: f64,
}

#[derive(Debug, Clone)]
pub struct Turnstile(SiteVerify);

/// Self-hosted Cap instance.
#[derive(Debug, Clone)]
pub struct Cap(SiteVerify);

#[async_trait]
impl CaptchaProvider for HCaptcha {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, Error> {
        if token.is_empty() {
            return Ok(false);
        }
        Ok(self.0.form(token, remote_ip).await?.passes(None))
    }
}

#[async_trait]
impl CaptchaProvider for ReCaptchaV3 {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, Error> {
        if token.is_empty() {
            return Ok(false);
        }
        let response = self.inner.form(token, remote_ip).await?;
        Ok(response.passes(Some(self.min_score)))
    }
}

#[async_trait]
impl CaptchaProvider for Turnstile {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, Error> {
        if token.is_empty() {
            return Ok(false);
        }
        Ok(self.0.form(token, remote_ip).await?.passes(None))
    }
}

#[async_trait]
impl CaptchaProvider for Cap {
    async fn verify(&self, token: &str, _remote_ip: Option<&str>) -> Result<bool, Error> {
        if token.is_empty() {
            return Ok(false);
        }
        Ok(self.0.json(token).await?.passes(None))
    }
}

pub fn from_config(config: &CaptchaConfig) -> Result<Arc<dyn CaptchaProvider>, Error> {
    let url = |default: &str| config.endpoint.clone().unwrap_or_else(|| default.to_string());

    let provider: Arc<dyn CaptchaProvider> = match config.kind {
        CaptchaKind::HCaptcha => Arc::new(HCaptcha(SiteVerify::new(
            url(HCAPTCHA_VERIFY_URL),
            &config.secret,
        ))),
        CaptchaKind::ReCaptchaV3 => Arc::new(ReCaptchaV3 {
            inner: SiteVerify::new(url(RECAPTCHA_VERIFY_URL), &config.secret),
            min_score: config.min_score.unwrap_or(DEFAULT_MIN_SCORE),
        }),
        CaptchaKind::Turnstile => Arc::new(Turnstile(SiteVerify::new(
            url(TURNSTILE_VERIFY_URL),
            &config.secret,
        ))),
        CaptchaKind::Cap => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| Error::Config("Cap requires an endpoint".to_string()))?;
            Arc::new(Cap(SiteVerify::new(endpoint, &config.secret)))
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> SiteVerifyResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn plain_success() {
        assert!(parse(r#"{"success": true, "challenge_ts": "2024-01-01T00:00:00Z"}"#).passes(None));
        assert!(!parse(r#"{"success": false, "error-codes": ["invalid-input-response"]}"#)
            .passes(None));
    }

    #[test]
    fn score_threshold() {
        let low = parse(r#"{"success": true, "score": 0.3, "action": "signup"}"#);
        let high = parse(r#"{"success": true, "score": 0.9}"#);
        assert!(!low.passes(Some(0.5)));
        assert!(high.passes(Some(0.5)));
        assert!(!parse(r#"{"success": true}"#).passes(Some(0.5)));
    }

    #[test]
    fn kinds_by_name() {
        let config: CaptchaConfig =
            serde_json::from_str(r#"{"kind": "recaptcha_v3", "secret": "s", "min_score": 0.7}"#)
                .unwrap();
        assert_eq!(config.kind, CaptchaKind::ReCaptchaV3);
        for kind in &["hcaptcha", "turnstile", "cap"] {
            let json = format!(r#"{{"kind": "{}", "secret": "s"}}"#, kind);
            assert!(serde_json::from_str::<CaptchaConfig>(&json).is_ok());
        }
    }

    #[test]
    fn cap_needs_an_endpoint() {
        let config = CaptchaConfig {
            kind: CaptchaKind::Cap,
            secret: "s".into(),
            min_score: None,
            endpoint: None,
        };
        assert!(matches!(from_config(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn empty_tokens_fail_without_a_request() {
        let config = CaptchaConfig {
            kind: CaptchaKind::Turnstile,
            secret: "s".into(),
            min_score: None,
            endpoint: Some("http://127.0.0.1:1/siteverify".into()),
        };
        let provider = from_config(&config).unwrap();
        assert!(!provider.verify("", None).await.unwrap());
    }

    #[tokio::test]
    async fn transport_failures_are_errors() {
        let config = CaptchaConfig {
            kind: CaptchaKind::HCaptcha,
            secret: "s".into(),
            min_score: None,
            endpoint: Some("http://127.0.0.1:1/siteverify".into()),
        };
        let provider = from_config(&config).unwrap();
        let result = provider.verify("token", None).await;
        assert!(matches!(result, Err(Error::Http(_))));
    }
}
