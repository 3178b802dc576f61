use std::net::SocketAddr;
use std::sync::Arc;

use warp::Filter;

use crate::core::types::BearerToken;
use crate::http::encoding::{self, reply};
use crate::provider::IdentityProvider;

#[derive(Debug, serde::Deserialize)]
struct RefreshForm {
    refresh_token: String,
}

#[derive(Debug, serde::Deserialize)]
struct RevokeForm {
    token: String,
    reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct AnonymousForm {
    captcha_token: Option<String>,
}

pub fn token_endpoint(
    provider: Arc<IdentityProvider>,
) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_provider = warp::any().map(move || provider.clone());

    let refresh = warp::path!("refresh")
        .and(warp::post())
        .and(with_provider.clone())
        .and(warp::body::form::<RefreshForm>())
        .and_then(|provider: Arc<IdentityProvider>, form: RefreshForm| async move {
            reply::json_encode(provider.refresh(&form.refresh_token))
        });

    let revoke = warp::path!("revoke")
        .and(warp::post())
        .and(with_provider.clone())
        .and(warp::body::form::<RevokeForm>())
        .and_then(|provider: Arc<IdentityProvider>, form: RevokeForm| async move {
            let reason = form.reason.as_deref().unwrap_or("revoked");
            reply::json_encode(
                provider
                    .revoke(&form.token, reason)
                    .map(|()| serde_json::json!({})),
            )
        });

    let anonymous = warp::path!("anonymous")
        .and(warp::post())
        .and(with_provider.clone())
        .and(warp::addr::remote())
        .and(warp::body::form::<AnonymousForm>())
        .and_then(
            |provider: Arc<IdentityProvider>,
             remote: Option<SocketAddr>,
             form: AnonymousForm| async move {
                let ip = remote.map(|a| a.ip().to_string());
                let session = provider
                    .anonymous_sign_in(form.captcha_token.as_deref(), ip.as_deref())
                    .await;
                reply::json_encode(session)
            },
        );

    let verify = warp::path!("verify")
        .and(warp::get())
        .and(with_provider)
        .and(encoding::bearer())
        .and_then(|provider: Arc<IdentityProvider>, token: BearerToken| async move {
            reply::json_encode(provider.authenticate(&token.0))
        });

    warp::path("v1").and(refresh.or(revoke).or(anonymous).or(verify))
}
