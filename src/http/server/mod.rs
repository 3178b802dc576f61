use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{event, Level};
use warp::Filter;

use crate::provider::IdentityProvider;

mod endpoints;

use endpoints::{oauth::oauth_endpoint, saml::saml_endpoint, token::token_endpoint};

use super::encoding::error::handle_reject;

#[derive(Debug)]
pub struct Server {
    provider: Arc<IdentityProvider>,
}

impl Server {
    pub fn new(provider: Arc<IdentityProvider>) -> Self {
        Self { provider }
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone
    {
        let provider = self.provider.clone();

        let saml = warp::path("saml").and(saml_endpoint(provider.clone()));
        let oauth = warp::path("oauth").and(oauth_endpoint(provider.clone()));
        let token = warp::path("token").and(token_endpoint(provider));

        let cors = warp::cors().allow_any_origin();

        saml.or(oauth)
            .or(token)
            .recover(handle_reject)
            .with(warp::log("http-api"))
            .with(cors)
    }

    /// Runs until the process is interrupted.
    pub async fn serve(self, addr: SocketAddr) {
        let routes = self.routes();
        event!(Level::INFO, %addr, "Listening");
        warp::serve(routes)
            .bind_with_graceful_shutdown(addr, async {
                tokio::signal::ctrl_c().await.ok();
            })
            .1
            .await;
    }
}
