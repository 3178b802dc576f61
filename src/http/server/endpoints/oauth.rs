use std::sync::Arc;

use warp::Filter;

use crate::http::encoding::reply;
use crate::http::response::SeeOther;
use crate::provider::IdentityProvider;

#[derive(Debug, serde::Deserialize)]
struct AuthorizeQuery {
    redirect_to: Option<String>,
}

pub fn oauth_endpoint(
    provider: Arc<IdentityProvider>,
) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_provider = warp::any().map(move || provider.clone());

    let authorize = warp::path!(String / "authorize")
        .and(warp::get())
        .and(with_provider)
        .and(warp::query::<AuthorizeQuery>())
        .and_then(
            |name: String, provider: Arc<IdentityProvider>, query: AuthorizeQuery| async move {
                let start = provider.oauth_authorize(&name, query.redirect_to.as_deref());
                reply::reply(start.map(|s| SeeOther(s.url)))
            },
        );

    warp::path("v1").and(authorize)
}
