use std::sync::Arc;

use warp::{Filter, Reply};

use crate::http::encoding::reply;
use crate::http::response::{SamlMetadata, SeeOther};
use crate::provider::IdentityProvider;
use crate::saml::{AuthnRedirect, LoginSurface};

#[derive(Debug, serde::Deserialize)]
struct LoginQuery {
    redirect_to: Option<String>,
    surface: Option<LoginSurface>,
}

#[derive(Debug, serde::Deserialize)]
struct AcsForm {
    #[serde(rename = "SAMLResponse")]
    saml_response: String,
    #[serde(rename = "RelayState")]
    relay_state: Option<String>,
}

pub fn saml_endpoint(
    provider: Arc<IdentityProvider>,
) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_provider = warp::any().map(move || provider.clone());

    let metadata = warp::path!(String / "metadata")
        .and(warp::get())
        .and(with_provider.clone())
        .and_then(|name: String, provider: Arc<IdentityProvider>| async move {
            reply::reply(provider.saml_metadata(&name).map(SamlMetadata))
        });

    // Redirect binding sends the browser on; POST binding hands back the form fields.
    let login = warp::path!(String / "login")
        .and(warp::get())
        .and(with_provider.clone())
        .and(warp::query::<LoginQuery>())
        .and_then(
            |name: String, provider: Arc<IdentityProvider>, query: LoginQuery| async move {
                let start = reply::accept(provider.saml_login(
                    &name,
                    query.redirect_to.as_deref(),
                    query.surface.unwrap_or_default(),
                ))?;
                let response = match start.redirect {
                    AuthnRedirect::Redirect { url } => SeeOther(url).into_response(),
                    post @ AuthnRedirect::Post { .. } => warp::reply::json(&post).into_response(),
                };
                Ok::<_, warp::Rejection>(response)
            },
        );

    let acs = warp::path!(String / "acs")
        .and(warp::post())
        .and(with_provider)
        .and(warp::body::form::<AcsForm>())
        .and_then(
            |name: String, provider: Arc<IdentityProvider>, form: AcsForm| async move {
                reply::json_encode(provider.saml_acs(
                    &name,
                    &form.saml_response,
                    form.relay_state.as_deref(),
                ))
            },
        );

    warp::path("v1").and(metadata.or(login).or(acs))
}
