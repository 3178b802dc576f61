use warp::http::StatusCode;
use warp::reply::{Reply, Response};

/// 303 to `location`; the browser follows with a GET whatever the original method.
#[derive(Debug, Clone)]
pub struct SeeOther(pub String);

impl Reply for SeeOther {
    fn into_response(self) -> Response {
        warp::http::Response::builder()
            .header("Location", self.0)
            .status(StatusCode::SEE_OTHER)
            .body(warp::hyper::Body::empty())
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

/// SP metadata document.
#[derive(Debug, Clone)]
pub struct SamlMetadata(pub String);

impl Reply for SamlMetadata {
    fn into_response(self) -> Response {
        warp::reply::with_header(self.0, "content-type", "application/samlmetadata+xml")
            .into_response()
    }
}
