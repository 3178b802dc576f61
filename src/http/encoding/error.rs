use tracing::{event, Level};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::error::Error;

#[derive(Debug)]
pub struct ApiRejection(pub Error);

impl warp::reject::Reject for ApiRejection {}

impl From<Error> for ApiRejection {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

#[derive(Debug, serde::Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    error_description: String,
}

pub fn status_of(error: &Error) -> StatusCode {
    use Error::*;

    match error {
        TokenInvalid | TokenExpired | TokenRevoked => StatusCode::UNAUTHORIZED,
        CannotRevokeServiceRole | GroupAccessDenied(_) | ProviderDisabled(_) => {
            StatusCode::FORBIDDEN
        }
        ProviderNotFound(_) => StatusCode::NOT_FOUND,
        AssertionInvalid(_) | AssertionExpired | AssertionReplayed | AudienceMismatch
        | MissingEmail | InvalidRedirect(_) | InvalidState | CaptchaFailed => {
            StatusCode::BAD_REQUEST
        }
        MetadataFetchFailed(_) | Http(_) => StatusCode::BAD_GATEWAY,
        MetadataInsecureUrl(_) | Config(_) | Signing(_) | Db(_) | Pool(_) | Serde(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub async fn handle_reject(err: Rejection) -> Result<impl Reply, Rejection> {
    match err.find::<ApiRejection>() {
        Some(ApiRejection(e)) => {
            let status = status_of(e);
            let error_description = if status.is_server_error() {
                event!(Level::ERROR, error = %e, "Request failed");
                "internal error".to_string()
            } else {
                e.to_string()
            };

            let body = warp::reply::json(&ErrorBody {
                error: e.code(),
                error_description,
            });
            Ok(warp::reply::with_status(body, status).into_response())
        }
        _ => Err(err),
    }
}
