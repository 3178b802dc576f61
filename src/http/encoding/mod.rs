pub mod error;
pub mod reply;

use warp::{Filter, Rejection};

use crate::core::types::BearerToken;
use crate::error::Error;

/// `Authorization: Bearer <token>`. Any other scheme is an invalid token.
pub fn bearer() -> impl Filter<Extract = (BearerToken,), Error = Rejection> + Clone {
    warp::header("Authorization").and_then(|s: String| async move {
        let token = match s.split_once("Bearer ") {
            Some(("", token)) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(Error::TokenInvalid),
        };
        reply::accept(token).map(BearerToken)
    })
}
