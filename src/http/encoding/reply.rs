use warp::reply::{Reply, Response};
use warp::Rejection;

use super::error::ApiRejection;

pub fn json_encode(
    value: Result<impl serde::Serialize, impl Into<ApiRejection>>,
) -> Result<impl Reply, Rejection> {
    value
        .map(|v| warp::reply::json(&v))
        .map_err(|e| warp::reject::custom::<ApiRejection>(e.into()))
}

pub fn accept<T, E>(result: Result<T, E>) -> Result<T, Rejection>
where
    E: Into<ApiRejection>,
{
    result.map_err(|e| warp::reject::custom(e.into()))
}

pub fn reply<T, E>(result: Result<T, E>) -> Result<Response, Rejection>
where
    T: Reply,
    E: Into<ApiRejection>,
{
    result
        .map(|t| t.into_response())
        .map_err(|e| warp::reject::custom(e.into()))
}
