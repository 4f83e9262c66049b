use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use warp::{Filter, Rejection};

use crate::error::ApiError;

pub fn cors(origin: &str) -> warp::cors::Builder {
    let builder = warp::cors()
        .allow_headers(vec![
            "User-Agent",
            "Sec-Fetch-Mode",
            "Referer",
            "Origin",
            "Access-Control-Request-Method",
            "Access-Control-Request-Headers",
            "Content-Type",
            "Accept",
            "Content-Length",
        ])
        .allow_methods(vec!["POST", "GET", "OPTIONS"]);

    if origin == "*" {
        builder.allow_any_origin()
    } else {
        builder.allow_origin(origin)
    }
}

pub fn chat_limiter(per_minute: u32) -> Arc<DefaultDirectRateLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Rejects with `RateLimitExceeded` once the shared quota is spent.
pub fn rate_limit(
    limiter: Arc<DefaultDirectRateLimiter>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::any()
        .and_then(move || {
            let limiter = limiter.clone();
            async move {
                match limiter.check() {
                    Ok(()) => Ok(()),
                    Err(_) => Err(warp::reject::custom(ApiError::RateLimitExceeded)),
                }
            }
        })
        .untuple_one()
}
