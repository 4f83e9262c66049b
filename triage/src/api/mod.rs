use std::sync::Arc;

use governor::DefaultDirectRateLimiter;
use warp::{Filter, Rejection, Reply};

use crate::agents::orchestrator::TriageAgents;
use crate::middleware::rate_limit;

mod chat;
mod feedback;

const MAX_BODY_BYTES: u64 = 64 * 1024;

pub fn routes(
    agents: Arc<TriageAgents>,
    chat_limiter: Arc<DefaultDirectRateLimiter>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let chat_route = warp::path("chat")
        .and(warp::path::end())
        .and(warp::post())
        .and(rate_limit(chat_limiter))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_agents(agents.clone()))
        .and_then(chat::handle_chat);

    let classify_route = warp::path("classify")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_agents(agents))
        .and_then(chat::handle_classify);

    let categories_route = warp::path("categories")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(feedback::handle_categories);

    let feedback_route = warp::path("feedback")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and_then(feedback::handle_feedback);

    chat_route
        .or(classify_route)
        .or(categories_route)
        .or(feedback_route)
}

fn with_agents(
    agents: Arc<TriageAgents>,
) -> impl Filter<Extract = (Arc<TriageAgents>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || agents.clone())
}
