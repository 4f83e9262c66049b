use std::sync::Arc;

use tracing::{info, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

use crate::agents::orchestrator::TriageAgents;
use crate::metrics;
use crate::models::{ChatRequest, ChatResponse, ErrorResponse};

fn error_reply(status: StatusCode, message: &str) -> Response {
    warp::reply::with_status(
        warp::reply::json(&ErrorResponse { error: message.to_string() }),
        status,
    )
    .into_response()
}

fn message_of(request: ChatRequest) -> Option<String> {
    request.message.filter(|m| !m.trim().is_empty())
}

pub async fn handle_chat(request: ChatRequest, agents: Arc<TriageAgents>) -> Result<Response, Rejection> {
    let Some(message) = message_of(request) else {
        warn!("Chat request without a message");
        return Ok(error_reply(StatusCode::BAD_REQUEST, "No message provided"));
    };
    metrics::CHAT_REQUESTS.inc();
    info!("Processing chat message ({} chars)", message.len());

    let result = agents.handle(&message).await;
    match result.answer {
        Some(response) => Ok(warp::reply::json(&ChatResponse { response }).into_response()),
        None => {
            warn!("No response from chatbot after {} round(s)", result.rounds());
            metrics::CHAT_NO_RESPONSE.inc();
            Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "No response from chatbot"))
        }
    }
}

pub async fn handle_classify(request: ChatRequest, agents: Arc<TriageAgents>) -> Result<Response, Rejection> {
    let Some(message) = message_of(request) else {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "No message provided"));
    };
    let label = agents.classifier().classify(&message).await;
    Ok(warp::reply::json(&label).into_response())
}
