use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

use crate::metrics;
use crate::models::{Category, EscalationTicket, FeedbackRequest};

const TICKET_PREFIX: &str = "TKT";
const TICKET_SUFFIX_LEN: usize = 6;
const TICKET_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `TKT-` followed by six uppercase alphanumerics.
pub fn generate_ticket_id() -> String {
    let suffix: String = Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(TICKET_SUFFIX_LEN)
        .map(|b| TICKET_ALPHABET[*b as usize % TICKET_ALPHABET.len()] as char)
        .collect();
    format!("{TICKET_PREFIX}-{suffix}")
}

/// Resolve the category reported with the feedback; anything missing or
/// outside the taxonomy files as `Other`.
fn feedback_category(reported: Option<&str>) -> Category {
    let Some(name) = reported.map(str::trim).filter(|n| !n.is_empty()) else {
        return Category::Other;
    };
    Category::from_exact(name)
        .or_else(|| Category::normalize(name))
        .unwrap_or_else(|| {
            warn!("Feedback carried unknown category '{}', filing as Other", name);
            Category::Other
        })
}

pub fn escalate(category: Category, description: &str, ai_response: &str) -> EscalationTicket {
    EscalationTicket {
        ticket_id: generate_ticket_id(),
        category,
        issue_category_id: category.issue_category_id(),
        description: description.to_string(),
        ai_response: ai_response.to_string(),
        created_at: Utc::now(),
    }
}

pub async fn handle_feedback(request: FeedbackRequest) -> Result<Response, Rejection> {
    if request.helpful {
        info!("Feedback: issue resolved by the assistant");
        return Ok(warp::reply::json(&json!({ "status": "resolved" })).into_response());
    }

    let category = feedback_category(request.category.as_deref());
    let ticket = escalate(category, &request.description, &request.ai_response);
    metrics::ESCALATIONS.inc();
    info!(
        "Feedback: escalating to IT support as {} (issue category {})",
        ticket.ticket_id, ticket.issue_category_id
    );
    Ok(warp::reply::with_status(warp::reply::json(&ticket), StatusCode::CREATED).into_response())
}

pub async fn handle_categories() -> Result<Response, Rejection> {
    let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    Ok(warp::reply::json(&names).into_response())
}
