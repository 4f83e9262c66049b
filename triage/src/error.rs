use thiserror::Error;
use warp::{reject::Reject, Reply, Rejection};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Language model error: {0}")]
    LlmError(String),

    #[error("Embedding unavailable for deployment '{deployment}': {reason}")]
    EmbeddingUnavailable { deployment: String, reason: String },

    #[error("Search backend returned {status}: {body}")]
    SearchBackend { status: u16, body: String },

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

impl Reject for ApiError {}

pub type Result<T> = std::result::Result<T, ApiError>;

pub async fn handle_rejection(err: Rejection) -> std::result::Result<impl Reply, Rejection> {
    let (code, message, details) = if let Some(api_err) = err.find::<ApiError>() {
        let (code, message) = match api_err {
            ApiError::BadRequest(_) => (400, "Bad request"),
            ApiError::RateLimitExceeded => (429, "Rate limit exceeded"),
            ApiError::EmbeddingUnavailable { .. } | ApiError::SearchBackend { .. } => {
                (502, "Upstream service error")
            }
            _ => (500, "Internal server error"),
        };
        (code, message, api_err.to_string())
    } else if let Some(body_err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (400, "Invalid JSON body", body_err.to_string())
    } else {
        return Err(err);
    };

    let json = warp::reply::json(&serde_json::json!({
        "error": message,
        "details": details,
    }));

    let status = warp::http::StatusCode::from_u16(code)
        .unwrap_or(warp::http::StatusCode::INTERNAL_SERVER_ERROR);
    Ok(warp::reply::with_status(json, status))
}
