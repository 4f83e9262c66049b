pub mod classifier;
pub mod knowledge;
pub mod orchestrator;
pub mod retriever;

use serde::Serialize;

pub const TERMINATION_SENTINEL: &str = "TERMINATE";

/// Participants of a triage conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Speaker {
    User,
    Classifier,
    Retriever,
    KnowledgeAgent,
}

impl Speaker {
    pub fn name(self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Classifier => "ClassifierAgent",
            Speaker::Retriever => "search_similar_solution",
            Speaker::KnowledgeAgent => "KnowledgeBaseAgent",
        }
    }
}

pub fn is_termination_msg(content: &str) -> bool {
    content.trim().to_uppercase() == TERMINATION_SENTINEL
}

/// Split a trailing sentinel off an agent reply.
pub fn strip_sentinel(content: &str) -> (String, bool) {
    let trimmed = content.trim_end();
    let cut = trimmed.len().saturating_sub(TERMINATION_SENTINEL.len());
    match trimmed.get(cut..) {
        Some(tail)
            if tail.eq_ignore_ascii_case(TERMINATION_SENTINEL)
                && !trimmed[..cut].ends_with(|c: char| c.is_alphanumeric()) =>
        {
            (trimmed[..cut].trim_end().to_string(), true)
        }
        _ => (trimmed.to_string(), false),
    }
}
