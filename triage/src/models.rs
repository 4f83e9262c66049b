use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed ticket taxonomy. Serialized as the exact display strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "No Internet")]
    NoInternet,
    #[serde(rename = "Slow Internet Speed")]
    SlowInternetSpeed,
    #[serde(rename = "Router / ONT Issue")]
    RouterOntIssue,
    #[serde(rename = "Wi-Fi Configuration Issue")]
    WifiConfigurationIssue,
    #[serde(rename = "Network Outage")]
    NetworkOutage,
    #[serde(rename = "Slow Performance")]
    SlowPerformance,
    #[serde(rename = "Authentication Issue")]
    AuthenticationIssue,
    #[serde(rename = "Hardware Failure")]
    HardwareFailure,
    #[serde(rename = "Application Bug")]
    ApplicationBug,
    #[serde(rename = "Change Request")]
    ChangeRequest,
    #[serde(rename = "Access Request")]
    AccessRequest,
    #[serde(rename = "Billing / Account")]
    BillingAccount,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::NoInternet,
        Category::SlowInternetSpeed,
        Category::RouterOntIssue,
        Category::WifiConfigurationIssue,
        Category::NetworkOutage,
        Category::SlowPerformance,
        Category::AuthenticationIssue,
        Category::HardwareFailure,
        Category::ApplicationBug,
        Category::ChangeRequest,
        Category::AccessRequest,
        Category::BillingAccount,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::NoInternet => "No Internet",
            Category::SlowInternetSpeed => "Slow Internet Speed",
            Category::RouterOntIssue => "Router / ONT Issue",
            Category::WifiConfigurationIssue => "Wi-Fi Configuration Issue",
            Category::NetworkOutage => "Network Outage",
            Category::SlowPerformance => "Slow Performance",
            Category::AuthenticationIssue => "Authentication Issue",
            Category::HardwareFailure => "Hardware Failure",
            Category::ApplicationBug => "Application Bug",
            Category::ChangeRequest => "Change Request",
            Category::AccessRequest => "Access Request",
            Category::BillingAccount => "Billing / Account",
            Category::Other => "Other",
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn from_exact(s: &str) -> Option<Category> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Lenient lookup: ignores case and collapses whitespace.
    pub fn normalize(s: &str) -> Option<Category> {
        let wanted = squash(s);
        Self::ALL.into_iter().find(|c| squash(c.as_str()) == wanted)
    }

    /// Numeric id used by the ticketing backend. `Other` has no id of its
    /// own and files under `Billing / Account`.
    pub fn issue_category_id(self) -> u8 {
        match self {
            Category::NoInternet => 1,
            Category::SlowInternetSpeed => 2,
            Category::RouterOntIssue => 3,
            Category::WifiConfigurationIssue => 4,
            Category::NetworkOutage => 5,
            Category::SlowPerformance => 6,
            Category::AuthenticationIssue => 7,
            Category::HardwareFailure => 8,
            Category::ApplicationBug => 9,
            Category::ChangeRequest => 10,
            Category::AccessRequest => 11,
            Category::BillingAccount | Category::Other => 12,
        }
    }

    pub fn from_issue_category_id(id: u8) -> Option<Category> {
        Self::ALL
            .into_iter()
            .filter(|c| *c != Category::Other)
            .find(|c| c.issue_category_id() == id)
    }

    /// Categories the knowledge base holds past resolutions for.
    pub fn is_technical(self) -> bool {
        !matches!(
            self,
            Category::ChangeRequest
                | Category::AccessRequest
                | Category::BillingAccount
                | Category::Other
        )
    }
}

fn squash(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLabel {
    pub ticket: String,
    pub category: Category,
}

impl TicketLabel {
    pub fn fallback(text: &str) -> Self {
        Self {
            ticket: text.trim().to_string(),
            category: Category::Other,
        }
    }
}

/// A past ticket resolution as stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub category: String,
    pub problem: String,
    pub solution: String,
    pub embedding: Vec<f32>,
}

/// Corpus record before embedding. `category` is either a taxonomy name
/// or a numeric issue category id, as exported by the ticketing system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    #[serde(deserialize_with = "name_or_id")]
    pub category: String,
    pub problem: String,
    pub solution: String,
}

fn name_or_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NameOrId {
        Name(String),
        Id(u64),
    }

    Ok(match NameOrId::deserialize(deserializer)? {
        NameOrId::Name(name) => name,
        NameOrId::Id(id) => id.to_string(),
    })
}

impl KnowledgeRecord {
    pub fn into_document(self, embedding: Vec<f32>) -> KnowledgeDocument {
        KnowledgeDocument {
            id: self.id,
            category: self.category,
            problem: self.problem,
            solution: self.solution,
            embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub category: String,
    pub problem: String,
    pub solution: String,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationTicket {
    #[serde(rename = "ticketId")]
    pub ticket_id: String,
    pub category: Category,
    #[serde(rename = "issueCategoryId")]
    pub issue_category_id: u8,
    pub description: String,
    pub ai_response: String,
    pub created_at: DateTime<Utc>,
}

// API Request/Response models
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub helpful: bool,
    /// Category the ticket was classified as, if the caller kept it.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ai_response: String,
}
