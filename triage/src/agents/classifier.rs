// Classifier Agent: labels a ticket with exactly one category of the taxonomy

use serde::Deserialize;
use tracing::{info, warn};

use crate::llm::{AzureOpenAiClient, Message};
use crate::metrics;
use crate::models::{Category, TicketLabel};

pub const CLASSIFIER_PROMPT: &str = r#"You are an IT ticket classifier.

Your task is to classify a given user-submitted IT support ticket into one of the following exact categories (use these strings verbatim):

- No Internet
- Slow Internet Speed
- Router / ONT Issue
- Wi-Fi Configuration Issue
- Network Outage
- Slow Performance
- Authentication Issue
- Hardware Failure
- Application Bug
- Change Request
- Access Request
- Billing / Account
- Other

Respond ONLY with valid JSON matching this schema (no additional text):
{
  "ticket": "<original ticket string>",
  "category": "<one of the categories above>"
}

Rules:
- If you are unsure, choose exactly "Other" for the category.
- Do not invent new category names or synonyms.
- Do not include explanations or surrounding backticks, only the JSON object.

Examples (use exact category strings):
Input: "I can't connect to the VPN."
Output: {"ticket": "I can't connect to the VPN.", "category": "Network Outage"}

Input: "The Outlook application crashes on launch."
Output: {"ticket": "The Outlook application crashes on launch.", "category": "Application Bug"}"#;

pub fn classification_request(ticket: &str) -> String {
    format!("Now classify this ticket and return valid JSON only: {ticket}")
}

/// Outcome of validating raw model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Valid(TicketLabel),
    Malformed(String),
}

#[derive(Deserialize)]
struct RawLabel {
    ticket: String,
    category: String,
}

/// Remove enclosing code fences and an optional `json` language tag.
fn strip_fences(raw: &str) -> &str {
    let body = raw.trim();
    if !body.starts_with("``") {
        return body;
    }
    for part in body.split("```") {
        let part = part.trim();
        let part = part
            .strip_prefix("json")
            .or_else(|| part.strip_prefix("JSON"))
            .map(str::trim_start)
            .unwrap_or(part);
        if part.starts_with('{') {
            return part;
        }
    }
    body
}

/// Parse the first JSON object found in `body`.
fn first_object(body: &str) -> Option<RawLabel> {
    if let Ok(label) = serde_json::from_str::<RawLabel>(body) {
        return Some(label);
    }
    body.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&body[start..])
            .into_iter::<RawLabel>()
            .next()
            .and_then(|parsed| parsed.ok())
    })
}

/// Validate raw model text against the `{ticket, category}` contract.
pub fn parse_classification(raw: &str) -> Classification {
    let body = strip_fences(raw);
    match first_object(body) {
        Some(RawLabel { ticket, category }) => {
            let category = Category::from_exact(&category)
                .or_else(|| Category::normalize(&category))
                .unwrap_or_else(|| {
                    warn!("Classifier returned unknown category {:?}, using fallback category", category);
                    metrics::CLASSIFIER_FALLBACKS.inc();
                    Category::Other
                });
            Classification::Valid(TicketLabel { ticket, category })
        }
        None => Classification::Malformed(raw.to_string()),
    }
}

/// Parse, falling back to `Other` with the trimmed raw text as the ticket.
pub fn safe_parse_or_default(raw: &str) -> TicketLabel {
    match parse_classification(raw) {
        Classification::Valid(label) => label,
        Classification::Malformed(raw) => TicketLabel::fallback(&raw),
    }
}

#[derive(Clone)]
pub struct ClassifierAgent {
    llm: AzureOpenAiClient,
}

impl ClassifierAgent {
    pub fn new(llm: AzureOpenAiClient) -> Self {
        Self { llm }
    }

    /// Never fails: model errors and malformed replies both yield `Other`
    /// for the caller's own ticket text.
    pub async fn classify(&self, ticket: &str) -> TicketLabel {
        info!("Classifier: labelling ticket ({} chars)", ticket.len());
        let messages = [
            Message::system(CLASSIFIER_PROMPT),
            Message::user(classification_request(ticket)),
        ];

        let raw = match self.llm.chat(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Classifier call failed, using fallback category: {}", e);
                metrics::CLASSIFIER_FALLBACKS.inc();
                return TicketLabel::fallback(ticket);
            }
        };

        match parse_classification(&raw) {
            Classification::Valid(label) => {
                info!("Classifier: category = {}", label.category);
                label
            }
            Classification::Malformed(raw) => {
                warn!("Classifier returned malformed output, using fallback category: {:?}", raw);
                metrics::CLASSIFIER_FALLBACKS.inc();
                TicketLabel::fallback(ticket)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::{completion, test_client, CHAT_PATH};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn label(ticket: &str, category: Category) -> TicketLabel {
        TicketLabel { ticket: ticket.into(), category }
    }

    #[test]
    fn valid_json_is_returned_verbatim() {
        let raw = r#"{"ticket": "The VPN isn't connecting since morning.", "category": "Network Outage"}"#;
        assert_eq!(
            safe_parse_or_default(raw),
            label("The VPN isn't connecting since morning.", Category::NetworkOutage)
        );
    }

    #[test]
    fn fenced_json_parses_like_unfenced() {
        let plain = r#"{"ticket": "SFP port blinking", "category": "Hardware Failure"}"#;
        let fenced = format!("```\n{plain}\n```");
        let tagged = format!("```json\n{plain}\n```");
        assert_eq!(parse_classification(&fenced), parse_classification(plain));
        assert_eq!(parse_classification(&tagged), parse_classification(plain));
    }

    #[test]
    fn prose_falls_back_to_other() {
        assert_eq!(
            safe_parse_or_default("  I think it's a network issue "),
            label("I think it's a network issue", Category::Other)
        );
        assert!(matches!(
            parse_classification("I think it's a network issue"),
            Classification::Malformed(_)
        ));
    }

    #[test]
    fn first_object_wins_among_several() {
        let raw = r#"Sure! {"ticket": "a", "category": "No Internet"} and {"ticket": "b", "category": "Other"}"#;
        assert_eq!(safe_parse_or_default(raw), label("a", Category::NoInternet));
    }

    #[test]
    fn wrong_shape_falls_back() {
        assert_eq!(
            safe_parse_or_default(r#"{"ticket": 5, "category": "Other"}"#).category,
            Category::Other
        );
        assert_eq!(
            safe_parse_or_default(r#"{"category": "No Internet"}"#),
            label(r#"{"category": "No Internet"}"#, Category::Other)
        );
        assert_eq!(safe_parse_or_default("").category, Category::Other);
    }

    #[test]
    fn unknown_categories_are_normalized_or_coerced() {
        assert_eq!(
            safe_parse_or_default(r#"{"ticket": "t", "category": "hardware failure"}"#).category,
            Category::HardwareFailure
        );
        assert_eq!(
            safe_parse_or_default(r#"{"ticket": "t", "category": "Printer Jam"}"#),
            label("t", Category::Other)
        );
    }

    #[test]
    fn coerced_category_counts_as_fallback() {
        let before = metrics::CLASSIFIER_FALLBACKS.get();
        safe_parse_or_default(r#"{"ticket": "t", "category": "Printer Jam"}"#);
        assert!(metrics::CLASSIFIER_FALLBACKS.get() > before);
    }

    #[tokio::test]
    async fn classify_uses_model_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .and(body_string_contains("IT ticket classifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"ticket": "The VPN isn't connecting since morning.", "category": "Network Outage"}"#,
            )))
            .mount(&server)
            .await;

        let agent = ClassifierAgent::new(test_client(&server.uri()));
        let result = agent.classify("The VPN isn't connecting since morning.").await;
        assert_eq!(result.category, Category::NetworkOutage);
    }

    #[tokio::test]
    async fn classify_falls_back_on_model_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let agent = ClassifierAgent::new(test_client(&server.uri()));
        let result = agent.classify("  printer on fire  ").await;
        assert_eq!(result, label("printer on fire", Category::Other));
    }

    #[tokio::test]
    async fn classify_falls_back_on_malformed_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("I think it's a network issue")),
            )
            .mount(&server)
            .await;

        let agent = ClassifierAgent::new(test_client(&server.uri()));
        let result = agent.classify("My internet is down").await;
        assert_eq!(result, label("My internet is down", Category::Other));
    }
}
