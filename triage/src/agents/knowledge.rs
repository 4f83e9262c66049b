// Knowledge Agent: turns retrieved resolutions into an answer for the user

use tracing::info;

use crate::error::Result;
use crate::llm::{AzureOpenAiClient, Message};
use crate::models::Category;

pub const KNOWLEDGE_PROMPT: &str = "You are a specialized Network & IT Support Assistant. \
Your primary goal is to resolve technical issues using similar past resolutions.
Protocol:
Identify: extract the core issue from the user's description.
Respond: summarize the most relevant past solution clearly. If no relevant solution \
was found, or the knowledge base was unavailable, advise the user to contact a senior engineer.
Closure: once the answer is given, end your response with 'TERMINATE'.
Constraint: if the input is not a technical issue (e.g., greetings or general talk), \
respond politely and briefly without inventing a fix.";

/// What the agent knows when it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    /// Retrieval was not attempted for this category.
    Direct,
    /// Formatted search results (or the no-match sentinel).
    Retrieved(String),
    /// Retrieval failed with this description.
    Unavailable(String),
}

/// `ticket` is the user's own message, not the classifier's echo of it.
pub fn build_request(ticket: &str, category: Category, context: &Context) -> String {
    let mut request = format!("Ticket: {}\nCategory: {}\n", ticket, category);
    match context {
        Context::Direct => {
            request.push_str("\nThis is not a technical issue handled by the knowledge base. Reply directly.");
        }
        Context::Retrieved(results) => {
            request.push_str("\nSimilar past tickets:\n");
            request.push_str(results);
        }
        Context::Unavailable(reason) => {
            request.push_str("\nThe knowledge base could not be searched: ");
            request.push_str(reason);
        }
    }
    request
}

#[derive(Clone)]
pub struct KnowledgeAgent {
    llm: AzureOpenAiClient,
}

impl KnowledgeAgent {
    pub fn new(llm: AzureOpenAiClient) -> Self {
        Self { llm }
    }

    pub async fn respond(&self, ticket: &str, category: Category, context: &Context) -> Result<String> {
        info!("Knowledge: answering '{}' ticket", category);
        let messages = [
            Message::system(KNOWLEDGE_PROMPT),
            Message::user(build_request(ticket, category, context)),
        ];
        self.llm.chat(&messages).await
    }
}
