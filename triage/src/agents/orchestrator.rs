// Orchestrator: drives one chat turn through classify -> retrieve -> respond.
// Each turn owns its own `Conversation`; the agents are shared read-only.

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::classifier::ClassifierAgent;
use super::knowledge::{Context, KnowledgeAgent};
use super::retriever::RetrievalTool;
use super::{is_termination_msg, strip_sentinel, Speaker, TERMINATION_SENTINEL};
use crate::models::TicketLabel;

pub const DEFAULT_MAX_ROUNDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnState {
    AwaitingUser,
    Classifying,
    RetrievingKnowledge,
    Responding,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub label: Option<TicketLabel>,
    /// Last non-empty reply from the knowledge agent, if any.
    pub answer: Option<String>,
    pub transcript: Vec<ChatMessage>,
}

impl TurnResult {
    pub fn rounds(&self) -> usize {
        self.transcript.len()
    }
}

#[derive(Clone)]
pub struct TriageAgents {
    classifier: ClassifierAgent,
    retriever: RetrievalTool,
    knowledge: KnowledgeAgent,
    max_rounds: usize,
}

impl TriageAgents {
    pub fn new(
        classifier: ClassifierAgent,
        retriever: RetrievalTool,
        knowledge: KnowledgeAgent,
        max_rounds: usize,
    ) -> Self {
        Self { classifier, retriever, knowledge, max_rounds }
    }

    pub fn classifier(&self) -> &ClassifierAgent {
        &self.classifier
    }

    /// Fresh conversation state for a single turn.
    pub fn conversation(&self) -> Conversation<'_> {
        Conversation {
            agents: self,
            state: TurnState::AwaitingUser,
            transcript: Vec::new(),
            query: String::new(),
            label: None,
            context: Context::Direct,
        }
    }

    pub async fn handle(&self, message: &str) -> TurnResult {
        self.conversation().run(message).await
    }
}

pub struct Conversation<'a> {
    agents: &'a TriageAgents,
    state: TurnState,
    transcript: Vec<ChatMessage>,
    query: String,
    label: Option<TicketLabel>,
    context: Context,
}

impl Conversation<'_> {
    pub fn state(&self) -> TurnState {
        self.state
    }

    #[instrument(skip_all, fields(turn = %Uuid::new_v4()))]
    pub async fn run(mut self, user_message: &str) -> TurnResult {
        self.query = user_message.trim().to_string();
        self.post(Speaker::User, user_message.to_string(), TurnState::Classifying);

        while self.state != TurnState::Terminated {
            self.step().await;
        }

        let answer = self
            .transcript
            .iter()
            .rev()
            .filter(|m| m.speaker == Speaker::KnowledgeAgent)
            .map(|m| m.content.trim())
            .find(|c| !c.is_empty() && !is_termination_msg(c))
            .map(str::to_string);
        info!(
            "Conversation finished after {} round(s), answered = {}",
            self.transcript.len(),
            answer.is_some()
        );

        TurnResult { label: self.label, answer, transcript: self.transcript }
    }

    async fn step(&mut self) {
        match self.state {
            TurnState::AwaitingUser | TurnState::Terminated => {
                self.state = TurnState::Terminated;
            }
            TurnState::Classifying => {
                let label = self.agents.classifier.classify(&self.query).await;
                let content = serde_json::to_string(&label).unwrap_or_else(|_| label.category.to_string());
                let next = if label.category.is_technical() {
                    TurnState::RetrievingKnowledge
                } else {
                    TurnState::Responding
                };
                self.label = Some(label);
                self.post(Speaker::Classifier, content, next);
            }
            TurnState::RetrievingKnowledge => {
                let Some(category) = self.label.as_ref().map(|l| l.category) else {
                    self.state = TurnState::Terminated;
                    return;
                };
                let outcome = self
                    .agents
                    .retriever
                    .search_similar_solution(&self.query, category.as_str())
                    .await;
                let content = match outcome {
                    Ok(results) => {
                        self.context = Context::Retrieved(results.clone());
                        results
                    }
                    Err(e) => {
                        warn!("Knowledge search failed: {}", e);
                        let reason = e.to_string();
                        self.context = Context::Unavailable(reason.clone());
                        format!("Knowledge search failed: {reason}")
                    }
                };
                self.post(Speaker::Retriever, content, TurnState::Responding);
            }
            TurnState::Responding => {
                let Some(category) = self.label.as_ref().map(|l| l.category) else {
                    self.state = TurnState::Terminated;
                    return;
                };
                let reply = self.agents.knowledge.respond(&self.query, category, &self.context).await;
                match reply {
                    Ok(reply) => {
                        let (body, _) = strip_sentinel(&reply);
                        let content = if body.is_empty() { TERMINATION_SENTINEL.to_string() } else { body };
                        self.post(Speaker::KnowledgeAgent, content, TurnState::Terminated);
                    }
                    Err(e) => {
                        warn!("Knowledge agent failed to answer: {}", e);
                        self.state = TurnState::Terminated;
                    }
                }
            }
        }
    }

    /// Append a message and move to `next`, unless the message is the
    /// sentinel or the round bound is reached.
    fn post(&mut self, speaker: Speaker, content: String, next: TurnState) {
        if self.transcript.last().map(|m| m.speaker) == Some(speaker) {
            warn!("{} may not speak twice in a row", speaker.name());
            self.state = TurnState::Terminated;
            return;
        }

        let terminate = is_termination_msg(&content);
        self.transcript.push(ChatMessage { speaker, content });
        self.state = if terminate || self.transcript.len() >= self.agents.max_rounds {
            TurnState::Terminated
        } else {
            next
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::{completion, embedding, test_client, CHAT_PATH, EMBED_PATH};
    use crate::models::{Category, KnowledgeDocument};
    use crate::vector_store::{KnowledgeIndex, MemoryIndex};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_chat(server: &MockServer, marker: &str, reply: &str) {
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .and(body_string_contains(marker))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(reply)))
            .mount(server)
            .await;
    }

    async fn mount_embedding(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding(&[1.0, 0.0, 0.0])))
            .mount(server)
            .await;
    }

    fn agents(uri: &str, index: MemoryIndex, max_rounds: usize) -> TriageAgents {
        let llm = test_client(uri);
        TriageAgents::new(
            ClassifierAgent::new(llm.clone()),
            RetrievalTool::new(llm.clone(), KnowledgeIndex::Memory(index)),
            KnowledgeAgent::new(llm),
            max_rounds,
        )
    }

    fn seeded_index() -> MemoryIndex {
        let index = MemoryIndex::new(3);
        index
            .upload(&[KnowledgeDocument {
                id: "T-1".into(),
                category: "Network Outage".into(),
                problem: "VPN tunnel down for all users".into(),
                solution: "Restart the VPN concentrator".into(),
                embedding: vec![1.0, 0.0, 0.0],
            }])
            .unwrap();
        index
    }

    fn speakers(result: &TurnResult) -> Vec<Speaker> {
        result.transcript.iter().map(|m| m.speaker).collect()
    }

    #[tokio::test]
    async fn technical_ticket_goes_through_retrieval() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            "IT ticket classifier",
            r#"{"ticket": "The VPN isn't connecting since morning.", "category": "Network Outage"}"#,
        )
        .await;
        mount_chat(&server, "Restart the VPN concentrator", "Restart the VPN concentrator. TERMINATE").await;
        mount_embedding(&server).await;

        let result = agents(&server.uri(), seeded_index(), DEFAULT_MAX_ROUNDS)
            .handle("The VPN isn't connecting since morning.")
            .await;

        assert_eq!(result.label.as_ref().unwrap().category, Category::NetworkOutage);
        assert_eq!(
            speakers(&result),
            vec![Speaker::User, Speaker::Classifier, Speaker::Retriever, Speaker::KnowledgeAgent]
        );
        assert!(result.transcript[2].content.contains("Result 1:"));
        assert_eq!(result.answer.as_deref(), Some("Restart the VPN concentrator."));
        assert!(result.rounds() <= DEFAULT_MAX_ROUNDS);
    }

    #[tokio::test]
    async fn non_technical_ticket_skips_retrieval() {
        let server = MockServer::start().await;
        mount_chat(&server, "IT ticket classifier", r#"{"ticket": "Hi", "category": "Other"}"#).await;
        mount_chat(&server, "Reply directly", "Hello! How can I help? TERMINATE").await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding(&[1.0, 0.0, 0.0])))
            .expect(0)
            .mount(&server)
            .await;

        let result = agents(&server.uri(), seeded_index(), DEFAULT_MAX_ROUNDS).handle("Hi").await;
        assert_eq!(speakers(&result), vec![Speaker::User, Speaker::Classifier, Speaker::KnowledgeAgent]);
        assert_eq!(result.answer.as_deref(), Some("Hello! How can I help?"));
    }

    #[tokio::test]
    async fn retrieval_failure_still_reaches_an_answer() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            "IT ticket classifier",
            r#"{"ticket": "SFP port on OLT is blinking orange.", "category": "Hardware Failure"}"#,
        )
        .await;
        mount_chat(&server, "could not be searched", "Please contact a senior engineer. TERMINATE").await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = agents(&server.uri(), seeded_index(), DEFAULT_MAX_ROUNDS)
            .handle("SFP port on OLT is blinking orange.")
            .await;
        assert!(result.transcript[2].content.starts_with("Knowledge search failed"));
        assert_eq!(result.answer.as_deref(), Some("Please contact a senior engineer."));
    }

    #[tokio::test]
    async fn knowledge_agent_sees_the_user_message_not_the_echo() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            "IT ticket classifier",
            r#"{"ticket": "User reports a billing problem", "category": "Billing / Account"}"#,
        )
        .await;
        mount_chat(&server, "Ticket: I was charged twice this month", "Refund is on its way. TERMINATE").await;

        let result = agents(&server.uri(), seeded_index(), DEFAULT_MAX_ROUNDS)
            .handle("  I was charged twice this month ")
            .await;
        assert_eq!(result.answer.as_deref(), Some("Refund is on its way."));
    }

    #[tokio::test]
    async fn failed_answer_is_no_response() {
        let server = MockServer::start().await;
        mount_chat(&server, "IT ticket classifier", r#"{"ticket": "Hi", "category": "Other"}"#).await;
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = agents(&server.uri(), seeded_index(), DEFAULT_MAX_ROUNDS).handle("Hi").await;
        assert!(result.answer.is_none());
        assert_eq!(result.label.unwrap().category, Category::Other);
    }

    #[tokio::test]
    async fn bare_sentinel_reply_is_no_response() {
        let server = MockServer::start().await;
        mount_chat(&server, "IT ticket classifier", r#"{"ticket": "Hi", "category": "Other"}"#).await;
        mount_chat(&server, "Reply directly", "TERMINATE").await;

        let result = agents(&server.uri(), seeded_index(), DEFAULT_MAX_ROUNDS).handle("Hi").await;
        assert!(result.answer.is_none());
        assert_eq!(result.transcript.last().unwrap().content, TERMINATION_SENTINEL);
    }

    #[tokio::test]
    async fn user_sentinel_terminates_immediately() {
        let result = agents("http://127.0.0.1:1", seeded_index(), DEFAULT_MAX_ROUNDS)
            .handle("  terminate ")
            .await;
        assert_eq!(result.rounds(), 1);
        assert!(result.label.is_none());
        assert!(result.answer.is_none());
    }

    #[tokio::test]
    async fn round_bound_stops_the_turn() {
        let server = MockServer::start().await;
        mount_chat(
            &server,
            "IT ticket classifier",
            r#"{"ticket": "VPN down", "category": "Network Outage"}"#,
        )
        .await;

        let result = agents(&server.uri(), seeded_index(), 2).handle("VPN down").await;
        assert_eq!(speakers(&result), vec![Speaker::User, Speaker::Classifier]);
        assert!(result.answer.is_none());
    }

    #[test]
    fn same_speaker_twice_terminates() {
        let agents = agents("http://127.0.0.1:1", seeded_index(), DEFAULT_MAX_ROUNDS);
        let mut conversation = agents.conversation();
        conversation.post(Speaker::User, "hello".into(), TurnState::Classifying);
        assert_eq!(conversation.state(), TurnState::Classifying);
        conversation.post(Speaker::User, "again".into(), TurnState::Classifying);
        assert_eq!(conversation.state(), TurnState::Terminated);
        assert_eq!(conversation.transcript.len(), 1);
    }
}
