// Retriever Tool: embeds the query and searches past resolutions in one category

use tracing::info;

use crate::error::{ApiError, Result};
use crate::llm::AzureOpenAiClient;
use crate::metrics;
use crate::models::SearchHit;
use crate::vector_store::KnowledgeIndex;

pub const TOP_K: usize = 3;
pub const NO_MATCHES: &str = "No matching solutions found.";

#[derive(Clone)]
pub struct RetrievalTool {
    llm: AzureOpenAiClient,
    index: KnowledgeIndex,
}

impl RetrievalTool {
    pub fn new(llm: AzureOpenAiClient, index: KnowledgeIndex) -> Self {
        Self { llm, index }
    }

    pub async fn search_similar_solution(&self, query: &str, category: &str) -> Result<String> {
        let hits = self.search(query, category).await?;
        Ok(format_results(&hits))
    }

    pub async fn search(&self, query: &str, category: &str) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::BadRequest("search query is empty".into()));
        }
        metrics::RETRIEVAL_CALLS.inc();
        info!(
            "Retriever: searching {} index for category '{}'",
            self.index.backend(),
            category
        );

        let vector = self.llm.embed(query).await?;
        let hits = self.index.search(&vector, category, TOP_K).await?;
        info!("Retriever: {} hit(s)", hits.len());
        Ok(hits)
    }
}

pub fn format_results(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_MATCHES.to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(idx, hit)| {
            format!(
                "\nResult {}:\nCategory: {}\nProblem: {}\nSolution: {}\n",
                idx + 1,
                hit.category,
                hit.problem,
                hit.solution
            )
        })
        .collect()
}
