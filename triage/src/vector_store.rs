// Vector index backends: Azure AI Search over REST, or an in-memory cosine
// index used for local runs and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::SearchConfig;
use crate::error::{ApiError, Result};
use crate::models::{KnowledgeDocument, SearchHit};
use crate::retry::send_with_retry;

pub const SEARCH_API_VERSION: &str = "2023-11-01";
pub const UPLOAD_BATCH_SIZE: usize = 10;

#[derive(Clone)]
pub enum KnowledgeIndex {
    Remote(AzureSearchIndex),
    Memory(MemoryIndex),
}

impl KnowledgeIndex {
    pub fn backend(&self) -> &'static str {
        match self {
            KnowledgeIndex::Remote(_) => "azure-search",
            KnowledgeIndex::Memory(_) => "memory",
        }
    }

    pub async fn ensure_index(&self) -> Result<()> {
        match self {
            KnowledgeIndex::Remote(index) => index.ensure_index().await,
            KnowledgeIndex::Memory(_) => Ok(()),
        }
    }

    pub async fn upload(&self, documents: &[KnowledgeDocument]) -> Result<()> {
        match self {
            KnowledgeIndex::Remote(index) => index.upload(documents).await,
            KnowledgeIndex::Memory(index) => index.upload(documents),
        }
    }

    /// Top-`k` documents whose category equals `category`, most similar first.
    pub async fn search(&self, vector: &[f32], category: &str, k: usize) -> Result<Vec<SearchHit>> {
        let mut hits = match self {
            KnowledgeIndex::Remote(index) => index.search(vector, category, k).await?,
            KnowledgeIndex::Memory(index) => index.search(vector, category, k)?,
        };
        hits.retain(|hit| hit.category == category);
        hits.truncate(k);
        Ok(hits)
    }
}

#[derive(Clone)]
pub struct AzureSearchIndex {
    client: reqwest::Client,
    config: SearchConfig,
    dimensions: usize,
    max_retries: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "@search.score", default)]
    score: f32,
    #[serde(default)]
    category: String,
    #[serde(default)]
    problem: String,
    #[serde(default)]
    solution: String,
}

#[derive(Deserialize)]
struct IndexingResponse {
    #[serde(default)]
    value: Vec<IndexingResult>,
}

#[derive(Deserialize)]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

impl AzureSearchIndex {
    pub fn new(client: reqwest::Client, config: SearchConfig, dimensions: usize, max_retries: u32) -> Self {
        Self { client, config, dimensions, max_retries }
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/indexes/{}{}?api-version={}",
            self.config.endpoint, self.config.index_name, suffix, SEARCH_API_VERSION
        )
    }

    fn definition(&self) -> Value {
        json!({
            "name": self.config.index_name,
            "fields": [
                { "name": "id", "type": "Edm.String", "key": true, "filterable": true, "sortable": true },
                { "name": "category", "type": "Edm.String", "searchable": true, "filterable": true, "facetable": true },
                { "name": "problem", "type": "Edm.String", "searchable": true },
                { "name": "solution", "type": "Edm.String", "searchable": true },
                {
                    "name": "embedding",
                    "type": "Collection(Edm.Single)",
                    "searchable": true,
                    "dimensions": self.dimensions,
                    "vectorSearchProfile": "default"
                }
            ],
            "vectorSearch": {
                "algorithms": [{ "name": "default", "kind": "hnsw" }],
                "profiles": [{ "name": "default", "algorithm": "default" }]
            }
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!("Search backend returned {}: {}", status, body);
        Err(ApiError::SearchBackend { status: status.as_u16(), body })
    }

    /// Create the index unless it already exists.
    pub async fn ensure_index(&self) -> Result<()> {
        let url = self.url("");
        let existing = send_with_retry("search index lookup", self.max_retries, || {
            self.client.get(&url).header("api-key", &self.config.api_key).send()
        })
        .await?;

        if existing.status().is_success() {
            info!("Index '{}' already exists, skipping creation", self.config.index_name);
            return Ok(());
        }
        if existing.status() != reqwest::StatusCode::NOT_FOUND {
            Self::check(existing).await?;
        }

        let definition = self.definition();
        let created = send_with_retry("search index creation", self.max_retries, || {
            self.client
                .put(&url)
                .header("api-key", &self.config.api_key)
                .json(&definition)
                .send()
        })
        .await?;
        Self::check(created).await?;
        info!("Index '{}' created", self.config.index_name);
        Ok(())
    }

    pub async fn upload(&self, documents: &[KnowledgeDocument]) -> Result<()> {
        let url = self.url("/docs/index");
        for batch in documents.chunks(UPLOAD_BATCH_SIZE) {
            for doc in batch {
                check_dimension(self.dimensions, &doc.embedding)?;
            }
            let value: Vec<Value> = batch
                .iter()
                .map(|doc| {
                    json!({
                        "@search.action": "mergeOrUpload",
                        "id": doc.id,
                        "category": doc.category,
                        "problem": doc.problem,
                        "solution": doc.solution,
                        "embedding": doc.embedding,
                    })
                })
                .collect();
            let body = json!({ "value": value });

            let response = send_with_retry("document upload", self.max_retries, || {
                self.client
                    .post(&url)
                    .header("api-key", &self.config.api_key)
                    .json(&body)
                    .send()
            })
            .await?;
            let response = Self::check(response).await?;

            // 207 Multi-Status still reports per-document rejections.
            let status = response.status();
            let parsed: IndexingResponse = response.json().await?;
            let rejected: Vec<String> = parsed
                .value
                .into_iter()
                .filter(|r| !r.status)
                .map(|r| format!("{}: {}", r.key, r.error_message.unwrap_or_default()))
                .collect();
            if !rejected.is_empty() {
                error!("Search backend rejected {} document(s): {}", rejected.len(), rejected.join("; "));
                return Err(ApiError::SearchBackend { status: status.as_u16(), body: rejected.join("; ") });
            }
        }
        Ok(())
    }

    pub async fn search(&self, vector: &[f32], category: &str, k: usize) -> Result<Vec<SearchHit>> {
        let url = self.url("/docs/search");
        let body = json!({
            "select": "category,problem,solution",
            "filter": category_filter(category),
            "top": k,
            "vectorQueries": [{
                "kind": "vector",
                "vector": vector,
                "fields": "embedding",
                "k": k
            }]
        });

        let response = send_with_retry("similarity search", self.max_retries, || {
            self.client
                .post(&url)
                .header("api-key", &self.config.api_key)
                .json(&body)
                .send()
        })
        .await?;
        let response = Self::check(response).await?;
        let parsed: SearchResponse = response.json().await?;

        Ok(parsed
            .value
            .into_iter()
            .map(|raw| SearchHit {
                category: raw.category,
                problem: raw.problem,
                solution: raw.solution,
                score: raw.score,
            })
            .collect())
    }
}

/// OData equality filter on `category`; embedded quotes are doubled.
pub fn category_filter(category: &str) -> String {
    format!("category eq '{}'", category.replace('\'', "''"))
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(ApiError::InvalidDimension { expected, actual: vector.len() });
    }
    Ok(())
}

/// In-process index keyed by document id. Upserts replace by id.
#[derive(Clone)]
pub struct MemoryIndex {
    dimensions: usize,
    documents: Arc<RwLock<HashMap<String, KnowledgeDocument>>>,
}

impl MemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, documents: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn upload(&self, documents: &[KnowledgeDocument]) -> Result<()> {
        for doc in documents {
            check_dimension(self.dimensions, &doc.embedding)?;
        }
        let mut docs = self
            .documents
            .write()
            .map_err(|_| ApiError::SearchBackend { status: 500, body: "index lock poisoned".into() })?;
        for doc in documents {
            docs.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    pub fn search(&self, vector: &[f32], category: &str, k: usize) -> Result<Vec<SearchHit>> {
        check_dimension(self.dimensions, vector)?;
        let docs = self
            .documents
            .read()
            .map_err(|_| ApiError::SearchBackend { status: 500, body: "index lock poisoned".into() })?;

        let mut hits: Vec<SearchHit> = docs
            .values()
            .filter(|doc| doc.category == category)
            .map(|doc| SearchHit {
                category: doc.category.clone(),
                problem: doc.problem.clone(),
                solution: doc.solution.clone(),
                score: cosine_similarity(vector, &doc.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
