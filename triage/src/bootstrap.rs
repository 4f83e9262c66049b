// Index build: embeds the historical ticket corpus and loads it into the
// knowledge index.

use std::path::Path;

use anyhow::{Context, Result};
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{info, warn};

use crate::llm::AzureOpenAiClient;
use crate::models::{Category, KnowledgeDocument, KnowledgeRecord};
use crate::vector_store::KnowledgeIndex;

const EMBED_CONCURRENCY: usize = 4;

pub fn load_records(path: &Path) -> Result<Vec<KnowledgeRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading knowledge base {}", path.display()))?;
    let records: Vec<KnowledgeRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing knowledge base {}", path.display()))?;
    Ok(records)
}

/// Category name for a corpus record: a taxonomy name as-is, or a numeric
/// issue category id mapped back to its name.
fn resolve_category(raw: &str) -> Option<Category> {
    let raw = raw.trim();
    Category::from_exact(raw).or_else(|| raw.parse::<u8>().ok().and_then(Category::from_issue_category_id))
}

/// Keep records whose category resolves to the taxonomy and whose problem
/// text is non-empty. Numeric categories are rewritten to their names.
pub fn usable_records(records: Vec<KnowledgeRecord>) -> Vec<KnowledgeRecord> {
    records
        .into_iter()
        .filter_map(|mut r| {
            let Some(category) = resolve_category(&r.category) else {
                warn!("Skipping ticket {}: unknown category '{}'", r.id, r.category);
                return None;
            };
            if r.problem.trim().is_empty() {
                warn!("Skipping ticket {}: empty problem text", r.id);
                return None;
            }
            r.category = category.as_str().to_string();
            Some(r)
        })
        .collect()
}

/// Embed every record's problem text and upload the documents. Returns the
/// number of documents indexed.
pub async fn build_index(
    llm: &AzureOpenAiClient,
    index: &KnowledgeIndex,
    records: Vec<KnowledgeRecord>,
) -> Result<usize> {
    let records = usable_records(records);
    info!("Embedding {} ticket(s) into the {} index", records.len(), index.backend());

    index.ensure_index().await.context("creating the search index")?;

    let documents: Vec<KnowledgeDocument> = stream::iter(records)
        .map(|record| async move {
            let embedding = llm.embed(&record.problem).await?;
            Ok::<_, crate::error::ApiError>(record.into_document(embedding))
        })
        .buffered(EMBED_CONCURRENCY)
        .try_collect()
        .await
        .context("embedding knowledge base")?;

    index.upload(&documents).await.context("uploading documents")?;
    info!("Indexed {} document(s)", documents.len());
    Ok(documents.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::{embedding, test_client, EMBED_PATH};
    use crate::vector_store::MemoryIndex;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(id: &str, category: &str, problem: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            id: id.into(),
            category: category.into(),
            problem: problem.into(),
            solution: "fix".into(),
        }
    }

    #[test]
    fn filters_unknown_categories_and_blank_problems() {
        let kept = usable_records(vec![
            record("1", "No Internet", "cable unplugged"),
            record("2", "Printer Jam", "paper stuck"),
            record("3", "Other", "   "),
            record("4", "42", "out of range id"),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "1");
    }

    #[test]
    fn numeric_category_ids_resolve_to_names() {
        let kept = usable_records(vec![
            record("1", "7", "MFA prompt never arrives"),
            record("2", "12", "double charged this month"),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].category, "Authentication Issue");
        assert_eq!(kept[1].category, "Billing / Account");
    }

    #[test]
    fn loads_records_from_file() {
        let path = std::env::temp_dir().join(format!("kb-{}.json", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"id": "TCK-1", "category": "No Internet", "problem": "p", "solution": "s"}}]"#
        )
        .unwrap();

        let records = load_records(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "TCK-1");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_records(Path::new("/nonexistent/kb.json")).is_err());
    }

    #[tokio::test]
    async fn builds_memory_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EMBED_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding(&[0.0, 1.0, 0.0])))
            .expect(2)
            .mount(&server)
            .await;

        let llm = test_client(&server.uri());
        let memory = MemoryIndex::new(3);
        let index = KnowledgeIndex::Memory(memory.clone());
        let count = build_index(
            &llm,
            &index,
            vec![
                record("1", "No Internet", "cable unplugged"),
                record("2", "Hardware Failure", "SFP blinking orange"),
                record("3", "Unknown", "skipped"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(memory.len(), 2);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_the_build() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let llm = test_client(&server.uri());
        let memory = MemoryIndex::new(3);
        let result = build_index(
            &llm,
            &KnowledgeIndex::Memory(memory.clone()),
            vec![record("1", "No Internet", "cable unplugged")],
        )
        .await;
        assert!(result.is_err());
        assert!(memory.is_empty());
    }
}
