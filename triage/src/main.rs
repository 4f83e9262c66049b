use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use warp::Filter;

mod agents;
mod api;
mod bootstrap;
mod config;
mod error;
mod llm;
mod metrics;
mod middleware;
mod models;
mod retry;
mod vector_store;

use agents::classifier::ClassifierAgent;
use agents::knowledge::KnowledgeAgent;
use agents::orchestrator::TriageAgents;
use agents::retriever::RetrievalTool;
use llm::AzureOpenAiClient;
use vector_store::{AzureSearchIndex, KnowledgeIndex, MemoryIndex};

#[derive(Parser)]
#[command(name = "triage", about = "IT support ticket triage assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP chat service (default)
    Serve,
    /// Embed the ticket corpus and upload it to the search index
    BuildIndex {
        /// JSON array of {id, category, problem, solution}; defaults to KNOWLEDGE_BASE_FILE
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("Configuration loaded");

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;
    let llm = AzureOpenAiClient::new(http.clone(), config.openai.clone(), config.max_retries);
    let index = match &config.search {
        Some(search) => KnowledgeIndex::Remote(AzureSearchIndex::new(
            http.clone(),
            search.clone(),
            config.embedding_dimensions,
            config.max_retries,
        )),
        None => KnowledgeIndex::Memory(MemoryIndex::new(config.embedding_dimensions)),
    };
    info!("Using {} knowledge index", index.backend());

    match cli.command.unwrap_or(Command::Serve) {
        Command::BuildIndex { data } => {
            let path = data.unwrap_or_else(|| PathBuf::from(&config.knowledge_base_file));
            if matches!(index, KnowledgeIndex::Memory(_)) {
                warn!("AZURE_SEARCH_ENDPOINT is not set; the in-memory index is discarded on exit");
            }
            let records = bootstrap::load_records(&path)?;
            bootstrap::build_index(&llm, &index, records).await?;
            Ok(())
        }
        Command::Serve => serve(config, llm, index).await,
    }
}

async fn serve(config: config::Config, llm: AzureOpenAiClient, index: KnowledgeIndex) -> anyhow::Result<()> {
    if let KnowledgeIndex::Memory(memory) = &index {
        seed_memory_index(&llm, &index, Path::new(&config.knowledge_base_file)).await;
        info!("In-memory knowledge index holds {} document(s)", memory.len());
    }

    let agents = Arc::new(TriageAgents::new(
        ClassifierAgent::new(llm.clone()),
        RetrievalTool::new(llm.clone(), index),
        KnowledgeAgent::new(llm),
        config.max_rounds,
    ));
    let chat_limiter = middleware::chat_limiter(config.chat_rate_limit_per_minute);

    // Build API routes
    let api_routes = api::routes(agents, chat_limiter);

    // Health check route
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    // Metrics route
    let metrics = warp::path("metrics").and(warp::get()).map(|| {
        let (buffer, content_type) = metrics::render();
        warp::reply::with_header(buffer, "Content-Type", content_type)
    });

    let routes = health
        .or(metrics)
        .or(api_routes)
        .recover(error::handle_rejection)
        .with(warp::log("triage"))
        .with(middleware::cors(&config.cors_origin));

    // Start server
    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], config.port), async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
    });
    info!("Server listening on {}", addr);
    server.await;

    Ok(())
}

async fn seed_memory_index(llm: &AzureOpenAiClient, index: &KnowledgeIndex, path: &Path) {
    if !path.exists() {
        warn!("Knowledge base {} not found; retrieval will find no matches", path.display());
        return;
    }
    let result = match bootstrap::load_records(path) {
        Ok(records) => bootstrap::build_index(llm, index, records).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        warn!("Could not seed the in-memory index: {:#}", e);
    }
}
