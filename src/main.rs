use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use chatbot::agent::AgentGraph;
use chatbot::chat::ChatService;
use chatbot::chroma_store::ChromaStore;
use chatbot::db::Database;
use chatbot::ingest::Ingestor;
use chatbot::ollama::OllamaClient;
use chatbot::retrieval::Retriever;
use chatbot::tantivy_store::TantivyStore;
use chatbot::web_search::WebSearcher;
use chatbot::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let db = Database::new(&config).await?;
    let ollama = OllamaClient::new(config.ollama_base_url.clone());
    let chroma = ChromaStore::new(
        config.chroma_base_url.clone(),
        config.chroma_collection.clone(),
    );
    let tantivy = TantivyStore::new(config.tantivy_dir());

    if let Err(err) = chroma.ensure_collection().await {
        tracing::warn!("chroma is not reachable yet, retrieval will degrade to bm25: {err:#}");
    }

    let retriever = Retriever::new(
        db.clone(),
        chroma.clone(),
        tantivy.clone(),
        ollama.clone(),
        config.models.embedding_model.clone(),
    );
    let graph = AgentGraph::new(
        &config,
        Arc::new(ollama.clone()),
        Arc::new(retriever),
        Arc::new(WebSearcher::new(config.web.endpoint.clone())),
    );

    let generation_limit = Arc::new(Semaphore::new(1));
    let chat = ChatService::new(&config, db.clone(), graph, generation_limit);

    let ingestor = Ingestor::new(
        config.clone(),
        db.clone(),
        ollama.clone(),
        chroma.clone(),
        tantivy,
    );

    run_server(config, db, chat, ingestor, ollama, chroma).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
