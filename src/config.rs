use std::env;
use std::path::PathBuf;

use crate::models::AgentRoute;

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub general_model: String,
    pub coding_model: String,
    pub reasoning_model: String,
    pub vision_model: String,
    pub embedding_model: String,
    pub temperature: f32,
}

impl ModelConfig {
    /// Model that serves a given route. Routes that only gather context
    /// answer through the general model.
    pub fn model_for(&self, route: AgentRoute) -> &str {
        match route {
            AgentRoute::CodingMath => &self.coding_model,
            AgentRoute::Reasoning => &self.reasoning_model,
            AgentRoute::General
            | AgentRoute::Rag
            | AgentRoute::ImageAnalysis
            | AgentRoute::WebSearch => &self.general_model,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub context_length: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Clone, Debug)]
pub struct RagConfig {
    pub top_k: usize,
    pub history_messages: i64,
}

#[derive(Clone, Debug)]
pub struct WebSearchConfig {
    pub endpoint: String,
    pub max_results: usize,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub ollama_base_url: String,
    pub chroma_base_url: String,
    pub chroma_collection: String,
    pub models: ModelConfig,
    pub tokens: TokenConfig,
    pub rag: RagConfig,
    pub web: WebSearchConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var("CHATBOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Self {
            bind_addr: env::var("CHATBOT_BIND").unwrap_or_else(|_| "127.0.0.1:7860".to_string()),
            data_dir,
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            chroma_base_url: env::var("CHROMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            chroma_collection: env::var("CHROMA_COLLECTION")
                .unwrap_or_else(|_| "rag_collection".to_string()),
            models: ModelConfig {
                general_model: env::var("GENERAL_MODEL").unwrap_or_else(|_| "gemma:2b".to_string()),
                coding_model: env::var("CODING_MODEL")
                    .unwrap_or_else(|_| "deepseek-r1:latest".to_string()),
                reasoning_model: env::var("REASONING_MODEL")
                    .unwrap_or_else(|_| "llama3.2:latest".to_string()),
                vision_model: env::var("VISION_MODEL").unwrap_or_else(|_| "llava:7b".to_string()),
                embedding_model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "nomic-embed-text".to_string()),
                temperature: parse_env("TEMPERATURE", 0.1),
            },
            tokens: TokenConfig {
                context_length: parse_env("TOKEN_CONTEXT_LENGTH", 4096),
                chunk_size: parse_env("CHUNK_SIZE", 1000),
                chunk_overlap: parse_env("CHUNK_OVERLAP", 200),
            },
            rag: RagConfig {
                top_k: parse_env("RAG_TOP_K", 3),
                history_messages: parse_env("HISTORY_MESSAGES", 8),
            },
            web: WebSearchConfig {
                endpoint: env::var("WEB_SEARCH_URL")
                    .unwrap_or_else(|_| "https://html.duckduckgo.com/html/".to_string()),
                max_results: parse_env("WEB_SEARCH_MAX_RESULTS", 3),
            },
        }
    }

    pub fn tantivy_dir(&self) -> PathBuf {
        self.data_dir.join("tantivy")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn sqlite_dsn(&self) -> String {
        format!("sqlite://{}", self.data_dir.join("chatbot.sqlite3").display())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
