pub mod agent;
pub mod chat;
pub mod chroma_store;
pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod ollama;
pub mod ports;
pub mod retrieval;
pub mod server;
pub mod tantivy_store;
pub mod text;
pub mod themes;
pub mod tokens;
pub mod web_search;

pub use config::AppConfig;
pub use server::run_server;
