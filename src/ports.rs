use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChatMessage, RetrievalResult, SearchHit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub num_ctx: usize,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String>;
}

#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}
