use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::chroma_store::{ChromaStore, VectorHit};
use crate::db::Database;
use crate::models::RetrievalResult;
use crate::ollama::OllamaClient;
use crate::ports::DocumentSearch;
use crate::tantivy_store::TantivyStore;

const VECTOR_RECALL_K: usize = 24;
const BM25_RECALL_K: usize = 24;
const RRF_K: f32 = 60.0;

/// Hybrid retriever: Chroma similarity and tantivy BM25, fused by rank.
#[derive(Clone)]
pub struct Retriever {
    db: Database,
    chroma: ChromaStore,
    tantivy: TantivyStore,
    ollama: OllamaClient,
    embedding_model: String,
}

impl Retriever {
    pub fn new(
        db: Database,
        chroma: ChromaStore,
        tantivy: TantivyStore,
        ollama: OllamaClient,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            db,
            chroma,
            tantivy,
            ollama,
            embedding_model: embedding_model.into(),
        }
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let recall_k = top_k.saturating_mul(3).max(VECTOR_RECALL_K);
        let vector_fut = async {
            let embedding = self.ollama.embed(&self.embedding_model, query).await?;
            self.chroma.query(&embedding, recall_k).await
        };

        let tantivy = self.tantivy.clone();
        let query_text = query.to_string();
        let bm25_recall_k = top_k.saturating_mul(3).max(BM25_RECALL_K);
        let bm25_fut =
            tokio::task::spawn_blocking(move || tantivy.search(&query_text, bm25_recall_k));

        let (vector_hits, bm25_hits) = tokio::join!(vector_fut, bm25_fut);

        let vector_hits = vector_hits.unwrap_or_else(|err| {
            tracing::warn!("vector recall failed, continuing with bm25 only: {err:#}");
            vec![]
        });
        let bm25_hits = match bm25_hits {
            Ok(Ok(hits)) => hits,
            Ok(Err(err)) => {
                tracing::warn!("bm25 recall failed, continuing with vectors only: {err:#}");
                vec![]
            }
            Err(err) => {
                tracing::warn!("bm25 recall task panicked: {err}");
                vec![]
            }
        };

        let ranked = fuse_rankings(&vector_hits, &bm25_hits, fusion_weights_for_query(query));
        let ranked_ids: Vec<String> = ranked.iter().map(|(chunk_id, _)| chunk_id.clone()).collect();

        // ids unknown to sqlite are dropped before the top_k cut
        let chunks = self.db.get_chunks_by_ids(&ranked_ids).await?;
        let score_map: HashMap<&str, f32> = ranked
            .iter()
            .map(|(chunk_id, score)| (chunk_id.as_str(), *score))
            .collect();

        let mut out: Vec<RetrievalResult> = chunks
            .into_iter()
            .map(|chunk| RetrievalResult {
                score: *score_map.get(chunk.id.as_str()).unwrap_or(&0.0),
                chunk,
            })
            .collect();

        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        out.truncate(top_k);
        tracing::debug!("retrieved {} chunks for query", out.len());
        Ok(out)
    }
}

#[async_trait]
impl DocumentSearch for Retriever {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        self.retrieve(query, top_k).await
    }
}

/// Reciprocal rank fusion with small bonuses for the raw scores.
fn fuse_rankings(
    vector_hits: &[VectorHit],
    bm25_hits: &[(String, f32)],
    (vector_weight, bm25_weight): (f32, f32),
) -> Vec<(String, f32)> {
    let mut fused_scores: HashMap<String, f32> = HashMap::new();

    for (rank, hit) in vector_hits.iter().enumerate() {
        let rank_score = vector_weight / (RRF_K + (rank + 1) as f32);
        let similarity_bonus = hit.score.clamp(0.0, 1.0) * 0.04;
        *fused_scores.entry(hit.chunk_id.clone()).or_insert(0.0) += rank_score + similarity_bonus;
    }

    for (rank, (chunk_id, raw_score)) in bm25_hits.iter().enumerate() {
        let rank_score = bm25_weight / (RRF_K + (rank + 1) as f32);
        let lexical_bonus = raw_score.max(0.0).ln_1p() * 0.012;
        *fused_scores.entry(chunk_id.clone()).or_insert(0.0) += rank_score + lexical_bonus;
    }

    let mut ranked: Vec<(String, f32)> = fused_scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
}

/// Identifiers, numbers and code-like tokens favour exact lexical matches.
fn fusion_weights_for_query(query: &str) -> (f32, f32) {
    let lexical_signal = query.chars().any(|c| c.is_ascii_digit())
        || query.contains(['_', '(', ')', '.', ':'])
        || query
            .split_whitespace()
            .any(|tok| tok.chars().skip(1).any(|c| c.is_ascii_uppercase()));

    if lexical_signal {
        (0.95, 1.35)
    } else {
        (1.0, 1.0)
    }
}
