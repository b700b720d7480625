use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

const TENANT: &str = "default_tenant";
const DATABASE: &str = "default_database";

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChromaRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: ChromaMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaMetadata {
    pub document_id: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    pub chunk_index: i64,
}

/// Chroma HTTP v2 client bound to one collection.
#[derive(Clone)]
pub struct ChromaStore {
    client: Client,
    base_url: String,
    collection: String,
    collection_id: Arc<RwLock<Option<String>>>,
}

impl ChromaStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            collection_id: Arc::new(RwLock::new(None)),
        }
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{TENANT}/databases/{DATABASE}/collections",
            self.base_url
        )
    }

    fn operation_url(&self, collection_id: &str, operation: &str) -> String {
        format!("{}/{collection_id}/{operation}", self.collections_url())
    }

    pub async fn heartbeat(&self) -> Result<()> {
        self.client
            .get(format!("{}/api/v2/heartbeat", self.base_url))
            .send()
            .await
            .context("failed to contact chroma heartbeat")?
            .error_for_status()
            .context("chroma heartbeat returned non-success status")?;
        Ok(())
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self
            .client
            .get(self.collections_url())
            .send()
            .await
            .context("failed to contact chroma while listing collections")?
            .error_for_status()
            .context("chroma list collections returned non-success status")?
            .json::<Vec<Value>>()
            .await
            .context("failed to decode chroma collections")?;

        Ok(collections
            .iter()
            .filter_map(|c| c.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .collect())
    }

    /// Creates the collection if missing and caches its id.
    pub async fn ensure_collection(&self) -> Result<String> {
        if let Some(id) = self.collection_id.read().await.clone() {
            return Ok(id);
        }

        let payload = json!({
            "name": self.collection,
            "metadata": { "hnsw:space": "cosine" },
            "get_or_create": true,
        });

        let collection = self
            .client
            .post(self.collections_url())
            .json(&payload)
            .send()
            .await
            .context("failed to contact chroma while creating collection")?
            .error_for_status()
            .context("chroma failed to create collection")?
            .json::<Value>()
            .await
            .context("failed to decode chroma collection")?;

        let id = collection
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("chroma collection response missing id"))?;

        *self.collection_id.write().await = Some(id.clone());
        tracing::debug!("chroma collection {} resolved to {}", self.collection, id);
        Ok(id)
    }

    pub async fn upsert(&self, records: &[ChromaRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let collection_id = self.ensure_collection().await?;
        let body = json!({
            "ids": records.iter().map(|r| &r.id).collect::<Vec<_>>(),
            "embeddings": records.iter().map(|r| &r.embedding).collect::<Vec<_>>(),
            "documents": records.iter().map(|r| &r.document).collect::<Vec<_>>(),
            "metadatas": records.iter().map(|r| &r.metadata).collect::<Vec<_>>(),
        });

        self.client
            .post(self.operation_url(&collection_id, "upsert"))
            .json(&body)
            .send()
            .await
            .context("failed to contact chroma during upsert")?
            .error_for_status()
            .context("chroma upsert returned non-success status")?;

        Ok(())
    }

    pub async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        if embedding.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let collection_id = self.ensure_collection().await?;
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": limit,
            "include": ["distances"],
        });

        let response = self
            .client
            .post(self.operation_url(&collection_id, "query"))
            .json(&body)
            .send()
            .await
            .context("failed to contact chroma during query")?
            .error_for_status()
            .context("chroma query returned non-success status")?
            .json::<ChromaQueryResponse>()
            .await
            .context("failed to decode chroma query response")?;

        Ok(parse_query_response(response))
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        let collection_id = self.ensure_collection().await?;
        self.client
            .post(self.operation_url(&collection_id, "delete"))
            .json(&json!({ "where": { "document_id": document_id } }))
            .send()
            .await
            .context("failed to contact chroma during delete")?
            .error_for_status()
            .context("chroma delete returned non-success status")?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ChromaQueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

fn parse_query_response(response: ChromaQueryResponse) -> Vec<VectorHit> {
    let Some(ids) = response.ids.into_iter().next() else {
        return vec![];
    };
    let distances = response
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    ids.into_iter()
        .enumerate()
        .map(|(idx, chunk_id)| {
            // cosine distance in [0, 2]
            let distance = distances.get(idx).copied().flatten().unwrap_or(1.0);
            VectorHit {
                chunk_id,
                score: 1.0 - distance,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COLLECTIONS: &str = "/api/v2/tenants/default_tenant/databases/default_database/collections";

    async fn mount_collection(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(COLLECTIONS))
            .and(body_partial_json(json!({ "name": "rag_collection", "get_or_create": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "col-1", "name": "rag_collection" })),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn query_converts_distances_to_similarity() {
        let server = MockServer::start().await;
        mount_collection(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/col-1/query")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ids": [["a", "b"]],
                "distances": [[0.25, 0.5]]
            })))
            .mount(&server)
            .await;

        let store = ChromaStore::new(server.uri(), "rag_collection");
        let hits = store.query(&[0.1, 0.2], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "a");
        assert!((hits[0].score - 0.75).abs() < 1e-6);

        // collection id is cached; the POST mock expects a single call
        store.query(&[0.1, 0.2], 2).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_sends_parallel_arrays() {
        let server = MockServer::start().await;
        mount_collection(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/col-1/upsert")))
            .and(body_partial_json(json!({
                "ids": ["c1"],
                "documents": ["hello"],
                "metadatas": [{ "document_id": "d1", "source": "a.pdf", "page": 2, "chunk_index": 0 }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        let store = ChromaStore::new(server.uri(), "rag_collection");
        store
            .upsert(&[ChromaRecord {
                id: "c1".to_string(),
                embedding: vec![0.5, 0.5],
                document: "hello".to_string(),
                metadata: ChromaMetadata {
                    document_id: "d1".to_string(),
                    source: "a.pdf".to_string(),
                    page: Some(2),
                    chunk_index: 0,
                },
            }])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_collections_returns_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTIONS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "1", "name": "rag_collection" },
                { "id": "2", "name": "other" }
            ])))
            .mount(&server)
            .await;

        let store = ChromaStore::new(server.uri(), "rag_collection");
        let names = store.list_collections().await.unwrap();
        assert_eq!(names, vec!["rag_collection", "other"]);
    }

    #[test]
    fn empty_query_response_has_no_hits() {
        let hits = parse_query_response(ChromaQueryResponse {
            ids: vec![],
            distances: None,
        });
        assert!(hits.is_empty());
    }
}
