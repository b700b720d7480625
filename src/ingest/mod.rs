pub mod html;
pub mod javascript;
pub mod pdf;
pub mod splitter;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chroma_store::{ChromaMetadata, ChromaRecord, ChromaStore};
use crate::config::AppConfig;
use crate::db::Database;
use crate::models::{Chunk, DocumentKind, DocumentRecord, IngestRequest, IngestStatus, SourceUnit};
use crate::ollama::OllamaClient;
use crate::tantivy_store::TantivyStore;
use crate::tokens::estimate_tokens;
use splitter::RecursiveSplitter;

const UPSERT_BATCH: usize = 64;

#[derive(Clone)]
pub struct Ingestor {
    config: AppConfig,
    db: Database,
    ollama: OllamaClient,
    chroma: ChromaStore,
    tantivy: TantivyStore,
}

#[derive(Debug, Clone)]
pub struct IngestResult {
    pub document_id: String,
    pub chunk_count: i64,
    pub converted_scripts: usize,
    pub skipped: bool,
}

impl Ingestor {
    pub fn new(
        config: AppConfig,
        db: Database,
        ollama: OllamaClient,
        chroma: ChromaStore,
        tantivy: TantivyStore,
    ) -> Self {
        Self {
            config,
            db,
            ollama,
            chroma,
            tantivy,
        }
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        self.db.list_documents().await
    }

    pub async fn ingest_file<F>(
        &self,
        job_id: &str,
        request: IngestRequest,
        mut progress: F,
    ) -> Result<IngestResult>
    where
        F: FnMut(IngestStatus) + Send,
    {
        let kind = DocumentKind::from_filename(&request.filename).ok_or_else(|| {
            anyhow::anyhow!(
                "unsupported file type: {} (expected .pdf, .html or .htm)",
                request.filename
            )
        })?;

        let now = Utc::now();
        let mut status = IngestStatus {
            job_id: job_id.to_string(),
            status: "running".to_string(),
            stage: "hashing".to_string(),
            message: None,
            document_id: None,
            chunk_count: 0,
            started_at: now,
            updated_at: now,
        };
        self.report(&mut status, &mut progress).await?;

        let sha256 = file_sha256(&request.path).await?;

        if let Some(existing) = self.db.find_document_by_sha(&sha256).await? {
            if existing.status == "ready" && !request.rebuild {
                status.status = "completed".to_string();
                status.stage = "skipped_unchanged".to_string();
                status.message = Some(format!(
                    "{} is already processed; skipped re-ingest.",
                    existing.filename
                ));
                status.document_id = Some(existing.id.clone());
                status.chunk_count = existing.chunk_count;
                self.report(&mut status, &mut progress).await?;

                return Ok(IngestResult {
                    document_id: existing.id,
                    chunk_count: existing.chunk_count,
                    converted_scripts: 0,
                    skipped: true,
                });
            }

            tracing::info!("replacing previous ingest of {}", existing.filename);
            self.remove_document(&existing.id).await?;
        }

        let document = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            filename: request.filename.clone(),
            kind,
            sha256,
            status: "processing".to_string(),
            chunk_count: 0,
            created_at: Utc::now(),
        };
        self.db.insert_document(&document).await?;
        status.document_id = Some(document.id.clone());

        match self
            .process_document(&document, Path::new(&request.path), &mut status, &mut progress)
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => {
                self.discard_partial(&document.id).await;
                if let Err(mark_err) = self
                    .db
                    .update_document_status(&document.id, "failed", 0)
                    .await
                {
                    tracing::warn!("could not mark document {} failed: {mark_err:#}", document.id);
                }
                Err(err)
            }
        }
    }

    async fn process_document<F>(
        &self,
        document: &DocumentRecord,
        path: &Path,
        status: &mut IngestStatus,
        progress: &mut F,
    ) -> Result<IngestResult>
    where
        F: FnMut(IngestStatus) + Send,
    {
        status.stage = "extracting".to_string();
        self.report(status, progress).await?;

        let units = extract_units(document.kind, path).await?;
        if units.iter().all(|unit| unit.content.trim().is_empty()) {
            anyhow::bail!("no text could be extracted from {}", document.filename);
        }

        status.stage = "converting_javascript".to_string();
        self.report(status, progress).await?;

        let mut converted_scripts = 0;
        let mut rewritten_units = Vec::with_capacity(units.len());
        for unit in units {
            let (content, count) = javascript::rewrite_javascript(&unit.content, |js| async move {
                javascript::convert_with_ollama(
                    &self.ollama,
                    &self.config.models.coding_model,
                    self.config.models.temperature,
                    &js,
                )
                .await
            })
            .await;
            converted_scripts += count;
            rewritten_units.push(SourceUnit {
                page: unit.page,
                content,
            });
        }
        if converted_scripts > 0 {
            tracing::info!(
                "converted {converted_scripts} javascript blocks in {}",
                document.filename
            );
        }

        status.stage = "splitting".to_string();
        self.report(status, progress).await?;

        let splitter = RecursiveSplitter::new(
            self.config.tokens.chunk_size,
            self.config.tokens.chunk_overlap,
        );
        let chunks = build_chunks(&splitter, &document.id, &document.filename, rewritten_units);
        if chunks.is_empty() {
            anyhow::bail!("no chunks generated from {}", document.filename);
        }
        status.chunk_count = chunks.len() as i64;

        status.stage = "embedding_and_indexing".to_string();
        self.report(status, progress).await?;

        let mut records = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let embedding = self
                .ollama
                .embed(&self.config.models.embedding_model, &chunk.content)
                .await
                .with_context(|| format!("failed embedding for chunk {}", chunk.id))?;

            records.push(ChromaRecord {
                id: chunk.id.clone(),
                embedding,
                document: chunk.content.clone(),
                metadata: ChromaMetadata {
                    document_id: chunk.document_id.clone(),
                    source: chunk.source.clone(),
                    page: chunk.page,
                    chunk_index: chunk.chunk_index,
                },
            });
        }

        for batch in records.chunks(UPSERT_BATCH) {
            self.chroma.upsert(batch).await?;
        }

        let tantivy = self.tantivy.clone();
        let chunks_for_index = chunks.clone();
        tokio::task::spawn_blocking(move || tantivy.add_chunks(&chunks_for_index))
            .await
            .context("tantivy indexing task panicked")??;

        self.db.insert_chunks(&chunks).await?;
        self.db
            .update_document_status(&document.id, "ready", chunks.len() as i64)
            .await?;

        status.status = "completed".to_string();
        status.stage = "done".to_string();
        status.message = Some(format!(
            "{} processed into {} chunks",
            document.filename,
            chunks.len()
        ));
        self.report(status, progress).await?;

        Ok(IngestResult {
            document_id: document.id.clone(),
            chunk_count: chunks.len() as i64,
            converted_scripts,
            skipped: false,
        })
    }

    /// Drops a document from every index and from sqlite.
    pub async fn remove_document(&self, document_id: &str) -> Result<()> {
        if let Err(err) = self.chroma.delete_document(document_id).await {
            tracing::warn!("chroma delete for {document_id} failed: {err:#}");
        }
        self.delete_from_tantivy(document_id).await?;
        self.db.delete_document(document_id).await
    }

    /// Clears whatever a failed run already wrote; the document row stays as `failed`.
    async fn discard_partial(&self, document_id: &str) {
        if let Err(err) = self.chroma.delete_document(document_id).await {
            tracing::warn!("chroma cleanup for {document_id} failed: {err:#}");
        }
        if let Err(err) = self.delete_from_tantivy(document_id).await {
            tracing::warn!("tantivy cleanup for {document_id} failed: {err:#}");
        }
        if let Err(err) = self.db.delete_chunks_for_document(document_id).await {
            tracing::warn!("chunk cleanup for {document_id} failed: {err:#}");
        }
    }

    async fn delete_from_tantivy(&self, document_id: &str) -> Result<()> {
        let tantivy = self.tantivy.clone();
        let id = document_id.to_string();
        tokio::task::spawn_blocking(move || tantivy.delete_document(&id))
            .await
            .context("tantivy delete task panicked")?
    }

    async fn report<F>(&self, status: &mut IngestStatus, progress: &mut F) -> Result<()>
    where
        F: FnMut(IngestStatus) + Send,
    {
        status.updated_at = Utc::now();
        progress(status.clone());
        self.db.upsert_ingest_status(status).await
    }
}

/// Path the server stores an upload under before ingesting it.
pub fn upload_path(upload_dir: &Path, filename: &str) -> PathBuf {
    let safe: String = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    upload_dir.join(format!("{}-{}", Uuid::new_v4(), safe))
}

async fn extract_units(kind: DocumentKind, path: &Path) -> Result<Vec<SourceUnit>> {
    match kind {
        DocumentKind::Pdf => pdf::extract_pdf_units(path).await,
        DocumentKind::Html => {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || html::extract_html_units(&path))
                .await
                .context("HTML extraction task panicked")?
        }
    }
}

fn build_chunks(
    splitter: &RecursiveSplitter,
    document_id: &str,
    source: &str,
    units: Vec<SourceUnit>,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for unit in units {
        for content in splitter.split_text(&unit.content) {
            chunks.push(Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                token_count: estimate_tokens(&content) as i64,
                content,
                page: unit.page,
                chunk_index: chunks.len() as i64,
                source: source.to_string(),
            });
        }
    }

    chunks
}

async fn file_sha256(path: &str) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed reading file for hash: {}", path))?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const COLLECTIONS: &str = "/api/v2/tenants/default_tenant/databases/default_database/collections";
    const GUIDE: &str = "<html><body><h1>Pump manual</h1><p>Prime the coolant pump before start-up.</p></body></html>";

    struct Fixture {
        dir: tempfile::TempDir,
        db: Database,
        tantivy: TantivyStore,
        ingestor: Ingestor,
    }

    async fn fixture(server: &MockServer) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::from_env();
        config.data_dir = dir.path().to_path_buf();

        let db = Database::new(&config).await.unwrap();
        let tantivy = TantivyStore::new(config.tantivy_dir());
        let ingestor = Ingestor::new(
            config,
            db.clone(),
            OllamaClient::new(server.uri()),
            ChromaStore::new(server.uri(), "rag_collection"),
            tantivy.clone(),
        );
        Fixture {
            dir,
            db,
            tantivy,
            ingestor,
        }
    }

    async fn mount_chroma(server: &MockServer, deletes: u64) {
        Mock::given(method("POST"))
            .and(path(COLLECTIONS))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "col-1", "name": "rag_collection" })),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/col-1/upsert")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{COLLECTIONS}/col-1/delete")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(deletes)
            .mount(server)
            .await;
    }

    async fn mount_embeddings(server: &MockServer, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.1, 0.2, 0.3]] })),
            )
            .expect(calls)
            .mount(server)
            .await;
    }

    fn request(fixture: &Fixture, filename: &str, html: &str, rebuild: bool) -> IngestRequest {
        let path = fixture.dir.path().join(filename);
        std::fs::write(&path, html).unwrap();
        IngestRequest {
            path: path.display().to_string(),
            filename: filename.to_string(),
            rebuild,
        }
    }

    #[tokio::test]
    async fn html_document_is_indexed_everywhere() {
        let server = MockServer::start().await;
        mount_chroma(&server, 0).await;
        mount_embeddings(&server, 1).await;
        let fx = fixture(&server).await;

        let mut stages = Vec::new();
        let result = fx
            .ingestor
            .ingest_file("job-1", request(&fx, "guide.html", GUIDE, false), |status| {
                stages.push(status.stage)
            })
            .await
            .unwrap();

        assert!(!result.skipped);
        assert_eq!(result.chunk_count, 1);
        assert_eq!(
            stages,
            vec![
                "hashing",
                "extracting",
                "converting_javascript",
                "splitting",
                "embedding_and_indexing",
                "done"
            ]
        );

        let documents = fx.ingestor.list_documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].status, "ready");
        assert_eq!(documents[0].chunk_count, 1);

        let hits = fx.tantivy.search("coolant", 5).unwrap();
        assert_eq!(hits.len(), 1);
        let chunks = fx.db.get_chunks_by_ids(&[hits[0].0.clone()]).await.unwrap();
        assert_eq!(chunks[0].document_id, result.document_id);

        let status = fx.db.get_ingest_status("job-1").await.unwrap().unwrap();
        assert_eq!(status.status, "completed");
        assert_eq!(status.stage, "done");
    }

    #[tokio::test]
    async fn unchanged_ready_document_is_skipped() {
        let server = MockServer::start().await;
        mount_chroma(&server, 0).await;
        mount_embeddings(&server, 1).await;
        let fx = fixture(&server).await;

        let first = fx
            .ingestor
            .ingest_file("job-1", request(&fx, "guide.html", GUIDE, false), |_| {})
            .await
            .unwrap();

        let mut stages = Vec::new();
        let second = fx
            .ingestor
            .ingest_file("job-2", request(&fx, "copy.html", GUIDE, false), |status| {
                stages.push(status.stage)
            })
            .await
            .unwrap();

        assert!(second.skipped);
        assert_eq!(second.document_id, first.document_id);
        assert_eq!(second.chunk_count, 1);
        assert_eq!(stages, vec!["hashing", "skipped_unchanged"]);
        assert_eq!(fx.ingestor.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rebuild_replaces_the_previous_ingest() {
        let server = MockServer::start().await;
        mount_chroma(&server, 1).await;
        mount_embeddings(&server, 2).await;
        let fx = fixture(&server).await;

        let first = fx
            .ingestor
            .ingest_file("job-1", request(&fx, "guide.html", GUIDE, false), |_| {})
            .await
            .unwrap();
        let rebuilt = fx
            .ingestor
            .ingest_file("job-2", request(&fx, "guide.html", GUIDE, true), |_| {})
            .await
            .unwrap();

        assert!(!rebuilt.skipped);
        assert_ne!(rebuilt.document_id, first.document_id);

        let documents = fx.ingestor.list_documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, rebuilt.document_id);

        let hits = fx.tantivy.search("coolant", 5).unwrap();
        assert_eq!(hits.len(), 1);
        let chunks = fx.db.get_chunks_by_ids(&[hits[0].0.clone()]).await.unwrap();
        assert_eq!(chunks[0].document_id, rebuilt.document_id);
    }

    #[tokio::test]
    async fn textless_document_fails_and_is_marked() {
        let server = MockServer::start().await;
        mount_chroma(&server, 1).await;
        mount_embeddings(&server, 0).await;
        let fx = fixture(&server).await;

        let err = fx
            .ingestor
            .ingest_file(
                "job-1",
                request(&fx, "blank.html", "<html><body>   </body></html>", false),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("no text could be extracted from blank.html"));

        let documents = fx.ingestor.list_documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].status, "failed");
        assert_eq!(documents[0].chunk_count, 0);
    }

    #[tokio::test]
    async fn failed_ingest_is_cleaned_up_and_retried() {
        // no embed mock yet: /api/embed and /api/embeddings both answer 404
        let server = MockServer::start().await;
        mount_chroma(&server, 2).await;
        let fx = fixture(&server).await;

        let result = fx
            .ingestor
            .ingest_file("job-1", request(&fx, "guide.html", GUIDE, false), |_| {})
            .await;
        assert!(result.is_err());

        let documents = fx.ingestor.list_documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].status, "failed");
        assert!(fx.tantivy.search("coolant", 5).unwrap().is_empty());

        mount_embeddings(&server, 1).await;
        let retried = fx
            .ingestor
            .ingest_file("job-2", request(&fx, "guide.html", GUIDE, false), |_| {})
            .await
            .unwrap();

        assert!(!retried.skipped);
        let documents = fx.ingestor.list_documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].status, "ready");
        assert_eq!(fx.tantivy.search("coolant", 5).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_before_hashing() {
        let server = MockServer::start().await;
        let fx = fixture(&server).await;

        let mut stages = Vec::new();
        let err = fx
            .ingestor
            .ingest_file("job-1", request(&fx, "notes.txt", "plain", false), |status| {
                stages.push(status.stage)
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("unsupported file type: notes.txt"));
        assert!(stages.is_empty());
        assert!(fx.ingestor.list_documents().await.unwrap().is_empty());
    }

    #[test]
    fn chunks_carry_page_and_running_index() {
        let units = vec![
            SourceUnit {
                page: Some(1),
                content: "first page text".to_string(),
            },
            SourceUnit {
                page: Some(2),
                content: (0..60).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" "),
            },
        ];

        let splitter = RecursiveSplitter::new(100, 20);
        let chunks = build_chunks(&splitter, "doc-1", "manual.pdf", units);

        assert!(chunks.len() > 2);
        assert_eq!(chunks[0].page, Some(1));
        assert!(chunks[1..].iter().all(|c| c.page == Some(2)));
        assert!(chunks
            .iter()
            .enumerate()
            .all(|(i, c)| c.chunk_index == i as i64 && c.document_id == "doc-1"));
        assert_eq!(chunks[0].token_count, estimate_tokens("first page text") as i64);
    }

    #[test]
    fn upload_paths_are_sanitized() {
        let path = upload_path(Path::new("/data/uploads"), "../my report (1).pdf");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(path.starts_with("/data/uploads"));
        assert!(name.ends_with("-my_report__1_.pdf"));
    }

    #[tokio::test]
    async fn hashes_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, b"abc").unwrap();

        let hash = file_sha256(path.to_str().unwrap()).await.unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn html_units_extract_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html><head><title>T</title></head><body><p>Hi</p></body></html>")
            .unwrap();

        let units = extract_units(DocumentKind::Html, &path).await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].content, "Hi");
    }
}
