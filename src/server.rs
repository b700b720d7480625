use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use askama::Template;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::chat::{ChatService, InvalidRequest};
use crate::chroma_store::ChromaStore;
use crate::config::AppConfig;
use crate::db::Database;
use crate::ingest::{upload_path, IngestResult, Ingestor};
use crate::models::{
    ChatAnswer, ChatRequest, DocumentKind, DocumentRecord, IngestRequest, IngestResponse,
    IngestStatus, SessionRequest, SessionResponse, StoredMessage,
};
use crate::ollama::OllamaClient;
use crate::themes::{theme_css, Theme, DEFAULT_THEME, THEMES};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    db: Database,
    chat: ChatService,
    ingestor: Ingestor,
    ollama: OllamaClient,
    chroma: ChromaStore,
    jobs: Arc<Mutex<HashMap<String, IngestStatus>>>,
}

pub async fn run_server(
    config: AppConfig,
    db: Database,
    chat_service: ChatService,
    ingestor: Ingestor,
    ollama: OllamaClient,
    chroma: ChromaStore,
) -> Result<()> {
    tokio::fs::create_dir_all(&config.data_dir).await?;
    tokio::fs::create_dir_all(config.upload_dir()).await?;

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = AppState {
        config: Arc::new(config),
        db,
        chat: chat_service,
        ingestor,
        ollama,
        chroma,
        jobs: Arc::new(Mutex::new(HashMap::new())),
    };

    let app = build_router(state);

    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/theme/:name", get(theme_stylesheet))
        .route("/api/chat", post(chat_handler))
        .route("/api/documents", get(list_documents).post(upload_document))
        .route("/api/ingest/:job_id", get(get_ingest_status))
        .route("/api/session", post(create_session))
        .route("/api/session/:session_id/messages", get(session_messages))
        .route("/api/health", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let session_id = state.db.create_session().await?;
    let models = &state.config.models;

    let template = IndexTemplate {
        session_id,
        themes: &THEMES,
        default_theme: DEFAULT_THEME,
        agents: vec![
            ("General", models.general_model.clone()),
            ("Coding / Math", models.coding_model.clone()),
            ("Reasoning", models.reasoning_model.clone()),
            ("Vision", models.vision_model.clone()),
            ("Embedding", models.embedding_model.clone()),
        ],
    };
    let body = template.render()?;

    Ok(Html(body))
}

async fn theme_stylesheet(Path(name): Path<String>) -> Result<Response, ApiError> {
    let name = name.trim_end_matches(".css");
    match theme_css(name) {
        Some(css) => Ok(([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response()),
        None => Err(ApiError::not_found(format!("unknown theme: {}", name))),
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, ApiError> {
    let answer = state.chat.answer(request).await?;
    Ok(Json(answer))
}

async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentRecord>>, ApiError> {
    Ok(Json(state.ingestor.list_documents().await?))
}

async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut rebuild = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                upload = Some((filename, bytes));
            }
            Some("rebuild") => {
                let value = field.text().await?;
                rebuild = matches!(value.trim(), "true" | "1" | "on" | "yes");
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::bad_request("multipart field 'file' is required"))?;
    if DocumentKind::from_filename(&filename).is_none() {
        return Err(ApiError::bad_request(
            "PDF 또는 HTML 파일만 업로드할 수 있습니다.",
        ));
    }
    if bytes.is_empty() {
        return Err(ApiError::bad_request("uploaded file is empty"));
    }

    let upload_dir: PathBuf = state.config.upload_dir();
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .map_err(anyhow::Error::from)?;
    let path = upload_path(&upload_dir, &filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(anyhow::Error::from)?;

    let request = IngestRequest {
        path: path.display().to_string(),
        filename,
        rebuild,
    };
    let job_id = start_ingest_job(state, request).await?;

    Ok(Json(IngestResponse {
        job_id,
        status: "started".to_string(),
    }))
}

async fn start_ingest_job(state: AppState, request: IngestRequest) -> Result<String, ApiError> {
    let job_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let initial = IngestStatus {
        job_id: job_id.clone(),
        status: "started".to_string(),
        stage: "queued".to_string(),
        message: Some(format!("queued {}", request.filename)),
        document_id: None,
        chunk_count: 0,
        started_at: now,
        updated_at: now,
    };

    {
        let mut jobs = state
            .jobs
            .lock()
            .map_err(|_| ApiError::from(anyhow::anyhow!("lock poisoned")))?;
        jobs.insert(job_id.clone(), initial.clone());
    }
    state.db.upsert_ingest_status(&initial).await?;

    let job_id_for_task = job_id.clone();
    tokio::spawn(async move {
        let jobs = state.jobs.clone();
        let upload = PathBuf::from(&request.path);

        let callback = |status: IngestStatus| {
            if let Ok(mut guard) = jobs.lock() {
                guard.insert(status.job_id.clone(), status);
            }
        };

        let result: Result<IngestResult> = state
            .ingestor
            .ingest_file(&job_id_for_task, request, callback)
            .await;

        settle_ingest_job(&state, &job_id_for_task, &upload, now, result).await;
    });

    Ok(job_id)
}

/// Records the final status, drops uploads that were not indexed, and evicts
/// the job from memory once sqlite holds its final status.
async fn settle_ingest_job(
    state: &AppState,
    job_id: &str,
    upload: &FsPath,
    started_at: DateTime<Utc>,
    result: Result<IngestResult>,
) {
    let keep_upload = matches!(&result, Ok(outcome) if !outcome.skipped);

    let persisted = match result {
        Ok(_) => true,
        Err(err) => {
            tracing::error!("ingest job {} failed: {:#}", job_id, err);
            let failed_status = IngestStatus {
                job_id: job_id.to_string(),
                status: "failed".to_string(),
                stage: "error".to_string(),
                message: Some(format!("{err:#}")),
                document_id: None,
                chunk_count: 0,
                started_at,
                updated_at: Utc::now(),
            };

            if let Ok(mut guard) = state.jobs.lock() {
                guard.insert(job_id.to_string(), failed_status.clone());
            }
            match state.db.upsert_ingest_status(&failed_status).await {
                Ok(()) => true,
                Err(db_err) => {
                    tracing::warn!("could not persist failed status: {db_err:#}");
                    false
                }
            }
        }
    };

    if !keep_upload {
        if let Err(err) = tokio::fs::remove_file(upload).await {
            tracing::warn!("could not remove upload {}: {err}", upload.display());
        }
    }

    if persisted {
        if let Ok(mut guard) = state.jobs.lock() {
            guard.remove(job_id);
        }
    }
}

async fn get_ingest_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<IngestStatus>, ApiError> {
    if let Some(status) = state
        .jobs
        .lock()
        .map_err(|_| ApiError::from(anyhow::anyhow!("lock poisoned")))?
        .get(&job_id)
        .cloned()
    {
        return Ok(Json(status));
    }

    let status = state.db.get_ingest_status(&job_id).await?;
    match status {
        Some(status) => Ok(Json(status)),
        None => Err(ApiError::not_found(format!(
            "ingest job not found: {}",
            job_id
        ))),
    }
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    if request.reset.unwrap_or(false) {
        if let Some(session_id) = request.session_id {
            state.db.ensure_session(&session_id).await?;
            state.db.delete_session_messages(&session_id).await?;
            return Ok(Json(SessionResponse { session_id }));
        }
    }

    let session_id = state.db.create_session().await?;
    Ok(Json(SessionResponse { session_id }))
}

async fn session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    Ok(Json(state.db.session_messages(&session_id).await?))
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    database: bool,
    ollama: OllamaHealth,
    chroma: bool,
}

#[derive(Debug, Serialize)]
struct OllamaHealth {
    reachable: bool,
    missing_models: Vec<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let (db, models, chroma) = tokio::join!(
        state.db.ping(),
        state.ollama.list_models(),
        state.chroma.heartbeat()
    );

    let configured = &state.config.models;
    let ollama = match models {
        Ok(installed) => OllamaHealth {
            reachable: true,
            missing_models: missing_models(
                &installed,
                &[
                    &configured.general_model,
                    &configured.coding_model,
                    &configured.reasoning_model,
                    &configured.vision_model,
                    &configured.embedding_model,
                ],
            ),
        },
        Err(err) => {
            tracing::warn!("ollama health check failed: {err:#}");
            OllamaHealth {
                reachable: false,
                missing_models: vec![],
            }
        }
    };
    if let Err(err) = &chroma {
        tracing::warn!("chroma health check failed: {err:#}");
    }

    let healthy =
        db.is_ok() && ollama.reachable && ollama.missing_models.is_empty() && chroma.is_ok();
    Json(HealthReport {
        status: if healthy { "ok" } else { "degraded" },
        database: db.is_ok(),
        ollama,
        chroma: chroma.is_ok(),
    })
}

/// Ollama lists `name:tag`; a configured name without a tag means `:latest`.
fn missing_models(installed: &[String], configured: &[&String]) -> Vec<String> {
    let with_tag = |name: &str| {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{name}:latest")
        }
    };
    let installed: Vec<String> = installed.iter().map(|m| with_tag(m.as_str())).collect();

    configured
        .iter()
        .filter(|name| !installed.contains(&with_tag(name.as_str())))
        .map(|name| name.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    session_id: String,
    themes: &'static [Theme],
    default_theme: &'static str,
    agents: Vec<(&'static str, String)>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        if let Some(invalid) = value.downcast_ref::<InvalidRequest>() {
            return Self::bad_request(invalid.0.clone());
        }
        tracing::error!("request failed: {value:#}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(value: MultipartError) -> Self {
        Self::bad_request(format!("invalid multipart body: {}", value))
    }
}

impl From<askama::Error> for ApiError {
    fn from(value: askama::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    use super::*;
    use crate::agent::AgentGraph;
    use crate::models::Role;
    use crate::retrieval::Retriever;
    use crate::tantivy_store::TantivyStore;
    use crate::web_search::WebSearcher;

    const BOUNDARY: &str = "chatbot-test-boundary";
    // nothing listens on the discard port
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    async fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::from_env();
        config.data_dir = dir.path().to_path_buf();
        config.ollama_base_url = UNREACHABLE.to_string();
        config.chroma_base_url = UNREACHABLE.to_string();

        let db = Database::new(&config).await.unwrap();
        let ollama = OllamaClient::new(config.ollama_base_url.clone());
        let chroma = ChromaStore::new(
            config.chroma_base_url.clone(),
            config.chroma_collection.clone(),
        );
        let tantivy = TantivyStore::new(config.tantivy_dir());
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
            Arc::new(WebSearcher::new(UNREACHABLE)),
        );
        let chat = ChatService::new(&config, db.clone(), graph, Arc::new(Semaphore::new(1)));
        let ingestor = Ingestor::new(
            config.clone(),
            db.clone(),
            ollama.clone(),
            chroma.clone(),
            tantivy,
        );

        let state = AppState {
            config: Arc::new(config),
            db,
            chat,
            ingestor,
            ollama,
            chroma,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        };
        (dir, state)
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> Body {
        let mut body = String::new();
        for (name, filename, value) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    fn upload_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(parts))
            .unwrap()
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn ingest_result(skipped: bool) -> IngestResult {
        IngestResult {
            document_id: "d1".to_string(),
            chunk_count: 3,
            converted_scripts: 0,
            skipped,
        }
    }

    fn queued(state: &AppState, job_id: &str) {
        let now = Utc::now();
        state.jobs.lock().unwrap().insert(
            job_id.to_string(),
            IngestStatus {
                job_id: job_id.to_string(),
                status: "running".to_string(),
                stage: "hashing".to_string(),
                message: None,
                document_id: None,
                chunk_count: 0,
                started_at: now,
                updated_at: now,
            },
        );
    }

    #[tokio::test]
    async fn unknown_theme_is_not_found() {
        let (_dir, state) = test_state().await;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/theme/myspace.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "unknown theme: myspace");

        let response = app
            .oneshot(Request::builder().uri("/theme/line.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/css; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn upload_without_file_field_is_rejected() {
        let (_dir, state) = test_state().await;
        let response = build_router(state)
            .oneshot(upload_request(&[("rebuild", None, "true")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "multipart field 'file' is required"
        );
    }

    #[tokio::test]
    async fn upload_of_unsupported_kind_is_rejected() {
        let (dir, state) = test_state().await;
        let response = build_router(state)
            .oneshot(upload_request(&[("file", Some("notes.docx"), "binary")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let uploads = dir.path().join("uploads");
        assert!(!uploads.exists() || std::fs::read_dir(uploads).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn session_reset_keeps_id_and_clears_messages() {
        let (_dir, state) = test_state().await;
        let session = state.db.create_session().await.unwrap();
        state
            .db
            .save_message(&session, Role::User, "hello", None)
            .await
            .unwrap();
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                "/api/session",
                json!({ "session_id": session, "reset": true }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["session_id"], session.as_str());
        assert!(state.db.session_messages(&session).await.unwrap().is_empty());

        let response = app
            .oneshot(json_request("/api/session", json!({})))
            .await
            .unwrap();
        let fresh = json_body(response).await;
        assert_ne!(fresh["session_id"], session.as_str());
    }

    #[tokio::test]
    async fn empty_chat_message_is_a_bad_request() {
        let (_dir, state) = test_state().await;
        let response = build_router(state)
            .oneshot(json_request(
                "/api/chat",
                json!({ "session_id": "s1", "message": "   " }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "메시지나 이미지를 입력해주세요.");
    }

    #[tokio::test]
    async fn unknown_ingest_job_is_not_found() {
        let (_dir, state) = test_state().await;
        let response = build_router(state)
            .oneshot(Request::builder().uri("/api/ingest/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn skipped_ingest_drops_upload_and_evicts_job() {
        let (dir, state) = test_state().await;
        let upload = dir.path().join("dup.pdf");
        std::fs::write(&upload, b"%PDF").unwrap();
        queued(&state, "j1");

        settle_ingest_job(&state, "j1", &upload, Utc::now(), Ok(ingest_result(true))).await;

        assert!(!upload.exists());
        assert!(state.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn indexed_upload_is_kept() {
        let (dir, state) = test_state().await;
        let upload = dir.path().join("new.pdf");
        std::fs::write(&upload, b"%PDF").unwrap();
        queued(&state, "j2");

        settle_ingest_job(&state, "j2", &upload, Utc::now(), Ok(ingest_result(false))).await;

        assert!(upload.exists());
        assert!(state.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_ingest_is_persisted_then_evicted() {
        let (dir, state) = test_state().await;
        let upload = dir.path().join("broken.html");
        std::fs::write(&upload, b"<html></html>").unwrap();
        queued(&state, "j3");

        settle_ingest_job(
            &state,
            "j3",
            &upload,
            Utc::now(),
            Err(anyhow::anyhow!("no text could be extracted from broken.html")),
        )
        .await;

        assert!(!upload.exists());
        assert!(state.jobs.lock().unwrap().is_empty());

        let response = build_router(state)
            .oneshot(Request::builder().uri("/api/ingest/j3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = json_body(response).await;
        assert_eq!(status["status"], "failed");
        assert_eq!(status["message"], "no text could be extracted from broken.html");
    }

    #[test]
    fn invalid_requests_map_to_bad_request() {
        let err: anyhow::Error = InvalidRequest("메시지나 이미지를 입력해주세요.".to_string()).into();
        let api = ApiError::from(err);
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "메시지나 이미지를 입력해주세요.");

        let api = ApiError::from(anyhow::anyhow!("ollama down"));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn reports_models_missing_from_ollama() {
        let installed = vec!["gemma:2b".to_string(), "nomic-embed-text:latest".to_string()];
        let gemma = "gemma:2b".to_string();
        let embed = "nomic-embed-text".to_string();
        let llava = "llava:7b".to_string();

        assert_eq!(
            missing_models(&installed, &[&gemma, &embed, &llava]),
            vec!["llava:7b".to_string()]
        );
    }

    #[test]
    fn missing_models_are_listed_once() {
        let installed = vec!["gemma:2b".to_string()];
        let llava = "llava:7b".to_string();
        let llama = "llama3.2:latest".to_string();

        assert_eq!(
            missing_models(&installed, &[&llava, &llama, &llava]),
            vec!["llama3.2:latest".to_string(), "llava:7b".to_string()]
        );
    }

    #[test]
    fn index_renders_themes_and_session() {
        let html = IndexTemplate {
            session_id: "session-123".to_string(),
            themes: &THEMES,
            default_theme: DEFAULT_THEME,
            agents: vec![("General", "gemma:2b".to_string())],
        }
        .render()
        .unwrap();

        assert!(html.contains("session-123"));
        assert!(html.contains("value=\"copilot\""));
        assert!(html.contains("gemma:2b"));
    }
}
