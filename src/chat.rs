use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::agent::{AgentGraph, NO_OUTPUT_MESSAGE};
use crate::config::AppConfig;
use crate::db::Database;
use crate::models::{ChatAnswer, ChatRequest, Role};
use crate::text::sanitize_model_output;

const EMPTY_REQUEST_MESSAGE: &str = "메시지나 이미지를 입력해주세요.";
const IMAGE_MARKER: &str = "[이미지 첨부]";

/// A request the caller has to fix; surfaces as a 400.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InvalidRequest(pub String);

#[derive(Clone)]
pub struct ChatService {
    db: Database,
    graph: AgentGraph,
    history_messages: i64,
    generation_limit: Arc<Semaphore>,
}

impl ChatService {
    pub fn new(
        config: &AppConfig,
        db: Database,
        graph: AgentGraph,
        generation_limit: Arc<Semaphore>,
    ) -> Self {
        Self {
            db,
            graph,
            history_messages: config.rag.history_messages,
            generation_limit,
        }
    }

    pub fn graph(&self) -> &AgentGraph {
        &self.graph
    }

    pub async fn answer(&self, request: ChatRequest) -> Result<ChatAnswer> {
        let started = Instant::now();

        let message = request.message.trim().to_string();
        let image = match request.image_base64.as_deref().map(str::trim) {
            Some(encoded) if !encoded.is_empty() => Some(decode_image(encoded)?),
            _ => None,
        };
        if message.is_empty() && image.is_none() {
            return Err(InvalidRequest(EMPTY_REQUEST_MESSAGE.to_string()).into());
        }

        let has_image = image.is_some();
        self.db.ensure_session(&request.session_id).await?;
        let history = self
            .db
            .latest_messages(&request.session_id, self.history_messages)
            .await?;

        let outcome = {
            let _permit = self
                .generation_limit
                .acquire()
                .await
                .context("generation semaphore closed")?;
            self.graph.run_graph(&message, history, image).await?
        };

        let mut answer_markdown = sanitize_model_output(&outcome.answer);
        if answer_markdown.is_empty() {
            answer_markdown = NO_OUTPUT_MESSAGE.to_string();
        }

        let user_content = match (has_image, message.is_empty()) {
            (true, true) => IMAGE_MARKER.to_string(),
            (true, false) => format!("{IMAGE_MARKER} {message}"),
            (false, _) => message,
        };
        self.db
            .save_message(&request.session_id, Role::User, &user_content, None)
            .await?;
        self.db
            .save_message(
                &request.session_id,
                Role::Assistant,
                &answer_markdown,
                Some(outcome.route.as_str()),
            )
            .await?;

        let latency_ms = started.elapsed().as_millis();
        tracing::info!(
            "answered via {} ({}) in {} ms",
            outcome.route.as_str(),
            outcome.model,
            latency_ms
        );

        Ok(ChatAnswer {
            answer_markdown,
            route: outcome.route,
            model: outcome.model,
            steps: outcome.steps,
            latency_ms,
        })
    }
}

/// Accepts raw base64 or a `data:image/...;base64,` URL.
fn decode_image(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => encoded,
    };

    STANDARD
        .decode(payload.trim())
        .map_err(|err| InvalidRequest(format!("이미지를 읽을 수 없습니다: {err}")).into())
}
