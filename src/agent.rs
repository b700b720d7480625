use std::sync::Arc;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::{AppConfig, ModelConfig};
use crate::models::{AgentRoute, ChatMessage};
use crate::ports::{DocumentSearch, GenerationOptions, LanguageModel, WebSearch};
use crate::text::preview;
use crate::tokens::{estimate_tokens, trim_history_to_budget};
use crate::web_search::format_search_results;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
const DEFAULT_IMAGE_PROMPT: &str = "이 이미지에 대해 설명해주세요.";
const NO_RAG_CONTEXT: &str = "관련 정보를 찾을 수 없습니다.";
pub const NO_OUTPUT_MESSAGE: &str = "죄송합니다. 답변을 생성하지 못했습니다.";
const STEP_PREVIEW_CHARS: usize = 200;
const RESPONSE_TOKEN_RESERVE: usize = 512;

const RAG_KEYWORDS: &[&str] = &["pdf", "문서", "내 파일", "내 자료", "document", "my file"];
const WEB_KEYWORDS: &[&str] = &[
    "웹 검색",
    "검색해",
    "인터넷",
    "최신",
    "뉴스",
    "search the web",
    "latest news",
];
const CODING_KEYWORDS: &[&str] = &[
    "코드", "코딩", "프로그래밍", "알고리즘", "수학", "계산", "풀어줘", "code", "program",
    "algorithm", "math", "calculate", "solve",
];
const REASONING_KEYWORDS: &[&str] = &[
    "추론",
    "분석",
    "설명해줘",
    "왜",
    "어떻게 생각해",
    "reason",
    "analy",
    "explain",
    "why",
];

#[derive(Debug, Clone)]
pub struct AgentState {
    pub input_query: String,
    pub history: Vec<ChatMessage>,
    pub image: Option<Vec<u8>>,
    pub image_analysis: Option<String>,
    pub rag_context: Option<String>,
    pub web_context: Option<String>,
    pub route: AgentRoute,
    pub output: Option<String>,
    pub steps: Vec<String>,
}

impl AgentState {
    pub fn new(query: impl Into<String>, history: Vec<ChatMessage>, image: Option<Vec<u8>>) -> Self {
        Self {
            input_query: query.into(),
            history,
            image,
            image_analysis: None,
            rag_context: None,
            web_context: None,
            route: AgentRoute::General,
            output: None,
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    pub route: AgentRoute,
    pub model: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Router,
    ImageAnalyzer,
    RagRetriever,
    WebSearcher,
    Agent(AgentRoute),
    FinalCall,
    End,
}

/// Picks a route from the query text; an attached image always wins.
pub fn route_query(query: &str, has_image: bool) -> AgentRoute {
    if has_image {
        return AgentRoute::ImageAnalysis;
    }

    let query = query.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| contains_keyword(&query, k));

    if matches(RAG_KEYWORDS) {
        AgentRoute::Rag
    } else if matches(WEB_KEYWORDS) {
        AgentRoute::WebSearch
    } else if matches(CODING_KEYWORDS) {
        AgentRoute::CodingMath
    } else if matches(REASONING_KEYWORDS) {
        AgentRoute::Reasoning
    } else {
        AgentRoute::General
    }
}

/// Korean keywords match anywhere. English ones must start a word, so
/// "decode" does not hit "code" while "programming" still hits "program".
fn contains_keyword(query: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return query.contains(keyword);
    }
    query.match_indices(keyword).any(|(start, _)| {
        !query[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

/// Query for the coding/reasoning/general agents, with any gathered context
/// prepended as reference material.
pub fn agent_query(state: &AgentState) -> String {
    let mut effective = state.input_query.clone();
    if let Some(image) = &state.image_analysis {
        effective = format!("참고 이미지 분석: {image}\n\n질문: {}", state.input_query);
    }
    if let Some(rag) = &state.rag_context {
        effective = format!("참고 문서: {rag}\n\n질문: {effective}");
    }
    effective
}

/// Query for the call that follows image analysis, retrieval, or web search.
pub fn final_query(state: &AgentState) -> String {
    let mut sections = Vec::new();
    if let Some(image) = &state.image_analysis {
        sections.push(format!("이미지 분석 결과: {image}"));
    }
    if let Some(rag) = &state.rag_context {
        sections.push(format!("문서 내용: {rag}"));
    }
    if let Some(web) = &state.web_context {
        sections.push(format!("웹 검색 결과: {web}"));
    }

    if sections.is_empty() {
        return state.input_query.clone();
    }

    sections.push(format!(
        "위 정보를 바탕으로 다음 질문에 답해주세요: {}",
        state.input_query
    ));
    sections.join("\n\n")
}

/// Router plus context nodes plus per-route agents, run as a small state machine.
#[derive(Clone)]
pub struct AgentGraph {
    llm: Arc<dyn LanguageModel>,
    documents: Arc<dyn DocumentSearch>,
    web: Arc<dyn WebSearch>,
    models: ModelConfig,
    context_length: usize,
    rag_top_k: usize,
    web_max_results: usize,
}

impl AgentGraph {
    pub fn new(
        config: &AppConfig,
        llm: Arc<dyn LanguageModel>,
        documents: Arc<dyn DocumentSearch>,
        web: Arc<dyn WebSearch>,
    ) -> Self {
        Self {
            llm,
            documents,
            web,
            models: config.models.clone(),
            context_length: config.tokens.context_length,
            rag_top_k: config.rag.top_k,
            web_max_results: config.web.max_results,
        }
    }

    pub fn models(&self) -> &ModelConfig {
        &self.models
    }

    pub async fn run_graph(
        &self,
        query: &str,
        history: Vec<ChatMessage>,
        image: Option<Vec<u8>>,
    ) -> Result<AgentOutcome> {
        let mut state = AgentState::new(query, history, image);
        let mut node = Node::Router;

        while node != Node::End {
            node = match node {
                Node::Router => self.router(&mut state),
                Node::ImageAnalyzer => self.image_analyzer(&mut state).await,
                Node::RagRetriever => self.rag_retriever(&mut state).await,
                Node::WebSearcher => self.web_searcher(&mut state).await,
                Node::Agent(route) => self.agent_call(route, &mut state).await?,
                Node::FinalCall => self.final_call(&mut state).await?,
                Node::End => Node::End,
            };
        }

        Ok(AgentOutcome {
            answer: state
                .output
                .filter(|out| !out.trim().is_empty())
                .unwrap_or_else(|| NO_OUTPUT_MESSAGE.to_string()),
            route: state.route,
            model: self.models.model_for(state.route).to_string(),
            steps: state.steps,
        })
    }

    fn router(&self, state: &mut AgentState) -> Node {
        state.route = route_query(&state.input_query, state.image.is_some());
        tracing::info!("routing query to {}", state.route.as_str());
        state.steps.push(format!("Routed to: {}", state.route.as_str()));

        match state.route {
            AgentRoute::ImageAnalysis => Node::ImageAnalyzer,
            AgentRoute::Rag => Node::RagRetriever,
            AgentRoute::WebSearch => Node::WebSearcher,
            route => Node::Agent(route),
        }
    }

    async fn image_analyzer(&self, state: &mut AgentState) -> Node {
        let Some(image) = state.image.as_ref() else {
            return Node::FinalCall;
        };

        let prompt = if state.input_query.trim().is_empty() {
            DEFAULT_IMAGE_PROMPT.to_string()
        } else {
            state.input_query.clone()
        };
        tracing::info!("analyzing image with prompt: {}", preview(&prompt, STEP_PREVIEW_CHARS));

        let message = ChatMessage::user(prompt).with_image(STANDARD.encode(image));
        let analysis = match self
            .llm
            .chat(&self.models.vision_model, &[message], self.options())
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::error!("image analysis failed: {err:#}");
                format!("이미지 분석 중 오류 발생: {err}")
            }
        };

        state.steps.push(format!(
            "Image analysis result: {}...",
            preview(&analysis, STEP_PREVIEW_CHARS)
        ));
        state.image_analysis = Some(analysis);
        Node::FinalCall
    }

    async fn rag_retriever(&self, state: &mut AgentState) -> Node {
        tracing::info!("performing rag search for: {}", state.input_query);
        let results = match self
            .documents
            .search(&state.input_query, self.rag_top_k)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                tracing::error!("document search failed: {err:#}");
                vec![]
            }
        };

        let context = if results.is_empty() {
            NO_RAG_CONTEXT.to_string()
        } else {
            results
                .iter()
                .map(|r| r.chunk.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        tracing::debug!("rag context (first 200 chars): {}", preview(&context, STEP_PREVIEW_CHARS));
        state.steps.push(format!(
            "RAG context retrieved: {}...",
            preview(&context, STEP_PREVIEW_CHARS)
        ));
        state.rag_context = Some(context);
        Node::FinalCall
    }

    async fn web_searcher(&self, state: &mut AgentState) -> Node {
        let hits = match self
            .web
            .search(&state.input_query, self.web_max_results)
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::error!("web search failed: {err:#}");
                vec![]
            }
        };

        let context = format_search_results(&hits);
        state.steps.push(format!(
            "Web search results: {}...",
            preview(&context, STEP_PREVIEW_CHARS)
        ));
        state.web_context = Some(context);
        Node::FinalCall
    }

    async fn agent_call(&self, route: AgentRoute, state: &mut AgentState) -> Result<Node> {
        let model = self.models.model_for(route).to_string();
        let effective = agent_query(state);
        state.output = Some(self.call_llm(&model, &effective, &state.history).await?);
        Ok(Node::End)
    }

    async fn final_call(&self, state: &mut AgentState) -> Result<Node> {
        let effective = final_query(state);
        let model = self.models.general_model.clone();
        state.output = Some(self.call_llm(&model, &effective, &state.history).await?);
        Ok(Node::End)
    }

    async fn call_llm(&self, model: &str, effective: &str, history: &[ChatMessage]) -> Result<String> {
        tracing::info!(
            "calling llm ({model}) with query: {}...",
            preview(effective, STEP_PREVIEW_CHARS)
        );

        let fixed_cost =
            estimate_tokens(SYSTEM_PROMPT) + estimate_tokens(effective) + RESPONSE_TOKEN_RESERVE;
        let budget = self.context_length.saturating_sub(fixed_cost);
        let history = trim_history_to_budget(history, budget);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(history);
        messages.push(ChatMessage::user(effective));

        self.llm.chat(model, &messages, self.options()).await
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.models.temperature,
            num_ctx: self.context_length,
        }
    }
}
