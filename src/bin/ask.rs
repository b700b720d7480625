use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use chatbot::agent::{route_query, AgentGraph};
use chatbot::chat::ChatService;
use chatbot::chroma_store::ChromaStore;
use chatbot::config::AppConfig;
use chatbot::db::Database;
use chatbot::models::{AgentRoute, ChatRequest};
use chatbot::ollama::OllamaClient;
use chatbot::retrieval::Retriever;
use chatbot::tantivy_store::TantivyStore;
use chatbot::web_search::WebSearcher;

#[derive(Parser, Debug)]
#[command(name = "ask")]
#[command(about = "Ask the multi-agent chatbot from the terminal, or run a JSONL evaluation set")]
struct Cli {
    /// Question to ask; omitted when --file is given.
    question: Option<String>,
    /// Image to attach to the question.
    #[arg(long)]
    image: Option<PathBuf>,
    /// JSONL evaluation set: {"id", "question", "expect_route"?, "expect_contains"?}.
    #[arg(long)]
    file: Option<String>,
    /// Only check routing; no model calls.
    #[arg(long, default_value_t = false)]
    route_only: bool,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct EvalPrompt {
    id: String,
    question: String,
    #[serde(default)]
    expect_route: Option<AgentRoute>,
    #[serde(default)]
    expect_contains: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    if let (Some(file), true) = (&cli.file, cli.route_only) {
        return evaluate_routing(&load_prompts(file)?);
    }

    let db = Database::new(&config).await?;
    let ollama = OllamaClient::new(config.ollama_base_url.clone());
    let chroma = ChromaStore::new(
        config.chroma_base_url.clone(),
        config.chroma_collection.clone(),
    );
    let tantivy = TantivyStore::new(config.tantivy_dir());
    let retriever = Retriever::new(
        db.clone(),
        chroma,
        tantivy,
        ollama.clone(),
        config.models.embedding_model.clone(),
    );
    let graph = AgentGraph::new(
        &config,
        Arc::new(ollama),
        Arc::new(retriever),
        Arc::new(WebSearcher::new(config.web.endpoint.clone())),
    );
    let chat = ChatService::new(&config, db, graph, Arc::new(Semaphore::new(1)));

    match (&cli.file, &cli.question) {
        (Some(file), _) => evaluate(&chat, &load_prompts(file)?, cli.verbose).await,
        (None, Some(question)) => ask_once(&chat, question, cli.image.as_ref(), cli.verbose).await,
        (None, None) if cli.image.is_some() => {
            ask_once(&chat, "", cli.image.as_ref(), cli.verbose).await
        }
        (None, None) => anyhow::bail!("pass a question, --image, or --file"),
    }
}

async fn ask_once(
    chat: &ChatService,
    question: &str,
    image: Option<&PathBuf>,
    verbose: bool,
) -> Result<()> {
    let image_base64 = match image {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed reading image {}", path.display()))?;
            Some(STANDARD.encode(bytes))
        }
        None => None,
    };

    let answer = chat
        .answer(ChatRequest {
            session_id: format!("cli-{}", uuid::Uuid::new_v4()),
            message: question.to_string(),
            image_base64,
        })
        .await?;

    println!("{}", answer.answer_markdown);
    println!();
    println!(
        "[{} via {} in {} ms]",
        answer.route.as_str(),
        answer.model,
        answer.latency_ms
    );
    if verbose {
        for step in &answer.steps {
            println!("  - {}", step);
        }
    }
    Ok(())
}

async fn evaluate(chat: &ChatService, prompts: &[EvalPrompt], verbose: bool) -> Result<()> {
    if prompts.is_empty() {
        anyhow::bail!("no prompts found");
    }

    let mut total = 0usize;
    let mut route_expectations = 0usize;
    let mut route_hits = 0usize;
    let mut pass_contains = 0usize;

    for prompt in prompts {
        total += 1;
        let answer = chat
            .answer(ChatRequest {
                session_id: format!("eval-{}", uuid::Uuid::new_v4()),
                message: prompt.question.clone(),
                image_base64: None,
            })
            .await
            .with_context(|| format!("failed eval prompt {}", prompt.id))?;

        if let Some(expected) = prompt.expect_route {
            route_expectations += 1;
            if expected == answer.route {
                route_hits += 1;
            }
        }

        let answer_lower = answer.answer_markdown.to_lowercase();
        if prompt
            .expect_contains
            .iter()
            .all(|needle| answer_lower.contains(&needle.to_lowercase()))
        {
            pass_contains += 1;
        }

        if verbose {
            println!("--- {} ---", prompt.id);
            println!("Q: {}", prompt.question);
            println!("Route: {} ({})", answer.route.as_str(), answer.model);
            println!("A: {}", answer.answer_markdown.replace('\n', " "));
            println!();
        }
    }

    println!("Eval prompts: {}", total);
    println!(
        "Contains/expected accuracy: {:.1}%",
        ratio(pass_contains, total) * 100.0
    );
    if route_expectations > 0 {
        println!(
            "Route accuracy: {:.1}% ({}/{})",
            ratio(route_hits, route_expectations) * 100.0,
            route_hits,
            route_expectations
        );
    }
    Ok(())
}

fn evaluate_routing(prompts: &[EvalPrompt]) -> Result<()> {
    let mut expectations = 0usize;
    let mut hits = 0usize;

    for prompt in prompts {
        let Some(expected) = prompt.expect_route else {
            continue;
        };
        expectations += 1;
        let routed = route_query(&prompt.question, false);
        if routed == expected {
            hits += 1;
        } else {
            println!(
                "{}: expected {} got {}",
                prompt.id,
                expected.as_str(),
                routed.as_str()
            );
        }
    }

    if expectations == 0 {
        anyhow::bail!("no prompts carry expect_route");
    }
    println!(
        "Route accuracy: {:.1}% ({}/{})",
        ratio(hits, expectations) * 100.0,
        hits,
        expectations
    );
    Ok(())
}

fn load_prompts(path: &str) -> Result<Vec<EvalPrompt>> {
    let file = File::open(path).with_context(|| format!("failed opening {}", path))?;
    let reader = BufReader::new(file);
    let mut prompts = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed: EvalPrompt = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON at {} line {}", path, idx + 1))?;
        prompts.push(parsed);
    }

    Ok(prompts)
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        return 0.0;
    }
    n as f32 / d as f32
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
