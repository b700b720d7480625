use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use chatbot::chroma_store::ChromaStore;
use chatbot::config::AppConfig;
use chatbot::db::Database;
use chatbot::ingest::Ingestor;
use chatbot::models::{DocumentKind, IngestRequest};
use chatbot::ollama::OllamaClient;
use chatbot::tantivy_store::TantivyStore;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest PDF and HTML documents into the local RAG indexes")]
struct Cli {
    /// Files or directories; directories are walked for .pdf/.html/.htm files.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    #[arg(long, default_value_t = false)]
    rebuild: bool,
    /// List processed documents after ingesting.
    #[arg(long, default_value_t = false)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let db = Database::new(&config).await?;
    let ollama = OllamaClient::new(config.ollama_base_url.clone());
    let chroma = ChromaStore::new(
        config.chroma_base_url.clone(),
        config.chroma_collection.clone(),
    );
    let tantivy = TantivyStore::new(config.tantivy_dir());
    let ingestor = Ingestor::new(config, db, ollama, chroma, tantivy);

    let files = collect_files(&cli.paths);
    if files.is_empty() {
        anyhow::bail!("no .pdf, .html or .htm files found in the given paths");
    }

    let mut failures = 0usize;
    for file in files {
        let filename = file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let req = IngestRequest {
            path: file.display().to_string(),
            filename: filename.clone(),
            rebuild: cli.rebuild,
        };

        let job_id = format!("cli-{}", uuid::Uuid::new_v4());
        let result = ingestor
            .ingest_file(&job_id, req, |status| {
                println!(
                    "[{}] {} {} chunks={} {}",
                    status.status,
                    filename,
                    status.stage,
                    status.chunk_count,
                    status.message.unwrap_or_default()
                );
            })
            .await;

        match result {
            Ok(result) => println!(
                "{}: skipped={} chunks={} converted_scripts={}",
                file.display(),
                result.skipped,
                result.chunk_count,
                result.converted_scripts
            ),
            Err(err) => {
                failures += 1;
                eprintln!("{}: failed: {err:#}", file.display());
            }
        }
    }

    if cli.list {
        for doc in ingestor.list_documents().await? {
            println!(
                "{}  {:<5} {:<10} {:>5} chunks  {}",
                doc.id,
                doc.kind.as_str(),
                doc.status,
                doc.chunk_count,
                doc.filename
            );
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} file(s) failed to ingest");
    }
    Ok(())
}

fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }

        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().to_path_buf())
            .filter(|p| is_supported(p))
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

fn is_supported(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(DocumentKind::from_filename)
        .is_some()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
