//! docqa: ask questions about your own documents.
//!
//! ```text
//! docqa ingest notes.md paper.pdf
//! docqa ask "What does the paper conclude?" --k 4
//! docqa chat
//! ```

mod chat;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use docqa_rag::{
    AnswerResponse, EmbedderConfig, FileVectorStore, GeneratorConfig, RagConfig, RagPipeline,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Retrieval-augmented question answering over local documents.
#[derive(Parser, Debug)]
#[command(name = "docqa", version, about)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true, env = "DOCQA_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the vector index (overrides the config file).
    #[arg(long, global = true, env = "DOCQA_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    /// Ollama server address for Ollama embedders and generators.
    #[arg(long, global = true, env = "OLLAMA_HOST")]
    ollama_host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load, chunk and index documents (.pdf, .txt, .md).
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer one question and print the sources used.
    Ask {
        question: String,
        /// Number of chunks to retrieve (1-10).
        #[arg(short, long)]
        k: Option<usize>,
        /// Sampling temperature (0.0-1.0).
        #[arg(short, long)]
        temperature: Option<f32>,
    },
    /// Interactive question answering.
    Chat {
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(short, long)]
        temperature: Option<f32>,
    },
    /// Remove every indexed chunk.
    Reset,
    /// Rewrite a damaged index, keeping every entry that can still be read.
    Repair,
    /// Show what the index holds.
    Status,
}

// ── config ──────────────────────────────────────────────────────────

fn normalise_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") { host.to_string() } else { format!("http://{host}") }
}

fn load_config(cli: &Cli) -> Result<RagConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = RagConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            info!(path = %path.display(), "loaded config");
            config
        }
        None => RagConfig::default(),
    };

    if let Some(dir) = &cli.index_dir {
        config.index_dir = dir.clone();
    }
    if let Some(host) = cli.ollama_host.as_deref().filter(|h| !h.trim().is_empty()) {
        let host = normalise_host(host);
        if let EmbedderConfig::Ollama { base_url, .. } = &mut config.embedder {
            *base_url = host.clone();
        }
        if let GeneratorConfig::Ollama { base_url, .. } = &mut config.generator {
            *base_url = host;
        }
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn open_pipeline(config: RagConfig) -> Result<RagPipeline> {
    let index_dir = config.index_dir.clone();
    RagPipeline::from_config(config).await.with_context(|| {
        format!("failed to open vector index at {}", index_dir.display())
    })
}

// ── output ──────────────────────────────────────────────────────────

pub(crate) fn print_answer(response: &AnswerResponse) {
    println!("{}", response.answer.trim());
    if response.has_sources() {
        println!();
        println!("Sources:");
        for (i, source) in response.sources.iter().enumerate() {
            println!("  [{}] {}", i + 1, source.trim().replace('\n', "\n      "));
        }
    }
}

// ── commands ────────────────────────────────────────────────────────

async fn ingest(pipeline: &RagPipeline, paths: &[PathBuf]) -> Result<()> {
    let outcomes = pipeline.process_documents(paths).await;
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(chunks) => println!("ok    {} ({chunks} chunks)", outcome.path.display()),
            Err(e) => {
                failed += 1;
                println!("fail  {}: {e}", outcome.path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} documents could not be ingested", outcomes.len());
    }
    println!("Documents processed. You can now ask questions about them.");
    Ok(())
}

async fn status(config: &RagConfig, pipeline: &RagPipeline) {
    let status = pipeline.status().await;
    println!("index:      {}", config.index_dir.display());
    println!("entries:    {}", status.entries);
    match status.dimensions {
        Some(dims) => println!("dimensions: {dims}"),
        None => println!("dimensions: (empty index)"),
    }
    println!("embedder:   {}", status.embedding_model);
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Ingest { paths } => {
            let pipeline = open_pipeline(config).await?;
            ingest(&pipeline, &paths).await?;
        }
        Command::Ask { question, k, temperature } => {
            let k = k.unwrap_or(config.top_k);
            let temperature = temperature.unwrap_or(config.temperature);
            let pipeline = open_pipeline(config).await?;
            let response = pipeline
                .ask(&question, k, temperature)
                .await
                .context("failed to answer question")?;
            print_answer(&response);
        }
        Command::Chat { k, temperature } => {
            let k = k.unwrap_or(config.top_k);
            let temperature = temperature.unwrap_or(config.temperature);
            let pipeline = open_pipeline(config).await?;
            chat::run(&pipeline, k, temperature).await?;
        }
        Command::Reset => {
            let pipeline = open_pipeline(config).await?;
            pipeline.reset().await.context("failed to clear the index")?;
            println!("Index cleared.");
        }
        Command::Repair => {
            let report = FileVectorStore::repair(&config.index_dir).await.with_context(|| {
                format!("failed to repair index at {}", config.index_dir.display())
            })?;
            if report.dropped > 0 {
                warn!(dropped = report.dropped, "discarded unreadable index entries");
            }
            println!("kept {} entries, dropped {}", report.kept, report.dropped);
        }
        Command::Status => {
            let pipeline = open_pipeline(config.clone()).await?;
            status(&config, &pipeline).await;
        }
    }

    Ok(())
}
