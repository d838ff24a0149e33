//! # ragbot CLI
//!
//! ```bash
//! ragbot --config ./config/ragbot.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragbot serve` | Start the HTTP server |
//! | `ragbot ask <pdf>... --question "..."` | One-shot: index the PDFs, answer, exit |
//! | `ragbot chunk <file>` | Show how a text or PDF file is split into passages |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use ragbot::config::{load_config_or_minimal, Config, ConfigOrigin};
use ragbot::extract::{PdfExtractor, TextExtractor};
use ragbot::ragbot_core::orchestrator::preview;
use ragbot::service::{RagService, UploadFile};

/// Session used by one-shot CLI commands.
const CLI_SESSION: &str = "cli";

/// ragbot: ask questions about your PDF documents.
#[derive(Parser)]
#[command(name = "ragbot", version, about = "Question answering over uploaded PDF documents")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragbot.toml`. A missing file means built-in
    /// defaults: hashing embedder and extractive answers, fully offline.
    #[arg(long, global = true, default_value = "./config/ragbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Index one or more PDFs and answer a single question.
    Ask {
        /// PDF files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Question to ask about the documents.
        #[arg(long, short)]
        question: String,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the passages a file would be split into.
    Chunk {
        /// Text or PDF file.
        file: PathBuf,

        /// Print whole passages instead of previews.
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, origin) = load_config_or_minimal(&cli.config)?;
    ragbot::logging::init_with_config(&config.logging);
    if origin == ConfigOrigin::Defaults {
        tracing::info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    if !config.embedding.is_enabled() {
        tracing::warn!("embedding provider is disabled; uploads will fail to index");
    }

    match cli.command {
        Commands::Serve => ragbot::server::run_server(&config).await?,
        Commands::Ask {
            files,
            question,
            json,
        } => run_ask(&config, &files, &question, json).await?,
        Commands::Chunk { file, full } => run_chunk(&config, &file, full)?,
    }

    Ok(())
}

async fn run_ask(config: &Config, files: &[PathBuf], question: &str, json: bool) -> Result<()> {
    let service = RagService::from_config(config)?;

    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        uploads.push(UploadFile::new(file_name(path), bytes));
    }

    let summary = service.upload(CLI_SESSION, uploads).await?;
    tracing::info!("{}", summary.message);

    let result = service.ask(CLI_SESSION, question).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.answer);
    if !result.source_details.is_empty() {
        println!();
        println!("Sources:");
        for detail in &result.source_details {
            println!("  {} ({})", detail.source, detail.chunk_info);
        }
    }
    Ok(())
}

fn run_chunk(config: &Config, path: &Path, full: bool) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = file_name(path);
    let text = if PdfExtractor.accepts(&name) {
        PdfExtractor.extract(&bytes)?.text
    } else {
        String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8 text", name))?
    };

    let chunker = config.chunking.chunker()?;
    let spans = chunker.split_spans(&text);
    println!(
        "{}: {} chars, {} chunks (size {}, overlap {})",
        name,
        text.chars().count(),
        spans.len(),
        chunker.chunk_size(),
        chunker.chunk_overlap()
    );
    for (i, span) in spans.iter().enumerate() {
        let chunk = &text[span.clone()];
        println!();
        println!(
            "Chunk {}/{}  bytes {}..{}  {} chars",
            i + 1,
            spans.len(),
            span.start,
            span.end,
            chunk.chars().count()
        );
        if full {
            println!("{}", chunk);
        } else {
            println!("{}", preview(chunk, config.retrieval.preview_chars));
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
