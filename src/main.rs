//! # SourceSense CLI
//!
//! The `sourcesense` binary turns web articles into a local similarity
//! index and answers questions against it.
//!
//! ## Usage
//!
//! ```bash
//! sourcesense [--config ./sourcesense.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sourcesense process <url>...` | Fetch, chunk, embed, and index the given articles |
//! | `sourcesense ask "<question>"` | Answer a question from the index, with sources |
//! | `sourcesense session` | Interactive loop: edit a URL list, process, ask |
//! | `sourcesense status` | Show what the index currently holds |
//! | `sourcesense clear` | Delete the index |
//!
//! Embedding and generation providers are configured in the TOML file;
//! OpenAI providers read `OPENAI_API_KEY` from the environment (a `.env`
//! file is honored).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use sourcesense::embedding::create_embedder;
use sourcesense::error::LoadError;
use sourcesense::fetch::HttpFetcher;
use sourcesense::generation::create_generator;
use sourcesense::index::{clear_index, read_meta, read_sources};
use sourcesense::pipeline::{ask, process_urls};
use sourcesense::config;
use sourcesense::session::{render_ask_outcome, render_process_outcome, run_session};

const DEFAULT_CONFIG_PATH: &str = "./sourcesense.toml";

/// Ask questions about web articles from the command line.
#[derive(Parser)]
#[command(
    name = "sourcesense",
    about = "Fetch web articles into a local similarity index and ask questions against it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, `./sourcesense.toml` is used if present, falling back
    /// to built-in defaults otherwise. When given explicitly, the file
    /// must exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Fetch, chunk, embed, and index the given article URLs.
    ///
    /// Rebuilds the index from scratch each run; URLs that fail to fetch
    /// or contain no readable text are reported and skipped.
    Process {
        /// Article URLs to index.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Answer a question from the indexed articles.
    ///
    /// Retrieves the most similar chunks, asks the configured LLM, and
    /// prints the answer with its cited source URLs.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Interactive loop: edit a URL list, process it, and ask questions.
    Session,

    /// Show what the index currently holds.
    Status,

    /// Delete the index file.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sourcesense=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let required = cli.config.is_some();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let cfg = config::load_config(&config_path, required)?;

    match cli.command {
        Commands::Process { urls } => {
            let fetcher = HttpFetcher::new(&cfg.fetch)?;
            let embedder = create_embedder(&cfg.embedding)?;
            let outcome = process_urls(&cfg, &fetcher, embedder.as_ref(), &urls).await?;
            render_process_outcome(&outcome);
        }
        Commands::Ask { question } => {
            let embedder = create_embedder(&cfg.embedding)?;
            let generator = create_generator(&cfg.generation)?;
            let outcome = ask(&cfg, embedder.as_ref(), generator.as_ref(), &question).await?;
            render_ask_outcome(&outcome);
        }
        Commands::Session => {
            run_session(&cfg).await?;
        }
        Commands::Status => match read_meta(&cfg).await {
            Ok(meta) => {
                println!("Index: {}", cfg.index.path.display());
                println!("  chunks: {}", meta.chunk_count);
                println!("  embedding: {} ({} dims)", meta.model, meta.dims);
                if let Some(built) = chrono::DateTime::from_timestamp(meta.created_at, 0) {
                    println!("  built: {}", built.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                let sources = read_sources(&cfg).await?;
                if !sources.is_empty() {
                    println!("  sources:");
                    for source in &sources {
                        println!("    - {source}");
                    }
                }
            }
            Err(LoadError::NotFound { path }) => {
                println!("No index at {} yet. Run `sourcesense process` first.", path.display());
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Clear => {
            if clear_index(&cfg)? {
                println!("Removed index at {}.", cfg.index.path.display());
            } else {
                println!("No index at {} to remove.", cfg.index.path.display());
            }
        }
    }

    Ok(())
}
