//! # askdocs CLI
//!
//! The `askdocs` binary ingests documents and answers questions about them.
//!
//! ## Usage
//!
//! ```bash
//! askdocs --config ./config/askdocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdocs init` | Create the data directory and database schema |
//! | `askdocs ingest <paths>...` | Ingest files and directories |
//! | `askdocs ask "<question>"` | Answer a question with cited sources |
//! | `askdocs list` | List ingested documents |
//! | `askdocs search "<term>"` | Similarity (or `--text` substring) search |
//! | `askdocs stats` | Document and chunk counts |
//! | `askdocs clear` | Remove everything from the store |
//! | `askdocs serve` | Start the JSON HTTP server |

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use askdocs::config::{self, Config};
use askdocs::{ask, ingest, logging, manage, server, sqlite_store, AppContext};

/// askdocs: ask questions about your documents.
#[derive(Parser)]
#[command(
    name = "askdocs",
    about = "Ask questions about your documents and get answers with sources",
    version,
    long_about = "askdocs ingests documents (text, markdown, HTML, PDF, Office, CSV, JSON), \
    chunks and embeds them into a local SQLite vector store, and answers questions \
    with a generative model grounded on the most relevant chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/askdocs.toml`. A missing file means built-in
    /// defaults.
    #[arg(long, global = true, default_value = "./config/askdocs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and database schema.
    ///
    /// Idempotent: running it again is safe.
    Init,

    /// Ingest files and directories.
    ///
    /// Directories are walked recursively. Files that fail are reported and
    /// skipped; the command fails only when every file failed.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Glob for files to take from directories (repeatable). Defaults
        /// to every supported extension.
        #[arg(long)]
        include: Vec<String>,
    },

    /// Answer a question from the ingested documents.
    Ask {
        /// The question.
        question: String,
    },

    /// List ingested documents with their chunk counts.
    List,

    /// Search stored chunks.
    Search {
        /// Search term.
        term: String,

        /// Case-insensitive substring search instead of similarity search.
        #[arg(long)]
        text: bool,

        /// Maximum number of results (default from `[retrieval].search_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show document and chunk counts.
    Stats,

    /// Remove every document from the store.
    Clear {
        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },

    /// Start the JSON HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => run_init(&cfg).await,
        Commands::Ingest { paths, include } => {
            let ctx = AppContext::open(&cfg).await?;
            ingest::run_ingest(&ctx, &paths, &include).await
        }
        Commands::Ask { question } => {
            let ctx = AppContext::open(&cfg).await?;
            ask::run_ask(&ctx, &question).await
        }
        Commands::List => {
            let ctx = AppContext::open(&cfg).await?;
            manage::run_list(&ctx).await
        }
        Commands::Search { term, text, limit } => {
            let ctx = AppContext::open(&cfg).await?;
            manage::run_search(&ctx, &term, limit, text).await
        }
        Commands::Stats => {
            let ctx = AppContext::open(&cfg).await?;
            manage::run_stats(&ctx).await
        }
        Commands::Clear { yes } => {
            let ctx = AppContext::open(&cfg).await?;
            manage::run_clear(&ctx, yes).await
        }
        Commands::Serve => {
            let ctx = AppContext::open(&cfg).await?;
            server::run_server(ctx).await
        }
    }
}

async fn run_init(cfg: &Config) -> anyhow::Result<()> {
    let store = sqlite_store::SqliteStore::open(cfg).await?;
    store.close().await;
    println!("Initialized store at {}", cfg.store.db_path().display());
    Ok(())
}
