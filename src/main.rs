//! # RAG backend CLI (`rag-backend`)
//!
//! Runs the HTTP API and exposes the same operations for local use.
//!
//! ## Usage
//!
//! ```bash
//! rag-backend --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag-backend init` | Create the SQLite database and run schema migrations |
//! | `rag-backend serve` | Start the HTTP server |
//! | `rag-backend ingest <path>` | Chunk, embed and index a `.pdf` or `.txt` file |
//! | `rag-backend documents` | List ingested documents, newest first |
//! | `rag-backend chat "<message>"` | Run one retrieval-augmented chat turn |
//! | `rag-backend history <session>` | Show or clear a session's chat history |
//!
//! Logging goes to stderr and honours `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rag_backend::{config, documents, ingest, memory, migrate, rag, server};

const DEFAULT_LOG_FILTER: &str = "rag_backend=info,tower_http=info";
const VERBOSE_LOG_FILTER: &str = "rag_backend=debug,tower_http=debug";

/// Document ingestion and retrieval-augmented chat backend.
#[derive(Parser)]
#[command(name = "rag-backend", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest a single file.
    Ingest {
        /// Path to a `.pdf` or `.txt` file.
        path: PathBuf,

        /// `paragraph` or `fixed` (default from `[chunking].default_strategy`).
        #[arg(long)]
        strategy: Option<String>,

        /// Window size in characters for the `fixed` strategy.
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// List ingested documents.
    Documents {
        #[arg(long, default_value = "0")]
        skip: i64,

        #[arg(long, default_value = "10")]
        limit: i64,
    },

    /// Ask a question against the indexed documents.
    Chat {
        message: String,

        /// Continue an existing session (a new one is created otherwise).
        #[arg(long)]
        session: Option<String>,
    },

    /// Show the recent messages of a chat session.
    History {
        session: String,

        /// Delete the session's history instead of printing it.
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest {
            path,
            strategy,
            chunk_size,
        } => {
            ingest::run_ingest(&cfg, &path, strategy.as_deref(), chunk_size).await?;
        }
        Commands::Documents { skip, limit } => {
            documents::run_list(&cfg, skip, limit).await?;
        }
        Commands::Chat { message, session } => {
            rag::run_chat(&cfg, &message, session).await?;
        }
        Commands::History { session, clear } => {
            memory::run_history(&cfg, &session, clear).await?;
        }
    }

    Ok(())
}
