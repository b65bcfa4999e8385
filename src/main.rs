//! # INGRES assistant CLI (`ingres`)
//!
//! ## Usage
//!
//! ```bash
//! ingres --config ./config/ingres.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingres serve` | Load the model and start the HTTP server |
//! | `ingres ingest <path>` | Ingest a PDF or text file into the document store |
//! | `ingres ask "<question>"` | Answer one question and print the context used |
//! | `ingres context "<question>"` | Print the retrieval context only (no model) |
//! | `ingres documents` | List ingested documents |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ingres_rag::{commands, config, logging, server};

/// INGRES assistant: groundwater questions answered from records and reports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ingres.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ingres",
    about = "INGRES assistant: retrieval-augmented answers over groundwater records and reports",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ingres.toml`. A missing file means all defaults.
    #[arg(long, global = true, default_value = "./config/ingres.toml")]
    config: PathBuf,

    /// Log filter, e.g. `info` or `ingres_rag=debug`. Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. The model loads in the background; chat
    /// requests get 503 until it is ready, and a failed load stops the server.
    Serve,

    /// Ingest a document into the store.
    Ingest {
        /// PDF, `.txt`, or `.md` file.
        path: PathBuf,
    },

    /// Answer a question with the loaded model.
    Ask {
        question: String,
    },

    /// Show the fused retrieval context for a question.
    Context {
        question: String,
    },

    /// List ingested documents in ingestion order.
    Documents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref())?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { path } => {
            commands::run_ingest(&cfg, &path).await?;
        }
        Commands::Ask { question } => {
            commands::run_ask(&cfg, &question).await?;
        }
        Commands::Context { question } => {
            commands::run_context(&cfg, &question).await?;
        }
        Commands::Documents => {
            commands::run_documents(&cfg)?;
        }
    }

    Ok(())
}
