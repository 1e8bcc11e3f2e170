//! # Printshop Rep CLI (`rep`)
//!
//! ## Usage
//!
//! ```bash
//! rep --config ./config/rep.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rep serve` | Start the HTTP chat service |
//! | `rep search "<query>"` | Rank knowledge snippets for a query |
//! | `rep classify "<message>"` | Print the detected intent |
//! | `rep ask "<message>"` | Run one chat turn and print the reply as JSON |
//! | `rep sources` | List knowledge documents |
//! | `rep health` | Probe the inference backend |
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` filter), so
//! stdout stays machine-readable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use printshop_rep::{assistant, config, inference, intent, search, server, sources};

/// Printshop Rep: support chat for a print-on-demand storefront.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "rep",
    about = "Printshop Rep: grounded support chat with an offline fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rep.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat service on `[server].bind`.
    Serve,

    /// Rank knowledge snippets against a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `[knowledge].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the intent detected for a message.
    Classify {
        message: String,
    },

    /// Run one full chat turn and print the structured reply as JSON.
    ///
    /// Falls back to a canned reply when the backend is unreachable.
    Ask {
        message: String,
    },

    /// List knowledge documents and their snippet counts.
    Sources,

    /// Check whether the inference backend is reachable.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit)?;
        }
        Commands::Classify { message } => {
            intent::run_classify(&message);
        }
        Commands::Ask { message } => {
            assistant::run_ask(&cfg, &message).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Health => {
            inference::run_health(&cfg).await?;
        }
    }

    Ok(())
}
