//! # vectorforge CLI (`vforge`)
//!
//! Builds a local vector store from the sources configured in a TOML file
//! and inspects previously created stores.
//!
//! ```bash
//! # Run the full pipeline; prints the created store directory name
//! vforge --config ./vforge.toml build
//!
//! # Override the store name and tag every document with a session id
//! vforge --config ./vforge.toml build --name sprint-42 --session-id abc123
//!
//! # Validate and summarize an existing store
//! vforge inspect ./stores/docs
//! ```
//!
//! The process exits non-zero on any fatal pipeline failure; progress and
//! diagnostics go to stderr (`RUST_LOG` controls verbosity) so stdout
//! stays parseable for scripts.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vectorforge::config;
use vectorforge::pipeline::Pipeline;
use vectorforge::store::VectorStore;

/// vectorforge — build local semantic-search vector stores from
/// filesystem, Git, and wiki sources.
#[derive(Parser)]
#[command(
    name = "vforge",
    about = "Build local semantic-search vector stores from filesystem, Git, and wiki sources",
    version
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(long, global = true, default_value = "./vforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect, parse, embed, and index the configured sources into a new
    /// store directory. Prints the directory name on success.
    Build {
        /// Override the store name from the config file.
        #[arg(long)]
        name: Option<String>,

        /// Session identifier recorded in every document's metadata.
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Open a persisted store, validate it, and print a summary.
    Inspect {
        /// Path to a store directory (containing index.vec and
        /// metadata.json).
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { name, session_id } => {
            let mut cfg = config::load_config(&cli.config)?;
            if let Some(name) = name {
                cfg.store.name = name;
            }
            if let Some(session_id) = session_id {
                cfg.store.session_id = Some(session_id);
            }
            config::validate(&cfg)?;

            let base_path = cfg.store.path.clone();
            let pipeline = Pipeline::from_config(cfg)?;
            let dir = pipeline.run().await?;
            println!("{}", dir.name);
            tracing::info!(
                store = %dir.name,
                path = %base_path.join(&dir.name).display(),
                "vector store created"
            );
        }
        Commands::Inspect { path } => {
            let store = VectorStore::open(&path)?;
            println!(
                "{}: {} vectors, dimension {}",
                path.display(),
                store.len(),
                store.dim()
            );
            for record in store.records().iter().take(5) {
                let preview: String = record.text.chars().take(60).collect();
                println!("  [{}] {}", record.id, preview.replace('\n', " "));
            }
            if store.len() > 5 {
                println!("  ... {} more", store.len() - 5);
            }
        }
    }

    Ok(())
}
