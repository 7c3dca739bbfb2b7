//! Zerg Vector
//!
//! Command line front end for the vector store: index a directory of text
//! files, search it, or wipe the collection. The backend comes from
//! `VECTOR_SEARCH_APP_BACKEND` unless `--backend` overrides it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use core_config::Environment;
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_vector::{BackendKind, EmbeddingConfig, VectorStore, VectorStoreConfig};
use eyre::{Result, WrapErr, eyre};
use tokio::sync::watch;
use tracing::{info, warn};

mod documents;
mod output;

#[derive(Parser)]
#[command(name = "zerg-vector")]
#[command(about = "Ingest documents into a vector store and search them")]
struct Cli {
    /// Storage backend (local, pinecone, mongodb, qdrant)
    #[arg(short, long, global = true)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and store every text file under a directory
    Ingest {
        dir: PathBuf,

        /// File extensions to pick up. Empty means every file.
        #[arg(short, long, value_delimiter = ',', default_value = "txt,md")]
        extensions: Vec<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the chunks closest to a query
    Search {
        query: String,

        #[arg(short = 'k', long, default_value_t = 3)]
        top_k: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete everything in the configured collection
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();

    let backend = match cli.backend {
        Some(kind) => kind,
        None => VectorStoreConfig::selected_backend()?,
    };
    let config = VectorStoreConfig::from_env_for(backend)
        .wrap_err("Failed to load vector store configuration")?;
    let provider = EmbeddingConfig::from_env()
        .and_then(|c| c.build())
        .wrap_err("Failed to configure embedding provider")?;

    info!(%backend, collection = %config.backend.collection_name(), "Connecting...");
    let store = VectorStore::connect(config, provider)
        .await
        .wrap_err_with(|| format!("Failed to connect to the {backend} backend"))?;

    let result = run(&store, cli.command).await;
    store.close().await?;
    result
}

async fn run(store: &VectorStore, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest {
            dir,
            extensions,
            json,
        } => {
            let documents = documents::load_documents(&dir, &extensions)?;
            info!(documents = documents.len(), dir = %dir.display(), "Starting ingestion");

            let (cancel_tx, cancel_rx) = watch::channel(false);
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, letting in-flight writes finish");
                    let _ = cancel_tx.send(true);
                }
            });

            let summary = store.ingest_with_cancel(documents, cancel_rx).await;
            interrupt.abort();

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", output::format_summary(&summary));
            }

            if !summary.errors.is_empty() {
                return Err(eyre!("{} document(s) failed", summary.errors.len()));
            }
        }

        Commands::Search {
            query,
            top_k,
            json,
        } => {
            let results = store.search(&query, top_k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print!("{}", output::format_results(&results));
            }
        }

        Commands::Reset => {
            store.reset().await?;
            println!("Collection reset on {}", store.backend());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_with_backend_override() {
        let cli = Cli::parse_from([
            "zerg-vector",
            "search",
            "why cats purr",
            "-k",
            "5",
            "--backend",
            "qdrant",
        ]);
        assert_eq!(cli.backend, Some(BackendKind::Qdrant));
        match cli.command {
            Commands::Search { query, top_k, json } => {
                assert_eq!(query, "why cats purr");
                assert_eq!(top_k, 5);
                assert!(!json);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_parse_ingest_defaults() {
        let cli = Cli::parse_from(["zerg-vector", "ingest", "./docs"]);
        assert_eq!(cli.backend, None);
        match cli.command {
            Commands::Ingest { dir, extensions, .. } => {
                assert_eq!(dir, PathBuf::from("./docs"));
                assert_eq!(extensions, vec!["txt".to_string(), "md".to_string()]);
            }
            _ => panic!("expected ingest"),
        }
    }
}
