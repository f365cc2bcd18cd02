use anyhow::Context;
use console::style;
use dialoguer::Confirm;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::config::Config;
use crate::database::VectorStore;
use crate::documents::DocumentLoader;
use crate::embeddings::OpenAiClient;
use crate::indexer::{Indexer, IndexingStats};
use crate::pipeline::{QueryResponse, RetrievalPipeline};
use crate::{RagError, Result};

const QUESTION_PROMPT: &str = "\nYour question: ";

/// Validate the configuration and connect every component needed to answer questions
#[inline]
pub async fn initialize_pipeline(config: &Config) -> Result<RetrievalPipeline<OpenAiClient>> {
    config.validate()?;

    let embedder = connect_embedder(config).await?;
    let store = VectorStore::new(config).await?;

    info!(
        "Retrieval pipeline ready: model {}, collection '{}'",
        config.embedding.model,
        store.collection_name()
    );
    Ok(RetrievalPipeline::new(embedder, store, config.retrieval.top_k))
}

/// Resolve the embedding model on the blocking thread pool
async fn connect_embedder(config: &Config) -> Result<OpenAiClient> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || OpenAiClient::connect(&config))
        .await
        .map_err(|e| RagError::ModelInit(format!("Model validation task failed: {}", e)))?
}

/// Read questions from stdin until EOF and print the retrieved context for each
#[inline]
pub async fn run_interactive(config: &Config) -> Result<()> {
    let pipeline = initialize_pipeline(config).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", QUESTION_PROMPT);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        let response = pipeline.ask(question).await;
        print_response(&response);
    }

    Ok(())
}

fn print_response(response: &QueryResponse) {
    if let Some(error) = &response.error {
        eprintln!("{} {}", style("Retrieval failed:").red().bold(), error);
        return;
    }

    println!("\n{}", style("Retrieved Context").bold().cyan());
    if response.is_empty() {
        println!("{}", style("(no matching documents)").dim());
    } else {
        println!("{}", response.context);
    }
}

/// Ingest the document directory into the configured collection
#[inline]
pub async fn ingest_documents(
    config: &Config,
    directory: Option<PathBuf>,
) -> Result<IndexingStats> {
    config.validate()?;

    let embedder = connect_embedder(config).await?;
    let mut store = VectorStore::new(config).await?;

    let indexer = match directory {
        Some(directory) => Indexer::new(DocumentLoader::new(directory, &config.chunking)),
        None => Indexer::from_config(config),
    };

    eprintln!(
        "{} {}",
        style("Ingesting documents from").bold(),
        indexer.directory().display()
    );

    let stats = indexer.index(&embedder, &mut store).await?;

    println!("Indexed {} document chunks", stats.chunks_indexed);
    println!("  Files found: {}", stats.files_found);
    println!("  Files indexed: {}", stats.files_indexed);
    if stats.errors > 0 {
        println!("  {}", style(format!("Errors: {}", stats.errors)).yellow());
    }
    println!("  Collection size: {}", store.count().await?);

    Ok(stats)
}

/// Answer a single question
#[inline]
pub async fn query_once(
    config: &Config,
    question: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        return Err(RagError::InvalidInput("Question must not be empty".to_string()));
    }

    let pipeline = initialize_pipeline(config).await?;
    let top_k = top_k.unwrap_or_else(|| pipeline.default_top_k());
    let response = pipeline.query(question, top_k).await;

    if json {
        let output =
            serde_json::to_string_pretty(&response).context("Failed to serialize response")?;
        println!("{}", output);
        return Ok(());
    }

    print_response(&response);
    if !response.is_empty() {
        println!();
        println!("{}", style("Sources").bold());
        for (metadata, distance) in response.metadatas.iter().zip(&response.distances) {
            println!(
                "  {} #{} (distance {:.4})",
                metadata.source, metadata.position, distance
            );
        }
    }

    Ok(())
}

/// Show the state of the configured collection
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    config.validate_settings()?;

    let store = VectorStore::new(config).await?;
    let count = store.count().await?;

    println!("{}", style("📊 Vector Store Status").bold().cyan());
    println!("   Collection: {}", store.collection_name());
    println!("   Storage: {}", store.storage_path().display());
    println!("   Dimension: {}", store.dimension());
    println!("   Records: {}", count);

    if count == 0 {
        println!();
        println!("Collection is empty. Use 'pdf-rag ingest' to add documents.");
    }

    Ok(())
}

/// Remove every record from the configured collection
#[inline]
pub async fn clear_store(config: &Config, skip_confirmation: bool) -> Result<()> {
    config.validate_settings()?;

    let mut store = VectorStore::new(config).await?;
    let count = store.count().await?;

    if !skip_confirmation {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete all {} records from '{}'? This cannot be undone.",
                count,
                store.collection_name()
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;

        if !confirmed {
            eprintln!("{}", style("Aborted.").yellow());
            return Ok(());
        }
    }

    store.clear().await?;
    println!(
        "{}",
        style(format!(
            "✓ Cleared {} records from '{}'",
            count,
            store.collection_name()
        ))
        .green()
    );

    Ok(())
}
