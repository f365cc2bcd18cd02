use clap::{Parser, Subcommand};
use pdf_rag::Result;
use pdf_rag::commands::{clear_store, ingest_documents, query_once, run_interactive, show_status};
use pdf_rag::config::{Config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Retrieval over a local collection of PDF and text documents")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, .env and relative data paths
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, embed and store the document directory
    Ingest {
        /// Ingest from this directory instead of the configured one
        #[arg(long)]
        directory: Option<PathBuf>,
    },
    /// Retrieve context for a single question
    Query {
        question: String,
        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the vector store status
    Status,
    /// Delete every record in the collection
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show the current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.base_dir)?;

    match cli.command {
        None => run_interactive(&config).await?,
        Some(Commands::Ingest { directory }) => {
            ingest_documents(&config, directory).await?;
        }
        Some(Commands::Query {
            question,
            top_k,
            json,
        }) => query_once(&config, &question, top_k, json).await?,
        Some(Commands::Status) => show_status(&config).await?,
        Some(Commands::Clear { yes }) => clear_store(&config, yes).await?,
        Some(Commands::Config) => show_config(&config),
    }

    Ok(())
}
