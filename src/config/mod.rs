// Configuration management module
// Settings are resolved once at startup from defaults, config.toml and the environment

pub mod settings;


use console::style;

pub use settings::{
    API_KEY_ENV, ApiKey, Config, ConfigError, DocumentsConfig, EmbeddingConfig, RetrievalConfig,
    StoreConfig,
};

/// Print the effective configuration with the credential redacted
#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  API Base: {}", style(&config.embedding.api_base).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    match &config.api_key {
        Some(key) => eprintln!("  {}: {}", API_KEY_ENV, style(key).cyan()),
        None => eprintln!("  {}: {}", API_KEY_ENV, style("not set").red()),
    }

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  Path: {}", style(config.store_path().display()).cyan());
    eprintln!("  Collection: {}", style(&config.store.collection).cyan());

    eprintln!();
    eprintln!("{}", style("Documents:").bold().yellow());
    eprintln!("  Directory: {}", style(config.documents_dir().display()).cyan());
    eprintln!("  Chunk Size: {}", style(config.chunking.chunk_size).cyan());
    eprintln!("  Chunk Overlap: {}", style(config.chunking.chunk_overlap).cyan());

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}
