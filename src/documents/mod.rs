// Document loading module
// Walks a directory for supported files, extracts their text and splits it into chunks

pub mod chunking;

#[cfg(test)]
mod tests;

use anyhow::{Context, anyhow};
use fancy_regex::Regex;
use pulldown_cmark::{Event, Parser, TagEnd};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::{RagError, Result};
pub use chunking::{ChunkingConfig, TextSplitter};

static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[ \t\u{a0}]+").expect("whitespace pattern is valid"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline pattern is valid"));

/// A bounded slice of a source document, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// The chunk text
    pub content: String,
    /// Path of the source file, relative to the document directory
    pub source: String,
    /// Index of this chunk within its source
    pub position: usize,
}

/// Normalized text of one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
    Markdown,
}

impl DocumentFormat {
    /// Detect the format from the file extension, ignoring case
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Loads supported documents from a directory tree and splits them into chunks
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    directory: PathBuf,
    splitter: TextSplitter,
}

impl DocumentLoader {
    #[inline]
    pub fn new(directory: impl Into<PathBuf>, chunking: &ChunkingConfig) -> Self {
        Self {
            directory: directory.into(),
            splitter: TextSplitter::new(chunking),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.documents_dir(), &config.chunking)
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Load every supported document and split it into chunks.
    ///
    /// Chunk order is preserved within a document; documents follow path order.
    #[inline]
    pub fn load_and_split(&self) -> Result<Vec<Chunk>> {
        let files = self.discover_files()?;
        info!(
            "Loading {} documents from {}",
            files.len(),
            self.directory.display()
        );

        let mut chunks = Vec::new();
        for path in &files {
            let document = self.load_file(path)?;
            chunks.extend(self.split(&document));
        }

        info!("Split {} documents into {} chunks", files.len(), chunks.len());
        Ok(chunks)
    }

    /// Recursively find supported files, sorted by path
    #[inline]
    pub fn discover_files(&self) -> Result<Vec<PathBuf>> {
        if !self.directory.is_dir() {
            return Err(RagError::Load(format!(
                "Document directory does not exist: {}",
                self.directory.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.directory).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if path.is_file() && DocumentFormat::from_path(path).is_some() {
                files.push(entry.into_path());
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(RagError::Load(format!(
                "No supported documents (.pdf, .txt, .md) found in {}",
                self.directory.display()
            )));
        }

        debug!("Discovered {} documents", files.len());
        Ok(files)
    }

    /// Read one file and return its normalized text
    #[inline]
    pub fn load_file(&self, path: &Path) -> Result<SourceDocument> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            RagError::Load(format!("Unsupported document format: {}", path.display()))
        })?;

        let raw = match format {
            DocumentFormat::Pdf => extract_pdf_text(path),
            DocumentFormat::PlainText => read_text(path),
            DocumentFormat::Markdown => read_text(path).map(|text| markdown_to_text(&text)),
        }
        .map_err(|e| RagError::Load(format!("{:#}", e)))?;

        let source = path
            .strip_prefix(&self.directory)
            .unwrap_or(path)
            .display()
            .to_string();
        let text = normalize_text(&raw);

        if text.is_empty() {
            warn!("No extractable text in {}", source);
        } else {
            debug!("Loaded {} ({} characters)", source, text.len());
        }

        Ok(SourceDocument { source, text })
    }

    /// Split a document into chunks that carry its source attribution
    #[inline]
    pub fn split(&self, document: &SourceDocument) -> Vec<Chunk> {
        self.splitter
            .split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(position, content)| Chunk {
                content,
                source: document.source.clone(),
                position,
            })
            .collect()
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn extract_pdf_text(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| anyhow!("Failed to extract text from {}: {}", path.display(), e))
}

/// Render markdown to plain text, keeping block boundaries as blank lines
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(content) | Event::Code(content) => text.push_str(&content),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::Item
                | TagEnd::TableRow,
            ) => text.push_str("\n\n"),
            _ => {}
        }
    }

    text
}

/// Normalize extracted text before splitting.
///
/// Line endings become `\n`, form feeds (PDF page breaks) become paragraph
/// breaks, runs of spaces and tabs collapse to one space, lines are trimmed
/// and three or more newlines collapse to a blank line.
#[inline]
pub fn normalize_text(text: &str) -> String {
    let text = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{c}', "\n\n");
    let collapsed = HORIZONTAL_WHITESPACE.replace_all(&text, " ");
    let trimmed_lines = collapsed.lines().map(str::trim).collect::<Vec<_>>().join("\n");

    EXCESS_NEWLINES
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}
