
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Separators tried in order, coarsest first. The empty separator splits into characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Configuration for text chunking. Sizes are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum length of a chunk
    pub chunk_size: usize,
    /// Maximum number of characters shared by consecutive chunks of one document
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 100,
            chunk_overlap: 20,
        }
    }
}

/// Recursive character splitter.
///
/// Text is cut at the coarsest separator it contains; pieces that fit are merged
/// greedily up to `chunk_size`, pieces that don't are split again with the next
/// separator. After each emitted chunk the merge window keeps at most
/// `chunk_overlap` characters, which seed the next chunk.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap.min(config.chunk_size.saturating_sub(1)),
        }
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into chunks of at most `chunk_size` characters, in document order
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chunks = self.split_recursive(text, &SEPARATORS);

        debug!(
            "Split {} characters into {} chunks (size {}, overlap {})",
            char_len(text),
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();

        let Some(position) = separators
            .iter()
            .position(|separator| separator.is_empty() || text.contains(separator))
        else {
            push_trimmed(&mut chunks, text);
            return chunks;
        };
        let separator = separators[position];
        let finer_separators = &separators[position + 1..];

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut fitting: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge_pieces(&fitting, separator));
                fitting.clear();
            }

            if finer_separators.is_empty() {
                push_trimmed(&mut chunks, &piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer_separators));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge_pieces(&fitting, separator));
        }

        chunks
    }

    /// Greedily join pieces with `separator` into chunks, carrying an overlap window
    fn merge_pieces(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut window_len = 0;

        for piece in pieces {
            let piece_len = char_len(piece);

            if !window.is_empty()
                && window_len + piece_len + joiner_len(&window, separator_len) > self.chunk_size
            {
                push_trimmed(&mut chunks, &join_window(&window, separator));

                // Shrink to the overlap, and further if the next piece still wouldn't fit
                while window_len > self.chunk_overlap
                    || (window_len > 0
                        && window_len + piece_len + joiner_len(&window, separator_len)
                            > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    window_len -= char_len(front) + joiner_len(&window, separator_len);
                }
            }

            window.push_back(piece);
            window_len += piece_len + if window.len() > 1 { separator_len } else { 0 };
        }

        if !window.is_empty() {
            push_trimmed(&mut chunks, &join_window(&window, separator));
        }

        chunks
    }
}

/// Separator length paid when appending to `window`
fn joiner_len(window: &VecDeque<&str>, separator_len: usize) -> usize {
    if window.is_empty() { 0 } else { separator_len }
}

fn join_window(window: &VecDeque<&str>, separator: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(separator)
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
