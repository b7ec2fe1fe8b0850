#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::source::Document;

/// A chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// The chunk text
    pub content: String,
    /// Identifier of the document the chunk came from (the article URL)
    pub source: String,
    /// Title of the source document
    pub title: String,
    /// Position of this chunk within the document
    pub chunk_index: usize,
}

impl DocumentChunk {
    /// Store id for this chunk: `{source}-{index}`
    #[inline]
    pub fn id(&self) -> String {
        format!("{}-{}", self.source, self.chunk_index)
    }

    /// Length in characters
    #[inline]
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// Configuration for recursive character splitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next
    pub chunk_overlap: usize,
    /// Separators tried in order, coarsest first. An empty separator splits
    /// into single characters.
    pub separators: Vec<String>,
    /// Treat separators as regular expressions
    pub separator_is_regex: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 100,
            chunk_overlap: 20,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                " ".to_string(),
                String::new(),
            ],
            separator_is_regex: false,
        }
    }
}

enum Separator {
    /// Split into individual characters
    Chars,
    Literal(String),
    Pattern(Regex),
}

impl Separator {
    fn occurs_in(&self, text: &str) -> Result<bool> {
        match self {
            Self::Chars => Ok(true),
            Self::Literal(sep) => Ok(text.contains(sep.as_str())),
            Self::Pattern(re) => re
                .is_match(text)
                .context("Separator pattern failed to evaluate"),
        }
    }

    /// Byte ranges of separator occurrences
    fn find_all(&self, text: &str) -> Result<Vec<(usize, usize)>> {
        match self {
            Self::Chars => Ok(Vec::new()),
            Self::Literal(sep) => Ok(text
                .match_indices(sep.as_str())
                .map(|(start, m)| (start, start + m.len()))
                .collect()),
            Self::Pattern(re) => {
                let mut ranges = Vec::new();
                for found in re.find_iter(text) {
                    let found = found.context("Separator pattern failed to evaluate")?;
                    // Zero-width matches would loop forever in the merge step
                    if found.end() > found.start() {
                        ranges.push((found.start(), found.end()));
                    }
                }
                Ok(ranges)
            }
        }
    }

    /// Split `text`, keeping each separator attached to the start of the
    /// piece that follows it. Empty pieces are dropped.
    fn split_keeping(&self, text: &str) -> Result<Vec<String>> {
        if matches!(self, Self::Chars) {
            return Ok(text.chars().map(String::from).collect());
        }

        let mut pieces = Vec::new();
        let mut piece_start = 0;
        for (start, _end) in self.find_all(text)? {
            if start > piece_start {
                pieces.push(text[piece_start..start].to_string());
            }
            piece_start = start;
        }
        if piece_start < text.len() {
            pieces.push(text[piece_start..].to_string());
        }

        Ok(pieces.into_iter().filter(|p| !p.is_empty()).collect())
    }
}

/// Splits text recursively on a list of separators, then merges the pieces
/// back into chunks no longer than `chunk_size` characters with up to
/// `chunk_overlap` characters repeated between neighbours.
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Separator>,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            anyhow::bail!("Chunk size must be greater than zero");
        }
        if config.chunk_overlap >= config.chunk_size {
            anyhow::bail!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                config.chunk_overlap,
                config.chunk_size
            );
        }

        let separators = config
            .separators
            .iter()
            .map(|sep| {
                if sep.is_empty() {
                    Ok(Separator::Chars)
                } else if config.separator_is_regex {
                    Regex::new(sep)
                        .map(Separator::Pattern)
                        .with_context(|| format!("Invalid separator pattern: {sep:?}"))
                } else {
                    Ok(Separator::Literal(sep.clone()))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators,
        })
    }

    /// Split text into trimmed, non-empty chunks in document order
    #[inline]
    pub fn split_text(&self, text: &str) -> Result<Vec<String>> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[Separator]) -> Result<Vec<String>> {
        let mut final_chunks = Vec::new();

        // Pick the first separator present in the text; the rest are kept
        // for pieces that are still too long.
        let mut chosen = separators.len().saturating_sub(1);
        for (i, separator) in separators.iter().enumerate() {
            if matches!(separator, Separator::Chars) || separator.occurs_in(text)? {
                chosen = i;
                break;
            }
        }

        let Some(separator) = separators.get(chosen) else {
            // No separators configured at all
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                final_chunks.push(trimmed.to_string());
            }
            return Ok(final_chunks);
        };
        let remaining = &separators[chosen + 1..];

        let mut good_splits: Vec<String> = Vec::new();
        for piece in separator.split_keeping(text)? {
            if char_len(&piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(&piece, remaining)?);
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        Ok(final_chunks)
    }

    /// Greedily pack pieces into chunks. Separators are already attached to
    /// the pieces, so pieces are concatenated as-is.
    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0;

        for split in splits {
            let len = char_len(split);

            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }

                if !current.is_empty() {
                    if let Some(doc) = join_pieces(&current) {
                        docs.push(doc);
                    }

                    // Drop pieces from the front until what is left fits
                    // inside the overlap window and leaves room for `split`.
                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        let Some(first) = current.first() else {
                            break;
                        };
                        total -= char_len(first);
                        current.remove(0);
                    }
                }
            }

            current.push(split);
            total += len;
        }

        if let Some(doc) = join_pieces(&current) {
            docs.push(doc);
        }

        docs
    }
}

/// Split a document into ordered, numbered chunks
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<DocumentChunk>> {
    let splitter = TextSplitter::new(config)?;
    let chunks: Vec<DocumentChunk> = splitter
        .split_text(&document.content)?
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| DocumentChunk {
            content,
            source: document.source.clone(),
            title: document.title.clone(),
            chunk_index,
        })
        .collect();

    debug!(
        "Chunked '{}' into {} chunks (avg {} chars)",
        document.title,
        chunks.len(),
        chunks.iter().map(DocumentChunk::char_count).sum::<usize>() / chunks.len().max(1)
    );

    Ok(chunks)
}

fn join_pieces(pieces: &[&str]) -> Option<String> {
    let joined = pieces.concat();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
