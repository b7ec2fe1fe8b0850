// LanceDB vector database module
// Handles vector storage and similarity search for chunk embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::embeddings::chunking::DocumentChunk;

pub use vector_store::{SearchResult, VectorStore};

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// `{source}-{chunk_index}`; re-ingesting a source overwrites its rows
    pub id: String,
    pub vector: Vec<f32>,
    /// Metadata about the chunk this embedding represents
    pub metadata: ChunkMetadata,
}

/// Metadata stored alongside each embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// URL of the source article
    pub source: String,
    /// Title of the source article
    pub title: String,
    /// The chunk text
    pub content: String,
    /// Index of this chunk within the article
    pub chunk_index: u32,
    /// RFC 3339 timestamp of when the embedding was written
    pub created_at: String,
}

impl EmbeddingRecord {
    /// Pair a chunk with its embedding
    #[inline]
    pub fn from_chunk(chunk: &DocumentChunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id(),
            vector,
            metadata: ChunkMetadata {
                source: chunk.source.clone(),
                title: chunk.title.clone(),
                content: chunk.content.clone(),
                chunk_index: u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Distance function used for nearest-neighbour search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Dot,
}

impl DistanceMetric {
    #[inline]
    pub fn distance_type(self) -> lancedb::DistanceType {
        match self {
            Self::Cosine => lancedb::DistanceType::Cosine,
            Self::L2 => lancedb::DistanceType::L2,
            Self::Dot => lancedb::DistanceType::Dot,
        }
    }

    /// Convert a raw distance into a score where higher is more similar
    #[inline]
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            Self::Cosine | Self::Dot => 1.0 - distance,
            Self::L2 => 1.0 / (1.0 + distance),
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Dot => "dot",
        };
        f.write_str(name)
    }
}
