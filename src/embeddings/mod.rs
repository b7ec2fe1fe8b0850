// Embeddings module
// Text splitting and the embedding service client

pub mod chunking;
pub mod client;

pub use chunking::{ChunkingConfig, DocumentChunk, TextSplitter, chunk_document};
pub use client::{EmbeddingClient, EmbeddingResult};
