
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::embeddings::chunking::DocumentChunk;
use crate::provider::ProviderClient;

const EMBEDDINGS_PATH: &str = "/v1/embeddings";

/// Client for the `/v1/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    provider: ProviderClient,
    model: String,
    batch_size: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding of a single chunk, aligned with the chunk it came from
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub text: String,
    pub embedding: Vec<f32>,
    pub chunk_index: Option<usize>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let provider = ProviderClient::new(config)?;
        Ok(Self::with_provider(
            provider,
            config.embedding.model.clone(),
            config.embedding.batch_size,
        ))
    }

    #[inline]
    pub fn with_provider(provider: ProviderClient, model: String, batch_size: u32) -> Self {
        Self {
            provider,
            model,
            batch_size: batch_size.max(1),
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn provider(&self) -> &ProviderClient {
        &self.provider
    }

    /// Embed a single query string
    #[inline]
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating query embedding (length: {})", text.len());

        let mut embeddings = self.embed_single_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding response was empty"))
    }

    /// Embed many texts, sending at most `batch_size` inputs per request
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            let embeddings = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(embeddings);
        }

        let dimension = results.first().map_or(0, Vec::len);
        if results.iter().any(|e| e.len() != dimension || e.is_empty()) {
            anyhow::bail!("Embedding service returned vectors of inconsistent dimension");
        }

        debug!(
            "Generated {} embeddings with {} dimensions",
            results.len(),
            dimension
        );
        Ok(results)
    }

    /// Embed document chunks, one embedding per chunk in chunk order
    #[inline]
    pub fn embed_documents(&self, chunks: &[DocumentChunk]) -> Result<Vec<EmbeddingResult>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} document chunks", chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embed_texts(&texts)?;

        Ok(chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddingResult {
                text: chunk.content.clone(),
                embedding,
                chunk_index: Some(chunk.chunk_index),
            })
            .collect())
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response: EmbeddingResponse = self
            .provider
            .post_json(EMBEDDINGS_PATH, &request)
            .context("Failed to generate embeddings")?;

        if response.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        // Entries carry their input position; order by it rather than trust
        // the response order.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        if data.iter().enumerate().any(|(i, d)| d.index != i) {
            anyhow::bail!("Embedding response indices do not match the request");
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
