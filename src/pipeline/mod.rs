// RAG pipeline orchestration
// Fetches, splits, embeds and stores a topic's article, then answers
// questions from the nearest stored chunks


use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::lancedb::{EmbeddingRecord, SearchResult, VectorStore};
use crate::database::sqlite::{Database, Topic, TopicStatus, TopicUpdate};
use crate::embeddings::{DocumentChunk, EmbeddingClient, chunk_document};
use crate::llm::{ChatClient, PromptTemplate};
use crate::source::{Document, WikipediaClient};
use crate::{RagError, Result};

/// Stage reported while a topic is being indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStage {
    Loading,
    Splitting,
    Embedding,
}

impl IndexStage {
    #[inline]
    pub fn message(self) -> &'static str {
        match self {
            Self::Loading => "Loading Wikipedia article...",
            Self::Splitting => "Splitting text into chunks...",
            Self::Embedding => "Creating embeddings and vector store...",
        }
    }
}

/// A topic whose chunks are present in the vector store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicIndex {
    pub topic: String,
    /// Article title, `None` when the topic resolved to no article
    pub title: Option<String>,
    pub source: Option<String>,
    pub chunk_count: usize,
}

impl TopicIndex {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }

    fn from_record(record: &Topic, chunk_count: usize) -> Self {
        Self {
            topic: record.topic.clone(),
            title: record.title.clone(),
            source: record.source_url.clone(),
            chunk_count,
        }
    }
}

/// A generated answer with the chunks it was conditioned on
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SearchResult>,
}

/// Recorded and stored chunk counts for one topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConsistency {
    pub topic: String,
    pub status: TopicStatus,
    pub recorded_chunks: usize,
    pub stored_embeddings: usize,
}

impl TopicConsistency {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.status != TopicStatus::Completed || self.recorded_chunks == self.stored_embeddings
    }
}

/// Summary of the metadata database and the vector store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub total_topics: usize,
    pub completed_topics: usize,
    pub indexing_topics: usize,
    pub failed_topics: usize,
    pub total_embeddings: usize,
    /// Embeddings not accounted for by any completed topic
    pub untracked_embeddings: usize,
    pub topics: Vec<TopicConsistency>,
    pub store_healthy: bool,
}

impl IndexStats {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.store_healthy
            && self.untracked_embeddings == 0
            && self.topics.iter().all(TopicConsistency::is_consistent)
    }
}

/// Owns every pipeline component for one data directory
pub struct Indexer {
    config: Config,
    database: Database,
    vector_store: VectorStore,
    source: WikipediaClient,
    embeddings: EmbeddingClient,
    chat: ChatClient,
    built: HashMap<String, TopicIndex>,
}

impl Indexer {
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let database = Database::new(config.database_path())
            .await
            .map_err(database_error)?;
        let vector_store = VectorStore::new(&config).await?;
        let source = WikipediaClient::new(&config.source).map_err(config_error)?;
        let embeddings = EmbeddingClient::new(&config).map_err(config_error)?;
        let chat = ChatClient::new(&config).map_err(config_error)?;

        Ok(Self {
            config,
            database,
            vector_store,
            source,
            embeddings,
            chat,
            built: HashMap::new(),
        })
    }

    /// Replace the document source, e.g. to shorten retry delays
    #[inline]
    pub fn with_source(mut self, source: WikipediaClient) -> Self {
        self.source = source;
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    #[inline]
    pub fn embeddings(&self) -> &EmbeddingClient {
        &self.embeddings
    }

    #[inline]
    pub fn chat(&self) -> &ChatClient {
        &self.chat
    }

    /// Index already built in this process for `topic`
    #[inline]
    pub fn built_index(&self, topic: &str) -> Option<&TopicIndex> {
        self.built.get(&topic_key(topic))
    }

    /// Fetch the topic's article. A topic with no article yields `None`.
    #[inline]
    pub fn fetch(&self, topic: &str) -> Result<Option<Document>> {
        self.source
            .fetch_document(topic)
            .map_err(|e| RagError::Source(format!("{e:#}")))
    }

    #[inline]
    pub fn split(&self, document: &Document) -> Result<Vec<DocumentChunk>> {
        chunk_document(document, &self.config.chunking).map_err(config_error)
    }

    /// Fetch and split the topic's article. Empty when there is no article.
    #[inline]
    pub fn ingest(&self, topic: &str) -> Result<Vec<DocumentChunk>> {
        match self.fetch(topic)? {
            Some(document) => self.split(&document),
            None => Ok(Vec::new()),
        }
    }

    /// Embed `chunks` and upsert them into the vector store by id
    #[inline]
    pub async fn index_chunks(&mut self, chunks: &[DocumentChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let results = self
            .embeddings
            .embed_documents(chunks)
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;

        let records = chunks
            .iter()
            .zip(results)
            .map(|(chunk, result)| EmbeddingRecord::from_chunk(chunk, result.embedding))
            .collect::<Vec<_>>();
        let stored = records.len();

        self.vector_store.upsert_embeddings(records).await?;
        debug!("Stored {} embeddings", stored);
        Ok(stored)
    }

    #[inline]
    pub async fn build_index(&mut self, topic: &str, rebuild: bool) -> Result<TopicIndex> {
        self.build_index_with_progress(topic, rebuild, |_| {}).await
    }

    /// Make sure the topic's chunks are in the store.
    ///
    /// Reuses an index built earlier in this process, or one recorded as
    /// completed in the metadata database whose entries are still stored.
    /// `rebuild` drops the topic's entries and indexes it again.
    #[inline]
    pub async fn build_index_with_progress<F>(
        &mut self,
        topic: &str,
        rebuild: bool,
        mut on_stage: F,
    ) -> Result<TopicIndex>
    where
        F: FnMut(IndexStage),
    {
        let topic = topic.trim();
        let key = topic_key(topic);

        if topic.is_empty() {
            debug!("Blank topic, nothing to index");
            return Ok(TopicIndex {
                topic: String::new(),
                title: None,
                source: None,
                chunk_count: 0,
            });
        }

        if !rebuild {
            if let Some(index) = self.built.get(&key) {
                debug!("Reusing index built in this session for '{}'", topic);
                return Ok(index.clone());
            }
        }

        let record = self
            .database
            .get_or_create_topic(topic)
            .await
            .map_err(database_error)?;

        if !rebuild {
            if let Some(index) = self.reusable_index(&record).await? {
                info!(
                    "Reusing stored index for '{}' ({} chunks)",
                    topic, index.chunk_count
                );
                self.built.insert(key, index.clone());
                return Ok(index);
            }
        }

        self.set_topic_status(
            record.id,
            TopicUpdate {
                status: Some(TopicStatus::Indexing),
                clear_error: true,
                ..Default::default()
            },
        )
        .await?;

        match self
            .index_topic(topic, rebuild, &record, &mut on_stage)
            .await
        {
            Ok(index) => {
                self.set_topic_status(
                    record.id,
                    TopicUpdate {
                        status: Some(TopicStatus::Completed),
                        title: index.title.clone(),
                        source_url: index.source.clone(),
                        chunk_count: Some(i64::try_from(index.chunk_count).unwrap_or(i64::MAX)),
                        indexed_date: Some(Utc::now().naive_utc()),
                        ..Default::default()
                    },
                )
                .await?;

                if !index.is_empty() {
                    if let Err(e) = self.vector_store.optimize().await {
                        warn!("Failed to optimize vector database: {}", e);
                    }
                }

                info!(
                    "Indexed '{}': {} chunks from {}",
                    topic,
                    index.chunk_count,
                    index.source.as_deref().unwrap_or("no article")
                );
                self.built.insert(key, index.clone());
                Ok(index)
            }
            Err(e) => {
                warn!("Indexing '{}' failed: {}", topic, e);
                let update = TopicUpdate {
                    status: Some(TopicStatus::Failed),
                    error_message: Some(e.to_string()),
                    ..Default::default()
                };
                if let Err(update_error) = self.set_topic_status(record.id, update).await {
                    warn!("Failed to record indexing failure: {}", update_error);
                }
                Err(e)
            }
        }
    }

    async fn reusable_index(&self, record: &Topic) -> Result<Option<TopicIndex>> {
        if !record.is_completed() {
            return Ok(None);
        }
        let Some(source) = record.source_url.as_deref() else {
            return Ok(None);
        };

        let stored = self.vector_store.count_for_source(source).await?;
        if stored == 0 {
            debug!("Completed topic '{}' has no stored entries", record.topic);
            return Ok(None);
        }

        Ok(Some(TopicIndex::from_record(record, stored)))
    }

    async fn index_topic<F>(
        &mut self,
        topic: &str,
        rebuild: bool,
        record: &Topic,
        on_stage: &mut F,
    ) -> Result<TopicIndex>
    where
        F: FnMut(IndexStage),
    {
        on_stage(IndexStage::Loading);
        let Some(document) = self.fetch(topic)? else {
            info!("No article for '{}', nothing to index", topic);
            return Ok(TopicIndex {
                topic: record.topic.clone(),
                title: None,
                source: None,
                chunk_count: 0,
            });
        };

        on_stage(IndexStage::Splitting);
        let chunks = self.split(&document)?;
        debug!("Split '{}' into {} chunks", document.title, chunks.len());

        if rebuild {
            let mut stale = vec![document.source.as_str()];
            if let Some(previous) = record.source_url.as_deref() {
                if previous != document.source {
                    stale.push(previous);
                }
            }
            for source in stale {
                self.vector_store.delete_source_embeddings(source).await?;
            }
        }

        on_stage(IndexStage::Embedding);
        let chunk_count = self.index_chunks(&chunks).await?;

        Ok(TopicIndex {
            topic: record.topic.clone(),
            title: Some(document.title),
            source: Some(document.source),
            chunk_count,
        })
    }

    /// The `k` stored chunks of `topic` closest to `query`, most similar first
    #[inline]
    pub async fn retrieve(
        &mut self,
        topic: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let index = self.build_index(topic, false).await?;
        let Some(source) = index.source.as_deref() else {
            return Ok(Vec::new());
        };
        if k == 0 || index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embeddings
            .embed_query(query)
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;

        let results = self
            .vector_store
            .search_similar(&query_vector, k, Some(source))
            .await?;
        debug!("Retrieved {} chunks for query: {}", results.len(), query);
        Ok(results)
    }

    /// Prompt template for `topic`, from config when one is set
    #[inline]
    pub fn prompt_for(&self, topic: &str) -> Result<PromptTemplate> {
        match self.config.generation.template.as_deref() {
            Some(template) => PromptTemplate::new(template, topic).map_err(config_error),
            None => Ok(PromptTemplate::for_topic(topic)),
        }
    }

    /// Retrieve context for `question` and have the language model answer it
    #[inline]
    pub async fn answer(&mut self, topic: &str, question: &str, k: usize) -> Result<Answer> {
        let topic = topic.trim();
        let sources = self.retrieve(topic, question, k).await?;
        let prompt = self.prompt_for(topic)?.render(
            sources.iter().map(|r| r.chunk_metadata.content.as_str()),
            question,
        );
        debug!("Prompt has {} context chunks", sources.len());

        let text = self
            .chat
            .complete(&prompt)
            .map_err(|e| RagError::Generation(format!("{e:#}")))?;

        Ok(Answer { text, sources })
    }

    #[inline]
    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        self.database.list_topics().await.map_err(database_error)
    }

    /// Remove a topic's stored entries and its metadata record.
    /// Returns `None` when the topic is unknown.
    #[inline]
    pub async fn delete_topic(&mut self, topic: &str) -> Result<Option<usize>> {
        let Some(record) = self
            .database
            .get_topic(topic)
            .await
            .map_err(database_error)?
        else {
            return Ok(None);
        };

        let removed = match record.source_url.as_deref() {
            Some(source) => self.vector_store.delete_source_embeddings(source).await?,
            None => 0,
        };

        self.database
            .delete_topic(record.id)
            .await
            .map_err(database_error)?;
        self.built.remove(&topic_key(topic));

        info!("Deleted topic '{}' ({} embeddings)", record.topic, removed);
        Ok(Some(removed))
    }

    /// Compare the metadata records against the vector store
    #[inline]
    pub async fn stats(&self) -> Result<IndexStats> {
        let records = self.list_topics().await?;
        let store_healthy = self.vector_store.validate_integrity().await?;
        let total_embeddings = if store_healthy {
            self.vector_store.count_embeddings().await?
        } else {
            0
        };

        let mut topics = Vec::with_capacity(records.len());
        for record in &records {
            let stored_embeddings = match record.source_url.as_deref() {
                Some(source) if store_healthy => self.vector_store.count_for_source(source).await?,
                _ => 0,
            };
            topics.push(TopicConsistency {
                topic: record.topic.clone(),
                status: record.status,
                recorded_chunks: usize::try_from(record.chunk_count).unwrap_or(0),
                stored_embeddings,
            });
        }

        let tracked: usize = topics
            .iter()
            .filter(|t| t.status == TopicStatus::Completed)
            .map(|t| t.stored_embeddings)
            .sum();

        Ok(IndexStats {
            total_topics: records.len(),
            completed_topics: records.iter().filter(|r| r.is_completed()).count(),
            indexing_topics: records.iter().filter(|r| r.is_indexing()).count(),
            failed_topics: records.iter().filter(|r| r.is_failed()).count(),
            total_embeddings,
            untracked_embeddings: total_embeddings.saturating_sub(tracked),
            topics,
            store_healthy,
        })
    }

    async fn set_topic_status(&self, id: i64, update: TopicUpdate) -> Result<()> {
        self.database
            .update_topic(id, update)
            .await
            .map_err(database_error)?;
        Ok(())
    }
}

fn topic_key(topic: &str) -> String {
    topic.trim().to_lowercase()
}

fn database_error(error: anyhow::Error) -> RagError {
    RagError::Database(format!("{error:#}"))
}

fn config_error(error: anyhow::Error) -> RagError {
    RagError::Config(format!("{error:#}"))
}
