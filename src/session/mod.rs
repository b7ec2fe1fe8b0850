// Question-answering session
// Keeps the built index for one topic and answers questions against it


use tracing::{debug, info};

use crate::Result;
use crate::pipeline::{Answer, IndexStage, Indexer, TopicIndex};

pub const EMPTY_QUESTION_WARNING: &str = "Please enter a question first.";

/// Preset questions offered by the interactive chat
pub const EXAMPLE_QUESTIONS: [&str; 4] = [
    "What is the origin of the Day of the Dead?",
    "How is Day of the Dead celebrated?",
    "What are the traditional symbols of Day of the Dead?",
    "When is Day of the Dead observed?",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    NotBuilt,
    Ready(TopicIndex),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The question was blank; nothing was asked
    EmptyQuestion,
    Answer(Answer),
}

pub struct QaSession {
    indexer: Indexer,
    topic: String,
    top_k: usize,
    state: IndexState,
}

impl QaSession {
    #[inline]
    pub fn new(indexer: Indexer, topic: &str, top_k: usize) -> Self {
        Self {
            indexer,
            topic: topic.trim().to_string(),
            top_k,
            state: IndexState::NotBuilt,
        }
    }

    /// Session over the configured topic and result count
    #[inline]
    pub fn from_config(indexer: Indexer) -> Self {
        let topic = indexer.config().source.topic.clone();
        let top_k = indexer.config().retrieval.top_k;
        Self::new(indexer, &topic, top_k)
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub fn set_top_k(&mut self, top_k: usize) {
        self.top_k = top_k;
    }

    #[inline]
    pub fn state(&self) -> &IndexState {
        &self.state
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, IndexState::Ready(_))
    }

    #[inline]
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    #[inline]
    pub fn into_indexer(self) -> Indexer {
        self.indexer
    }

    #[inline]
    pub async fn ensure_index(&mut self) -> Result<TopicIndex> {
        self.ensure_index_with_progress(|_| {}).await
    }

    /// Build the topic's index on first use and keep it for later questions
    #[inline]
    pub async fn ensure_index_with_progress<F>(&mut self, on_stage: F) -> Result<TopicIndex>
    where
        F: FnMut(IndexStage),
    {
        if let IndexState::Ready(index) = &self.state {
            return Ok(index.clone());
        }

        let index = self
            .indexer
            .build_index_with_progress(&self.topic, false, on_stage)
            .await?;
        info!(
            "Session ready for '{}' ({} chunks)",
            self.topic, index.chunk_count
        );
        self.state = IndexState::Ready(index.clone());
        Ok(index)
    }

    /// Answer `question` from the topic's index, building it if needed.
    /// A blank question is not sent anywhere.
    #[inline]
    pub async fn ask(&mut self, question: &str) -> Result<Reply> {
        let question = question.trim();
        if question.is_empty() {
            debug!("Ignoring blank question");
            return Ok(Reply::EmptyQuestion);
        }

        self.ensure_index().await?;
        let answer = self
            .indexer
            .answer(&self.topic, question, self.top_k)
            .await?;
        Ok(Reply::Answer(answer))
    }
}
