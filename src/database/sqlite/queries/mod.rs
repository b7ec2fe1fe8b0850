
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

const TOPIC_COLUMNS: &str = "id, topic, title, source_url, chunk_count, status, \
                             error_message, created_date, indexed_date";

pub struct TopicQueries;

impl TopicQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_topic: NewTopic) -> Result<Topic> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO topics (topic, status, created_date) VALUES (?, 'pending', ?)",
        )
        .bind(new_topic.topic.trim())
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create topic")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created topic"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Topic>> {
        let query = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?");
        sqlx::query_as::<_, Topic>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get topic by id")
    }

    /// Topic names compare case-insensitively
    #[inline]
    pub async fn get_by_topic(pool: &SqlitePool, topic: &str) -> Result<Option<Topic>> {
        let query = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE topic = ?");
        sqlx::query_as::<_, Topic>(&query)
            .bind(topic.trim())
            .fetch_optional(pool)
            .await
            .context("Failed to get topic by name")
    }

    #[inline]
    pub async fn get_or_create(pool: &SqlitePool, topic: &str) -> Result<Topic> {
        if let Some(existing) = Self::get_by_topic(pool, topic).await? {
            return Ok(existing);
        }

        debug!("Creating topic record for '{}'", topic);
        Self::create(
            pool,
            NewTopic {
                topic: topic.to_string(),
            },
        )
        .await
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Topic>> {
        let query = format!("SELECT {TOPIC_COLUMNS} FROM topics ORDER BY created_date DESC, id DESC");
        sqlx::query_as::<_, Topic>(&query)
            .fetch_all(pool)
            .await
            .context("Failed to list topics")
    }

    #[inline]
    pub async fn list_by_status(pool: &SqlitePool, status: TopicStatus) -> Result<Vec<Topic>> {
        let query = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE status = ? ORDER BY topic");
        sqlx::query_as::<_, Topic>(&query)
            .bind(status.as_str())
            .fetch_all(pool)
            .await
            .context("Failed to list topics by status")
    }

    #[inline]
    pub async fn update(pool: &SqlitePool, id: i64, update: TopicUpdate) -> Result<Option<Topic>> {
        let mut query_parts = Vec::new();
        let mut query_values = Vec::new();

        if let Some(status) = update.status {
            query_parts.push("status = ?");
            query_values.push(status.as_str().to_string());
        }

        if let Some(title) = update.title {
            query_parts.push("title = ?");
            query_values.push(title);
        }

        if let Some(source_url) = update.source_url {
            query_parts.push("source_url = ?");
            query_values.push(source_url);
        }

        if let Some(chunk_count) = update.chunk_count {
            query_parts.push("chunk_count = ?");
            query_values.push(chunk_count.to_string());
        }

        if let Some(error) = update.error_message {
            query_parts.push("error_message = ?");
            query_values.push(error);
        } else if update.clear_error {
            query_parts.push("error_message = NULL");
        }

        if let Some(indexed_date) = update.indexed_date {
            query_parts.push("indexed_date = ?");
            query_values.push(indexed_date.to_string());
        }

        if query_parts.is_empty() {
            return Self::get_by_id(pool, id).await;
        }

        let query_str = format!("UPDATE topics SET {} WHERE id = ?", query_parts.join(", "));

        let mut query = sqlx::query(&query_str);
        for value in query_values {
            query = query.bind(value);
        }
        query = query.bind(id);

        query.execute(pool).await.context("Failed to update topic")?;

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM topics WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete topic")?;

        Ok(result.rows_affected() > 0)
    }
}
