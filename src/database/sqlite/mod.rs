use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};


pub mod models;
pub mod queries;

pub use models::{NewTopic, Topic, TopicStatus, TopicUpdate};
pub use queries::TopicQueries;

pub type DbPool = Pool<Sqlite>;

const DATABASE_FILE_NAME: &str = "metadata.db";

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open `metadata.db` inside the data directory, creating both if needed
    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join(DATABASE_FILE_NAME)).await
    }

    #[inline]
    pub async fn get_topic(&self, topic: &str) -> Result<Option<Topic>> {
        TopicQueries::get_by_topic(&self.pool, topic).await
    }

    #[inline]
    pub async fn get_or_create_topic(&self, topic: &str) -> Result<Topic> {
        TopicQueries::get_or_create(&self.pool, topic).await
    }

    #[inline]
    pub async fn update_topic(&self, id: i64, update: TopicUpdate) -> Result<Option<Topic>> {
        TopicQueries::update(&self.pool, id, update).await
    }

    #[inline]
    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        TopicQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn list_topics_by_status(&self, status: TopicStatus) -> Result<Vec<Topic>> {
        TopicQueries::list_by_status(&self.pool, status).await
    }

    #[inline]
    pub async fn delete_topic(&self, id: i64) -> Result<bool> {
        TopicQueries::delete(&self.pool, id).await
    }
}
