
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// Indexing record for one topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Topic {
    pub id: i64,
    pub topic: String,
    pub title: Option<String>,
    /// URL of the article the topic resolved to
    pub source_url: Option<String>,
    pub chunk_count: i64,
    pub status: TopicStatus,
    pub error_message: Option<String>,
    pub created_date: NaiveDateTime,
    pub indexed_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TopicStatus {
    Pending,
    Indexing,
    Completed,
    Failed,
}

impl TopicStatus {
    /// Value stored in the `status` column
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Indexing => "indexing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TopicStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Pending => write!(f, "Pending"),
            Self::Indexing => write!(f, "Indexing"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TopicUpdate {
    pub status: Option<TopicStatus>,
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub chunk_count: Option<i64>,
    pub error_message: Option<String>,
    /// Reset `error_message` to NULL; ignored when `error_message` is set
    pub clear_error: bool,
    pub indexed_date: Option<NaiveDateTime>,
}

impl Topic {
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == TopicStatus::Completed
    }

    #[inline]
    pub fn is_indexing(&self) -> bool {
        self.status == TopicStatus::Indexing
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == TopicStatus::Failed
    }
}
