use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// §3: NewsletterIssue.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NewsletterIssue {
    pub id: Uuid,
    pub issue_date: NaiveDate,
    pub subject_line: String,
    pub big_news_summary: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// §3: NewsletterExample.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NewsletterExample {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub position: i32,
    pub title: String,
    pub description: String,
    pub how_to_replicate: String,
    pub source_episode_id: Uuid,
    pub source_title: Option<String>,
    pub source_url: Option<String>,
}
