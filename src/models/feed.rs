use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// §3: Feed — external source of episodes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub source_url: String,
    pub display_title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Candidate episode yielded by the feed reader (C2), before it is persisted
/// as an [`crate::models::episode::Episode`] row.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeDescriptor {
    pub episode_guid: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
    pub content_url: Option<String>,
    pub description: Option<String>,
}
