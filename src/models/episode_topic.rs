use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// §3: EpisodeTopic — legacy/coexisting entity consumed by the dedup pass
/// (C8). Populated only when
/// [`crate::config::AppConfig::dual_write_episode_topics`] is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EpisodeTopic {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub topic_slug: String,
    pub topic_name: String,
    pub digest_topic: String,
    pub key_points: sqlx::types::Json<Vec<String>>,
    pub relevance_score: f64,
    pub first_mentioned_at: DateTime<Utc>,
    pub last_mentioned_at: DateTime<Utc>,
    pub mention_count: i32,
}
