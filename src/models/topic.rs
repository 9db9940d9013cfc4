use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// §3: Topic (configuration) — the set of subjects episodes are scored against.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Topic {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub description: String,
    pub is_active: bool,
    pub enable_topic_tracking: bool,
    pub sort_order: i32,
}
