//! Settings store (C1, §4.1).
//!
//! Typed key/value lookup against the `web_settings` table. A setting row
//! carries both a value and a type tag; the store coerces to the type the
//! caller asks for. Unknown `(category, key)` returns the caller-supplied
//! default. No caching is required by contract — this implementation does
//! not cache, since runs are short-lived CLI processes (§9: "no teardown
//! requirement... safe for concurrent reads" applies to longer-lived
//! deployments than this one happens to have, but correctness does not
//! depend on caching either way).

use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValueType {
    Int,
    Float,
    Bool,
    String,
}

#[derive(Debug, sqlx::FromRow)]
struct SettingRow {
    setting_value: String,
    value_type: String,
}

pub struct SettingsStore {
    pool: PgPool,
}

/// Anything the store can coerce a stored string into.
pub trait SettingValue: Sized {
    fn coerce(raw: &str) -> Option<Self>;
}

impl SettingValue for i64 {
    fn coerce(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl SettingValue for f64 {
    fn coerce(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl SettingValue for bool {
    fn coerce(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl SettingValue for String {
    fn coerce(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl SettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `get(category, key, default) -> T`. Unknown `(category, key)` or a
    /// value that fails to coerce both fall back to `default`.
    pub async fn get<T: SettingValue>(&self, category: &str, key: &str, default: T) -> T {
        let row = sqlx::query_as::<_, SettingRow>(
            "SELECT setting_value, value_type FROM web_settings WHERE category = $1 AND setting_key = $2",
        )
        .bind(category)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten();

        match row {
            Some(row) => T::coerce(&row.setting_value).unwrap_or(default),
            None => default,
        }
    }

    pub async fn get_required_int(&self, category: &str, key: &str) -> Option<i64> {
        let row = sqlx::query_as::<_, SettingRow>(
            "SELECT setting_value, value_type FROM web_settings WHERE category = $1 AND setting_key = $2",
        )
        .bind(category)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten();

        row.and_then(|r| i64::coerce(&r.setting_value))
    }
}

/// Every setting key the core relies on, with its documented default,
/// gathered here for discoverability (§4.1). Not an enforced schema —
/// `SettingsStore::get` accepts any `(category, key)` pair.
pub mod keys {
    pub const DISCOVERY_LOOKBACK_DAYS: (&str, &str, i64) =
        ("pipeline", "discovery_lookback_days", 5);
    /// No default — required; the orchestrator treats an absent value as a
    /// configuration error.
    pub const MAX_EPISODES_PER_RUN: (&str, &str) = ("pipeline", "max_episodes_per_run");
    pub const STUCK_PROCESSING_TIMEOUT_MINUTES: (&str, &str, i64) =
        ("pipeline", "stuck_processing_timeout_minutes", 10);
    pub const YOUTUBE_MAX_TRANSCRIPTS_PER_DAY: (&str, &str, i64) =
        ("youtube", "max_transcripts_per_day", 7);
    pub const SCORE_THRESHOLD: (&str, &str, f64) = ("content_filtering", "score_threshold", 0.6);
    pub const AI_CONTENT_SCORING_MODEL: (&str, &str, &str) =
        ("ai_content_scoring", "model", "gpt-4o-mini");
    pub const AI_DIGEST_GENERATION_MODEL: (&str, &str, &str) =
        ("ai_digest_generation", "model", "gpt-4o-mini");
    pub const STORY_ARCS_RETENTION_DAYS: (&str, &str, i64) = ("story_arcs", "retention_days", 14);
    pub const STORY_ARCS_MAX_EVENTS_PER_ARC: (&str, &str, i64) =
        ("story_arcs", "max_events_per_arc", 20);
    pub const TOPIC_EVOLUTION_EMBEDDING_MODEL: (&str, &str, &str) = (
        "topic_evolution",
        "embedding_model",
        "text-embedding-3-small",
    );
    pub const TOPIC_TRACKING_MAX_TOPICS_PER_EPISODE: (&str, &str, i64) =
        ("topic_tracking", "max_topics_per_episode", 10);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_bool_variants() {
        assert_eq!(bool::coerce("true"), Some(true));
        assert_eq!(bool::coerce("0"), Some(false));
        assert_eq!(bool::coerce("maybe"), None);
    }

    #[test]
    fn coerces_numeric() {
        assert_eq!(i64::coerce("42"), Some(42));
        assert_eq!(f64::coerce("0.6"), Some(0.6));
        assert_eq!(i64::coerce("not a number"), None);
    }
}
