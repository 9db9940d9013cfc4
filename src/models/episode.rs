use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// §3 invariant 2: the status DAG. Advance-only except for the stuck-
/// processing sweep (`Processing -> Pending`) and retries (re-entry from
/// `Pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Pending,
    Processing,
    Transcribed,
    Scored,
    NotRelevant,
    Digested,
    Failed,
}

impl EpisodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Pending => "pending",
            EpisodeStatus::Processing => "processing",
            EpisodeStatus::Transcribed => "transcribed",
            EpisodeStatus::Scored => "scored",
            EpisodeStatus::NotRelevant => "not_relevant",
            EpisodeStatus::Digested => "digested",
            EpisodeStatus::Failed => "failed",
        }
    }
}

/// §3: Episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub episode_guid: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub content_url: Option<String>,
    pub duration_seconds: Option<i64>,
    pub description: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_word_count: Option<i32>,
    pub transcript_acquired_at: Option<DateTime<Utc>>,
    pub scores: Option<HashMap<String, f64>>,
    pub scored_at: Option<DateTime<Utc>>,
    pub status: EpisodeStatus,
    pub failure_count: i32,
    pub last_failure_reason: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    /// §4.4: `is_relevant(scores) := ∃ t. scores[t] ≥ score_threshold`.
    pub fn is_relevant(scores: &HashMap<String, f64>, score_threshold: f64) -> bool {
        scores.values().any(|&v| v >= score_threshold)
    }

    /// §4.4: `relevant_topics(scores) := { t : scores[t] ≥ score_threshold }`.
    pub fn relevant_topics(scores: &HashMap<String, f64>, score_threshold: f64) -> Vec<String> {
        scores
            .iter()
            .filter(|(_, &v)| v >= score_threshold)
            .map(|(t, _)| t.clone())
            .collect()
    }
}

/// Raw row shape for `sqlx::query_as`, since `scores` is stored as JSON and
/// `status` round-trips through its string representation.
#[derive(Debug, sqlx::FromRow)]
pub struct EpisodeRow {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub episode_guid: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub content_url: Option<String>,
    pub duration_seconds: Option<i64>,
    pub description: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_word_count: Option<i32>,
    pub transcript_acquired_at: Option<DateTime<Utc>>,
    pub scores: Option<sqlx::types::Json<HashMap<String, f64>>>,
    pub scored_at: Option<DateTime<Utc>>,
    pub status: String,
    pub failure_count: i32,
    pub last_failure_reason: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<EpisodeRow> for Episode {
    fn from(row: EpisodeRow) -> Self {
        let status = match row.status.as_str() {
            "pending" => EpisodeStatus::Pending,
            "processing" => EpisodeStatus::Processing,
            "transcribed" => EpisodeStatus::Transcribed,
            "scored" => EpisodeStatus::Scored,
            "not_relevant" => EpisodeStatus::NotRelevant,
            "digested" => EpisodeStatus::Digested,
            _ => EpisodeStatus::Failed,
        };
        Episode {
            id: row.id,
            feed_id: row.feed_id,
            episode_guid: row.episode_guid,
            title: row.title,
            published_at: row.published_at,
            content_url: row.content_url,
            duration_seconds: row.duration_seconds,
            description: row.description,
            transcript_text: row.transcript_text,
            transcript_word_count: row.transcript_word_count,
            transcript_acquired_at: row.transcript_acquired_at,
            scores: row.scores.map(|j| j.0),
            scored_at: row.scored_at,
            status,
            failure_count: row.failure_count,
            last_failure_reason: row.last_failure_reason,
            last_failure_at: row.last_failure_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_predicate_matches_threshold() {
        let mut scores = HashMap::new();
        scores.insert("AI and Technology".to_string(), 0.9);
        scores.insert("Politics".to_string(), 0.1);

        assert!(Episode::is_relevant(&scores, 0.6));
        assert_eq!(
            Episode::relevant_topics(&scores, 0.6),
            vec!["AI and Technology".to_string()]
        );
        assert!(!Episode::is_relevant(&scores, 0.95));
    }
}
