//! Dedup/consolidation pass (C8, §4.8).
//!
//! Standalone batch job over `EpisodeTopic` rows. Phase 1 groups by a fixed
//! keyword table; Phase 2 groups whatever Phase 1 missed by embedding
//! similarity. Both phases merge into the oldest member of each group and
//! delete the rest; both are idempotent.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::episode_topic::EpisodeTopic;
use crate::semantic_matcher::{MatchableItem, SemanticMatcher};

const KEY_POINTS_CAP: usize = 6;
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.80;

/// §4.8 keyword table: phrase -> functional-category identifier. First
/// matching category wins; matched case-insensitively as a substring
/// against the topic's name and key points.
const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    (
        "model_release",
        &["launches", "releases", "unveils", "announces model", "new model"],
    ),
    (
        "company_strategy",
        &["pivots", "restructures", "lays off", "acquisition", "acquires", "merger"],
    ),
    ("research", &["paper", "study finds", "researchers", "benchmark"]),
    ("regulation", &["regulation", "lawsuit", "ban", "policy", "legislation"]),
    (
        "product_launch",
        &["launches product", "ships", "general availability", "now available"],
    ),
    ("partnership", &["partners with", "collaboration", "teams up"]),
    ("controversy", &["backlash", "criticized", "controversy", "accused"]),
    ("industry_trend", &["trend", "industry shift", "adoption grows"]),
    ("technique", &["technique", "method", "approach", "algorithm"]),
    ("use_case", &["use case", "application", "deployed for"]),
];

#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    pub phase1_groups: usize,
    pub phase1_merged: usize,
    pub phase2_groups: usize,
    pub phase2_merged: usize,
    pub errors: Vec<String>,
}

pub struct DedupPass {
    pool: PgPool,
    matcher: Arc<SemanticMatcher>,
}

impl DedupPass {
    pub fn new(pool: PgPool, matcher: Arc<SemanticMatcher>) -> Self {
        Self { pool, matcher }
    }

    pub async fn run(
        &self,
        digest_topic: &str,
        days_back: i64,
        similarity_threshold: Option<f32>,
        dry_run: bool,
    ) -> Result<DedupReport> {
        let cutoff = Utc::now() - ChronoDuration::days(days_back);
        let mut topics = self.load_topics(digest_topic, cutoff).await?;

        let mut report = DedupReport::default();

        let (phase1_groups, remaining) = group_by_keyword(&topics);
        report.phase1_groups = phase1_groups.len();
        for group in &phase1_groups {
            match self.merge_group(group, dry_run).await {
                Ok(merged) => report.phase1_merged += merged,
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        topics = remaining;

        let threshold = similarity_threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        let items: Vec<MatchableItem> = topics.iter().map(to_matchable).collect();
        let phase2_groups = self.matcher.duplicate_groups(&items, threshold).await?;
        report.phase2_groups = phase2_groups.len();

        for group in &phase2_groups {
            let ids: Vec<Uuid> = group.iter().map(|m| m.id).collect();
            let members: Vec<&EpisodeTopic> = topics.iter().filter(|t| ids.contains(&t.id)).collect();
            match self.merge_topic_group(&members, dry_run).await {
                Ok(merged) => report.phase2_merged += merged,
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        Ok(report)
    }

    async fn load_topics(&self, digest_topic: &str, cutoff: DateTime<Utc>) -> Result<Vec<EpisodeTopic>> {
        let topics = sqlx::query_as::<_, EpisodeTopic>(
            "SELECT id, episode_id, topic_slug, topic_name, digest_topic, key_points, \
                    relevance_score, first_mentioned_at, last_mentioned_at, mention_count \
             FROM episode_topics \
             WHERE digest_topic = $1 AND first_mentioned_at >= $2",
        )
        .bind(digest_topic)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(topics)
    }

    /// Merges a keyword-matched group (already `&EpisodeTopic` owned
    /// groups produced by [`group_by_keyword`]).
    async fn merge_group(&self, group: &[EpisodeTopic], dry_run: bool) -> Result<usize> {
        let refs: Vec<&EpisodeTopic> = group.iter().collect();
        self.merge_topic_group(&refs, dry_run).await
    }

    /// Canonical = oldest by `first_mentioned_at`; its `key_points` absorb
    /// up to `6 - existing` unique points from the rest (case-insensitive
    /// equality); duplicates are deleted. Returns the number merged away.
    async fn merge_topic_group(&self, group: &[&EpisodeTopic], dry_run: bool) -> Result<usize> {
        if group.len() < 2 {
            return Ok(0);
        }

        let mut sorted = group.to_vec();
        sorted.sort_by_key(|t| t.first_mentioned_at);
        let canonical = sorted[0];
        let duplicates = &sorted[1..];

        let mut merged_points = canonical.key_points.0.clone();
        let mut seen_lower: Vec<String> = merged_points.iter().map(|p| p.to_lowercase()).collect();

        for dup in duplicates {
            for point in &dup.key_points.0 {
                if merged_points.len() >= KEY_POINTS_CAP {
                    break;
                }
                let lower = point.to_lowercase();
                if !seen_lower.contains(&lower) {
                    seen_lower.push(lower);
                    merged_points.push(point.clone());
                }
            }
        }
        merged_points.truncate(KEY_POINTS_CAP);

        if dry_run {
            return Ok(duplicates.len());
        }

        sqlx::query("UPDATE episode_topics SET key_points = $1 WHERE id = $2")
            .bind(sqlx::types::Json(&merged_points))
            .bind(canonical.id)
            .execute(&self.pool)
            .await?;

        for dup in duplicates {
            sqlx::query("DELETE FROM episode_topics WHERE id = $1")
                .bind(dup.id)
                .execute(&self.pool)
                .await?;
        }

        Ok(duplicates.len())
    }
}

fn to_matchable(topic: &EpisodeTopic) -> MatchableItem {
    MatchableItem {
        id: topic.id,
        name: topic.topic_name.clone(),
        key_points: topic.key_points.0.clone(),
        digest_topic: topic.digest_topic.clone(),
        first_mentioned_at: topic.first_mentioned_at,
        mention_count: topic.mention_count,
    }
}

/// Phase 1: groups topics whose name or key points match the same
/// keyword-table category (first match wins). Returns the matched groups
/// plus the topics left over for Phase 2.
fn group_by_keyword(topics: &[EpisodeTopic]) -> (Vec<Vec<EpisodeTopic>>, Vec<EpisodeTopic>) {
    let mut buckets: std::collections::HashMap<&'static str, Vec<EpisodeTopic>> =
        std::collections::HashMap::new();
    let mut unmatched = Vec::new();

    for topic in topics {
        match classify(topic) {
            Some(category) => buckets.entry(category).or_default().push(topic.clone()),
            None => unmatched.push(topic.clone()),
        }
    }

    let mut groups = Vec::new();
    for (_, bucket) in buckets {
        if bucket.len() >= 2 {
            groups.push(bucket);
        } else {
            unmatched.extend(bucket);
        }
    }

    (groups, unmatched)
}

fn classify(topic: &EpisodeTopic) -> Option<&'static str> {
    let haystack = format!(
        "{} {}",
        topic.topic_name.to_lowercase(),
        topic.key_points.0.join(" ").to_lowercase()
    );

    for (category, phrases) in KEYWORD_TABLE {
        if phrases.iter().any(|p| haystack.contains(p)) {
            return Some(category);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn topic(id: Uuid, name: &str, points: Vec<&str>, first_at_offset_secs: i64) -> EpisodeTopic {
        EpisodeTopic {
            id,
            episode_id: Uuid::new_v4(),
            topic_slug: name.to_lowercase().replace(' ', "-"),
            topic_name: name.to_string(),
            digest_topic: "AI and Technology".to_string(),
            key_points: sqlx::types::Json(points.into_iter().map(String::from).collect()),
            relevance_score: 0.9,
            first_mentioned_at: Utc::now() - ChronoDuration::seconds(first_at_offset_secs),
            last_mentioned_at: Utc::now(),
            mention_count: 1,
        }
    }

    #[test]
    fn classifies_by_keyword_table() {
        let t = topic(Uuid::new_v4(), "OpenAI launches new model", vec![], 0);
        assert_eq!(classify(&t), Some("model_release"));

        let t2 = topic(Uuid::new_v4(), "Some unrelated chatter", vec![], 0);
        assert_eq!(classify(&t2), None);
    }

    #[test]
    fn groups_keyword_matches_of_size_two_or_more() {
        let topics = vec![
            topic(Uuid::new_v4(), "Acme launches new model", vec![], 100),
            topic(Uuid::new_v4(), "Acme unveils model update", vec![], 50),
            topic(Uuid::new_v4(), "Totally different topic", vec![], 0),
        ];
        let (groups, unmatched) = group_by_keyword(&topics);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(unmatched.len(), 1);
    }
}
