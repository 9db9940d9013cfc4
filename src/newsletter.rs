//! Newsletter persistence and retention (C10, §4.10).
//!
//! Wraps [`crate::llm::newsletter_selector::NewsletterSelector`] with the
//! DB-facing half of the contract: candidate selection query, issue/example
//! persistence, and retention cleanup.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::newsletter_selector::{NewsletterSelector, SelectedIssue};
use crate::llm::OpenAiClient;
use crate::models::episode::{Episode, EpisodeRow};

const CANDIDATE_LIMIT: i64 = 20;
const KEEP_COUNT: i64 = 20;
const RELEVANCE_TOPIC: &str = "AI and Technology";
const RELEVANCE_FLOOR: f64 = 0.7;

pub struct NewsletterService<'a> {
    pool: PgPool,
    selector: NewsletterSelector<'a>,
}

impl<'a> NewsletterService<'a> {
    pub fn new(pool: PgPool, client: &'a OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            pool,
            selector: NewsletterSelector::new(client, model),
        }
    }

    pub async fn generate(&self, days: i64, dry_run: bool) -> Result<SelectedIssue> {
        let candidates = self.load_candidates(days).await?;
        let issue_date: NaiveDate = Utc::now().date_naive();
        let selected = self.selector.select(issue_date, &candidates).await?;

        if !dry_run {
            self.persist(&selected).await?;
            self.enforce_retention().await?;
        }

        Ok(selected)
    }

    /// §4.10: `status = scored`, `scores["AI and Technology"] >= 0.7`,
    /// scored within `days`, top 20 by score.
    async fn load_candidates(&self, days: i64) -> Result<Vec<Episode>> {
        let cutoff = Utc::now() - ChronoDuration::days(days);

        let rows = sqlx::query_as::<_, EpisodeRow>(
            "SELECT id, feed_id, episode_guid, title, published_at, content_url, \
                    duration_seconds, description, transcript_text, transcript_word_count, \
                    transcript_acquired_at, scores, scored_at, status, failure_count, \
                    last_failure_reason, last_failure_at, updated_at \
             FROM episodes \
             WHERE status = 'scored' \
               AND scored_at >= $1 \
               AND (scores ->> $2)::float8 >= $3 \
             ORDER BY (scores ->> $2)::float8 DESC \
             LIMIT $4",
        )
        .bind(cutoff)
        .bind(RELEVANCE_TOPIC)
        .bind(RELEVANCE_FLOOR)
        .bind(CANDIDATE_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Episode::from).collect())
    }

    async fn persist(&self, selected: &SelectedIssue) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO newsletter_issues (id, issue_date, subject_line, big_news_summary, generated_at, sent_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(selected.issue.id)
        .bind(selected.issue.issue_date)
        .bind(&selected.issue.subject_line)
        .bind(&selected.issue.big_news_summary)
        .bind(selected.issue.generated_at)
        .bind(selected.issue.sent_at)
        .execute(&mut *tx)
        .await?;

        for example in &selected.examples {
            sqlx::query(
                "INSERT INTO newsletter_examples \
                 (id, issue_id, position, title, description, how_to_replicate, \
                  source_episode_id, source_title, source_url) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(example.id)
            .bind(example.issue_id)
            .bind(example.position)
            .bind(&example.title)
            .bind(&example.description)
            .bind(&example.how_to_replicate)
            .bind(example.source_episode_id)
            .bind(&example.source_title)
            .bind(&example.source_url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// §4.10: keep the most recent `KEEP_COUNT` issues; cascade to examples
    /// and sweep orphaned survey responses.
    async fn enforce_retention(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let stale_ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM newsletter_issues \
             ORDER BY issue_date DESC, id DESC \
             OFFSET $1",
        )
        .bind(KEEP_COUNT)
        .fetch_all(&mut *tx)
        .await?;

        for (id,) in &stale_ids {
            sqlx::query("DELETE FROM newsletter_examples WHERE issue_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM newsletter_issues WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        // Nothing in this codebase writes survey responses yet; sweep
        // orphans best-effort, on its own connection, after the cascade
        // delete has already committed, so a failure here can't roll it back.
        let _ = sqlx::query(
            "DELETE FROM newsletter_survey_responses \
             WHERE issue_id NOT IN (SELECT id FROM newsletter_issues)",
        )
        .execute(&self.pool)
        .await;

        Ok(())
    }

    pub async fn mark_sent(&self, issue_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE newsletter_issues SET sent_at = now() WHERE id = $1")
            .bind(issue_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
