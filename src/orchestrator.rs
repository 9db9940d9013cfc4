//! Pipeline orchestrator (C9, §4.9) — the "smart backfill" loop.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::arc_store::{ArcStore, NewArcEvent};
use crate::error::Result;
use crate::feed_reader::FeedReader;
use crate::llm::arc_extractor::{ArcExtractor, MAX_ARCS_IN_VIEW, MAX_EVENTS_PER_ARC_CONTEXT};
use crate::llm::relevance_scorer::RelevanceScorer;
use crate::llm::OpenAiClient;
use crate::models::episode::{Episode, EpisodeRow, EpisodeStatus};
use crate::models::feed::Feed;
use crate::models::topic::Topic;
use crate::semantic_matcher::SemanticMatcher;
use crate::settings::SettingsStore;
use crate::transcript::TranscriptSource;

const STUCK_SWEEP_INTERVAL: usize = 5;
const CANCEL_GRACE_PERIOD_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Relevant,
    NotRelevant,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    pub relevant: usize,
    pub not_relevant: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rounds: usize,
}

impl BackfillSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct Orchestrator {
    pool: PgPool,
    settings: Arc<SettingsStore>,
    transcript_sources: Vec<Arc<dyn TranscriptSource>>,
    openai: Arc<OpenAiClient>,
    semantic_matcher: Arc<SemanticMatcher>,
    feed_reader: FeedReader,
    max_workers: usize,
    dual_write_episode_topics: bool,
}

impl Orchestrator {
    pub fn new(
        pool: PgPool,
        settings: Arc<SettingsStore>,
        transcript_sources: Vec<Arc<dyn TranscriptSource>>,
        openai: Arc<OpenAiClient>,
        semantic_matcher: Arc<SemanticMatcher>,
        max_workers: usize,
        dual_write_episode_topics: bool,
    ) -> Self {
        Self {
            pool,
            settings,
            transcript_sources,
            openai,
            semantic_matcher,
            feed_reader: FeedReader::new(reqwest::Client::new()),
            max_workers,
            dual_write_episode_topics,
        }
    }

    /// §4.2/§4.9 discovery step: reads every active feed (or just
    /// `feed_filter` if given), inserting new episode rows as `pending`.
    /// Discovery order within a feed is newest-first; at most one new
    /// episode per feed is inserted per round (legacy per-feed daily cap).
    /// Existing `(feed_id, episode_guid)` pairs are left untouched.
    pub async fn discover(&self, feed_filter: Option<Uuid>) -> Result<usize> {
        let lookback_days: i64 = self
            .settings
            .get("pipeline", "discovery_lookback_days", 5)
            .await;

        let feeds = self.load_active_feeds(feed_filter).await?;
        let mut inserted = 0usize;

        for feed in feeds {
            let mut descriptors = match self.feed_reader.read(&feed.source_url, lookback_days).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(feed_id = %feed.id, error = %e, "feed discovery failed, skipping feed");
                    continue;
                }
            };
            descriptors.sort_by(|a, b| b.published_at.cmp(&a.published_at));

            for descriptor in descriptors.into_iter().take(1) {
                match self.insert_episode_if_new(feed.id, &descriptor).await {
                    Ok(true) => inserted += 1,
                    Ok(false) => {}
                    Err(e) => warn!(feed_id = %feed.id, error = %e, "failed to persist discovered episode"),
                }
            }
        }

        Ok(inserted)
    }

    async fn load_active_feeds(&self, feed_filter: Option<Uuid>) -> Result<Vec<Feed>> {
        let feeds = match feed_filter {
            Some(id) => {
                sqlx::query_as::<_, Feed>(
                    "SELECT id, source_url, display_title, is_active, created_at FROM feeds \
                     WHERE id = $1 AND is_active = true",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Feed>(
                    "SELECT id, source_url, display_title, is_active, created_at FROM feeds \
                     WHERE is_active = true",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(feeds)
    }

    async fn insert_episode_if_new(
        &self,
        feed_id: Uuid,
        descriptor: &crate::models::feed::EpisodeDescriptor,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO episodes \
             (id, feed_id, episode_guid, title, published_at, content_url, duration_seconds, \
              description, status, failure_count, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 0, now()) \
             ON CONFLICT (feed_id, episode_guid) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(feed_id)
        .bind(&descriptor.episode_guid)
        .bind(&descriptor.title)
        .bind(descriptor.published_at)
        .bind(&descriptor.content_url)
        .bind(descriptor.duration_seconds)
        .bind(&descriptor.description)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Runs the backfill loop to completion or cancellation. `cancel`
    /// receiving `true` tells the loop to stop dispatching new batches and
    /// wait for in-flight workers with a bounded grace period (§4.9, §5).
    /// `limit_override` overrides `pipeline.max_episodes_per_run` for this
    /// invocation (`--limit`, §6). `dry_run` computes the plan (target count,
    /// pending queue size) without claiming or mutating any row.
    pub async fn run_backfill(
        &self,
        mut cancel: watch::Receiver<bool>,
        limit_override: Option<i64>,
        feed_filter: Option<Uuid>,
        sequential: bool,
        dry_run: bool,
    ) -> Result<BackfillSummary> {
        let target: i64 = match limit_override {
            Some(n) => n,
            None => self
                .settings
                .get_required_int("pipeline", "max_episodes_per_run")
                .await
                .unwrap_or(0),
        };

        if dry_run {
            let pending: i64 = self.count_pending(feed_filter).await?;
            info!(target, pending, "dry run: plan computed, no state changes made");
            return Ok(BackfillSummary::default());
        }

        self.reset_stuck_processing().await?;

        if self.daily_cap_reached().await? {
            info!("daily transcript cap already reached, exiting with no work");
            return Ok(BackfillSummary::default());
        }

        let mut summary = BackfillSummary::default();
        let mut processed_since_sweep = 0usize;
        let mut round = 1usize;

        loop {
            if summary.relevant as i64 >= target {
                break;
            }
            if *cancel.borrow() {
                info!("cancellation received, stopping batch dispatch");
                break;
            }

            let remaining = target - summary.relevant as i64;
            let batch_size = (self.max_workers as i64).min(remaining).max(0) as i64;
            if batch_size == 0 {
                break;
            }

            let batch = self.claim_next_batch(batch_size, feed_filter).await?;
            if batch.is_empty() {
                break;
            }

            summary.rounds = round;
            info!(round, batch_size = batch.len(), "dispatching batch");

            let outcomes = if sequential {
                self.run_batch_sequential(&batch).await
            } else {
                self.run_batch(&batch, &mut cancel).await
            };
            for outcome in outcomes {
                match outcome {
                    WorkerOutcome::Relevant => summary.relevant += 1,
                    WorkerOutcome::NotRelevant => summary.not_relevant += 1,
                    WorkerOutcome::Failed => summary.failed += 1,
                    WorkerOutcome::Skipped => summary.skipped += 1,
                }
            }

            processed_since_sweep += batch.len();
            if processed_since_sweep >= STUCK_SWEEP_INTERVAL {
                self.reset_stuck_processing().await?;
                processed_since_sweep = 0;
            }

            round += 1;
        }

        if *cancel.borrow() {
            tokio::time::sleep(tokio::time::Duration::from_secs(CANCEL_GRACE_PERIOD_SECS)).await;
        }

        Ok(summary)
    }

    async fn run_batch(&self, episode_ids: &[Uuid], cancel: &mut watch::Receiver<bool>) -> Vec<WorkerOutcome> {
        let _ = cancel;
        let futures = episode_ids.iter().map(|id| self.process_one(*id));
        join_all(futures).await
    }

    /// `--no-parallel` (§6): process the batch one episode at a time,
    /// useful for debugging worker failures in isolation.
    async fn run_batch_sequential(&self, episode_ids: &[Uuid]) -> Vec<WorkerOutcome> {
        let mut outcomes = Vec::with_capacity(episode_ids.len());
        for id in episode_ids {
            outcomes.push(self.process_one(*id).await);
        }
        outcomes
    }

    /// §5: per-episode worker. Uses `&self` shared resources only for the
    /// settings store and the semantic matcher's cache, both documented as
    /// safe for concurrent access; the transcript sources are themselves
    /// responsible for their own per-call isolation.
    async fn process_one(&self, episode_id: Uuid) -> WorkerOutcome {
        match self.process_one_inner(episode_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(episode_id = %episode_id, error = %e, "worker failed");
                WorkerOutcome::Failed
            }
        }
    }

    async fn process_one_inner(&self, episode_id: Uuid) -> Result<WorkerOutcome> {
        // Step 1-2: re-check claim, atomically mark processing. The claim
        // itself already happened in `claim_next_batch`'s CAS update; here
        // we just reload to confirm it stuck.
        let episode = match self.load_episode(episode_id).await? {
            Some(e) if e.status == EpisodeStatus::Processing => e,
            _ => return Ok(WorkerOutcome::Skipped),
        };

        // Step 3: transcript acquisition.
        let content_url = match &episode.content_url {
            Some(url) => url.clone(),
            None => {
                self.set_status(episode_id, EpisodeStatus::NotRelevant, None).await?;
                return Ok(WorkerOutcome::NotRelevant);
            }
        };

        let mut transcript_outcome = None;
        for source in &self.transcript_sources {
            match source.fetch(&content_url, &episode.episode_guid).await {
                Ok(crate::transcript::TranscriptOutcome::Ok { text, word_count, .. }) => {
                    transcript_outcome = Some((text, word_count));
                    break;
                }
                Ok(crate::transcript::TranscriptOutcome::NotAvailable { .. }) => continue,
                Ok(crate::transcript::TranscriptOutcome::Transient { reason }) => {
                    self.revert_to_pending(episode_id, &reason).await?;
                    return Ok(WorkerOutcome::Failed);
                }
                Err(_) => continue,
            }
        }

        let (transcript_text, word_count) = match transcript_outcome {
            Some(t) => t,
            None => {
                self.set_status(episode_id, EpisodeStatus::NotRelevant, None).await?;
                return Ok(WorkerOutcome::NotRelevant);
            }
        };

        self.persist_transcript(episode_id, &transcript_text, word_count).await?;

        // Step 4: relevance scoring.
        let topics = self.load_topics().await?;
        let scorer = RelevanceScorer::new(&self.openai, "gpt-4o-mini");
        let score_outcome = match scorer.score(&transcript_text, &topics).await {
            Ok(o) => o,
            Err(_) => {
                self.set_status(episode_id, EpisodeStatus::Transcribed, None).await?;
                return Ok(WorkerOutcome::Failed);
            }
        };

        let score_threshold: f64 = self
            .settings
            .get("content_filtering", "score_threshold", 0.6)
            .await;
        let is_relevant = Episode::is_relevant(&score_outcome.scores, score_threshold);

        self.persist_scores(episode_id, &score_outcome.scores, is_relevant).await?;

        if !is_relevant {
            return Ok(WorkerOutcome::NotRelevant);
        }

        // Step 6: arc extraction for each sufficiently-scored, tracked topic.
        let relevant_topics = Episode::relevant_topics(&score_outcome.scores, score_threshold);
        for topic_name in relevant_topics {
            let Some(topic) = topics.iter().find(|t| t.display_name == topic_name) else {
                continue;
            };

            if self.dual_write_episode_topics {
                let score = *score_outcome.scores.get(&topic_name).unwrap_or(&0.0);
                if let Err(e) = self.upsert_episode_topic(&episode, topic, score).await {
                    warn!(episode_id = %episode_id, topic = %topic_name, error = %e, "episode_topics dual-write failed");
                }
            }

            if !topic.enable_topic_tracking {
                continue;
            }
            if let Err(e) = self.extract_and_apply_arcs(&episode, &transcript_text, &topic.display_name).await {
                warn!(episode_id = %episode_id, topic = %topic_name, error = %e, "arc extraction failed");
            }
        }

        Ok(WorkerOutcome::Relevant)
    }

    /// §3 backwards-compat shim: mirrors a relevant topic hit into the
    /// legacy `episode_topics` table the new story-arc path no longer reads
    /// from on its own. Gated by `dual_write_episode_topics` (default off).
    async fn upsert_episode_topic(&self, episode: &Episode, topic: &Topic, relevance_score: f64) -> Result<()> {
        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM episode_topics WHERE episode_id = $1 AND topic_slug = $2",
        )
        .bind(episode.id)
        .bind(&topic.slug)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = existing {
            sqlx::query(
                "UPDATE episode_topics SET mention_count = mention_count + 1, last_mentioned_at = $2 \
                 WHERE id = $1",
            )
            .bind(id)
            .bind(episode.published_at)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO episode_topics \
                 (id, episode_id, topic_slug, topic_name, digest_topic, key_points, relevance_score, \
                  first_mentioned_at, last_mentioned_at, mention_count) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, 1)",
            )
            .bind(Uuid::new_v4())
            .bind(episode.id)
            .bind(&topic.slug)
            .bind(&topic.display_name)
            .bind(&topic.display_name)
            .bind(sqlx::types::Json::<Vec<String>>(Vec::new()))
            .bind(relevance_score)
            .bind(episode.published_at)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn extract_and_apply_arcs(
        &self,
        episode: &Episode,
        transcript_text: &str,
        digest_topic: &str,
    ) -> Result<()> {
        let arc_store = ArcStore::new(self.pool.clone());
        let retention_days: i64 = self.settings.get("story_arcs", "retention_days", 14).await;
        let max_events: i64 = self.settings.get("story_arcs", "max_events_per_arc", 20).await;

        let active_arcs = arc_store.active_arcs(digest_topic, retention_days).await?;
        let view = ArcStore::render_active_arcs_view(&active_arcs, MAX_ARCS_IN_VIEW, MAX_EVENTS_PER_ARC_CONTEXT);
        let existing_slugs: Vec<String> = active_arcs.iter().map(|a| a.arc_slug.clone()).collect();

        let max_arcs_per_episode: i64 = self
            .settings
            .get("topic_tracking", "max_topics_per_episode", 10)
            .await;

        let mut episode_with_transcript = episode.clone();
        episode_with_transcript.transcript_text = Some(transcript_text.to_string());

        let extractor = ArcExtractor::new(&self.openai, "gpt-4o-mini", max_arcs_per_episode as usize);
        let resolved = extractor
            .extract(&episode_with_transcript, digest_topic, &view, &existing_slugs)
            .await?;

        for entry in resolved {
            let event = NewArcEvent {
                event_date: episode.published_at,
                event_summary: entry.event_summary,
                key_points: entry.key_points,
                source_feed_id: episode.feed_id,
                source_episode_id: episode.id,
                source_episode_guid: episode.episode_guid.clone(),
                source_display_name: episode.title.clone(),
                perspective: entry.perspective,
                relevance_score: *episode.scores.as_ref().and_then(|s| s.get(digest_topic)).unwrap_or(&0.0),
            };

            if entry.is_new {
                arc_store
                    .get_or_create_arc(&entry.arc_name, digest_topic, entry.category, Some(event), max_events)
                    .await?;
            } else {
                let arc = active_arcs.iter().find(|a| a.arc_slug == entry.arc_slug);
                if let Some(arc) = arc {
                    arc_store.add_event(arc.id, event, max_events).await?;
                } else {
                    arc_store
                        .get_or_create_arc(&entry.arc_name, digest_topic, entry.category, Some(event), max_events)
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// §4.9 precondition: any `processing` episode whose `updated_at` is
    /// older than the configured stuck timeout reverts to `pending`.
    async fn reset_stuck_processing(&self) -> Result<()> {
        let timeout_minutes: i64 = self
            .settings
            .get("pipeline", "stuck_processing_timeout_minutes", 10)
            .await;
        let cutoff = Utc::now() - ChronoDuration::minutes(timeout_minutes);

        let result = sqlx::query(
            "UPDATE episodes SET status = 'pending', updated_at = now() \
             WHERE status = 'processing' AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(count = result.rows_affected(), "reset stuck processing episodes");
        }
        Ok(())
    }

    async fn daily_cap_reached(&self) -> Result<bool> {
        let cap: i64 = self
            .settings
            .get("youtube", "max_transcripts_per_day", 7)
            .await;

        let day_start: DateTime<Utc> = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM episodes \
             WHERE status IN ('transcribed', 'scored', 'not_relevant', 'digested') \
             AND transcript_acquired_at >= $1",
        )
        .bind(day_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(count >= cap)
    }

    /// §5: atomic CAS claim — succeeds only if the row is still `pending`.
    /// `feed_filter` restricts the candidate pool to one feed (`--feed-id`).
    async fn claim_next_batch(&self, limit: i64, feed_filter: Option<Uuid>) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = match feed_filter {
            Some(feed_id) => {
                sqlx::query_as(
                    "WITH candidates AS ( \
                        SELECT id FROM episodes WHERE status = 'pending' AND feed_id = $2 \
                        ORDER BY published_at ASC LIMIT $1 \
                        FOR UPDATE SKIP LOCKED \
                     ) \
                     UPDATE episodes SET status = 'processing', updated_at = now() \
                     WHERE id IN (SELECT id FROM candidates) \
                     RETURNING id",
                )
                .bind(limit)
                .bind(feed_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "WITH candidates AS ( \
                        SELECT id FROM episodes WHERE status = 'pending' \
                        ORDER BY published_at ASC LIMIT $1 \
                        FOR UPDATE SKIP LOCKED \
                     ) \
                     UPDATE episodes SET status = 'processing', updated_at = now() \
                     WHERE id IN (SELECT id FROM candidates) \
                     RETURNING id",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn count_pending(&self, feed_filter: Option<Uuid>) -> Result<i64> {
        let count: i64 = match feed_filter {
            Some(feed_id) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM episodes WHERE status = 'pending' AND feed_id = $1",
                )
                .bind(feed_id)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM episodes WHERE status = 'pending'")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    async fn load_episode(&self, id: Uuid) -> Result<Option<Episode>> {
        let row = sqlx::query_as::<_, EpisodeRow>(
            "SELECT id, feed_id, episode_guid, title, published_at, content_url, \
                    duration_seconds, description, transcript_text, transcript_word_count, \
                    transcript_acquired_at, scores, scored_at, status, failure_count, \
                    last_failure_reason, last_failure_at, updated_at \
             FROM episodes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Episode::from))
    }

    async fn load_topics(&self) -> Result<Vec<Topic>> {
        let topics = sqlx::query_as::<_, Topic>(
            "SELECT id, slug, display_name, description, is_active, enable_topic_tracking, sort_order \
             FROM topics WHERE is_active = true ORDER BY sort_order ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(topics)
    }

    async fn set_status(&self, id: Uuid, status: EpisodeStatus, reason: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE episodes SET status = $1, last_failure_reason = $2, updated_at = now() WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revert_to_pending(&self, id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE episodes SET status = 'pending', last_failure_reason = $1, \
             failure_count = failure_count + 1, updated_at = now() WHERE id = $2",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn persist_transcript(&self, id: Uuid, text: &str, word_count: i32) -> Result<()> {
        sqlx::query(
            "UPDATE episodes SET transcript_text = $1, transcript_word_count = $2, \
             transcript_acquired_at = now(), status = 'transcribed', updated_at = now() \
             WHERE id = $3",
        )
        .bind(text)
        .bind(word_count)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn persist_scores(
        &self,
        id: Uuid,
        scores: &std::collections::HashMap<String, f64>,
        is_relevant: bool,
    ) -> Result<()> {
        let status = if is_relevant { EpisodeStatus::Scored } else { EpisodeStatus::NotRelevant };
        sqlx::query(
            "UPDATE episodes SET scores = $1, scored_at = now(), status = $2, updated_at = now() \
             WHERE id = $3",
        )
        .bind(sqlx::types::Json(scores))
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_success_requires_zero_failures() {
        let mut summary = BackfillSummary::default();
        assert!(summary.is_success());
        summary.failed = 1;
        assert!(!summary.is_success());
    }
}
