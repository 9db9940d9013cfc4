//! Arc store (C6, §4.6).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::story_arc::{normalize_arc_slug, FunctionalCategory, Perspective, StoryArc, StoryArcEvent};

pub struct NewArcEvent {
    pub event_date: DateTime<Utc>,
    pub event_summary: String,
    pub key_points: Vec<String>,
    pub source_feed_id: Uuid,
    pub source_episode_id: Uuid,
    pub source_episode_guid: String,
    pub source_display_name: String,
    pub perspective: Perspective,
    pub relevance_score: f64,
}

pub struct ArcStore {
    pool: PgPool,
}

impl ArcStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// §4.6: returns the existing arc for `(slug, digest_topic)` without
    /// touching `category`, or creates one.
    pub async fn get_or_create_arc(
        &self,
        arc_name: &str,
        digest_topic: &str,
        category: FunctionalCategory,
        initial_event: Option<NewArcEvent>,
        max_events_per_arc: i64,
    ) -> Result<Uuid> {
        let slug = normalize_arc_slug(arc_name);
        let now = Utc::now();

        if let Some(row) = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM story_arcs WHERE arc_slug = $1 AND digest_topic = $2",
        )
        .bind(&slug)
        .bind(digest_topic)
        .fetch_optional(&self.pool)
        .await?
        {
            if let Some(event) = initial_event {
                self.add_event(row, event, max_events_per_arc).await?;
            }
            return Ok(row);
        }

        let arc_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO story_arcs \
             (id, arc_name, arc_slug, functional_category, digest_topic, started_at, \
              last_updated_at, event_count, source_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $6, 0, 0)",
        )
        .bind(arc_id)
        .bind(arc_name)
        .bind(&slug)
        .bind(category.as_str())
        .bind(digest_topic)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if let Some(event) = initial_event {
            self.add_event(arc_id, event, max_events_per_arc).await?;
        }

        Ok(arc_id)
    }

    /// §4.6: appends the event, recomputes counts, then prunes the oldest
    /// event (ties broken by smallest id) while over `max_events_per_arc`.
    pub async fn add_event(
        &self,
        arc_id: Uuid,
        event: NewArcEvent,
        max_events_per_arc: i64,
    ) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        let event_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO story_arc_events \
             (id, arc_id, event_date, event_summary, key_points, source_feed_id, \
              source_episode_id, source_episode_guid, source_display_name, perspective, \
              relevance_score, extracted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(event_id)
        .bind(arc_id)
        .bind(event.event_date)
        .bind(&event.event_summary)
        .bind(sqlx::types::Json(&event.key_points))
        .bind(event.source_feed_id)
        .bind(event.source_episode_id)
        .bind(&event.source_episode_guid)
        .bind(&event.source_display_name)
        .bind(event.perspective.as_str())
        .bind(event.relevance_score)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let event_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM story_arc_events WHERE arc_id = $1")
                .bind(arc_id)
                .fetch_one(&mut *tx)
                .await?;
        let source_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT source_feed_id) FROM story_arc_events WHERE arc_id = $1",
        )
        .bind(arc_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE story_arcs SET event_count = $1, source_count = $2, last_updated_at = $3 \
             WHERE id = $4",
        )
        .bind(event_count as i32)
        .bind(source_count as i32)
        .bind(event.event_date)
        .bind(arc_id)
        .execute(&mut *tx)
        .await?;

        let mut remaining = event_count;
        while remaining > max_events_per_arc {
            sqlx::query(
                "DELETE FROM story_arc_events WHERE id = ( \
                    SELECT id FROM story_arc_events WHERE arc_id = $1 \
                    ORDER BY event_date ASC, id ASC LIMIT 1 \
                 )",
            )
            .bind(arc_id)
            .execute(&mut *tx)
            .await?;
            remaining -= 1;
        }

        if remaining != event_count {
            sqlx::query("UPDATE story_arcs SET event_count = $1 WHERE id = $2")
                .bind(remaining as i32)
                .bind(arc_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(event_id)
    }

    /// §4.6: arcs whose `last_updated_at >= now - retention_days`, newest
    /// first, with events eagerly loaded.
    pub async fn active_arcs(&self, digest_topic: &str, retention_days: i64) -> Result<Vec<StoryArc>> {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days);

        let arc_rows = sqlx::query_as::<_, ArcRow>(
            "SELECT id, arc_name, arc_slug, functional_category, digest_topic, started_at, \
                    last_updated_at, event_count, source_count, included_in_digest_id, included_at \
             FROM story_arcs \
             WHERE digest_topic = $1 AND last_updated_at >= $2 \
             ORDER BY last_updated_at DESC",
        )
        .bind(digest_topic)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut arcs = Vec::with_capacity(arc_rows.len());
        for row in arc_rows {
            let events = self.load_events(row.id).await?;
            arcs.push(row.into_arc(events));
        }
        Ok(arcs)
    }

    /// §4.6: active arcs with `event_count >= min_events`, optionally
    /// excluding already-included ones, sorted by `(event_count desc,
    /// source_count desc)`.
    pub async fn arcs_for_digest(
        &self,
        digest_topic: &str,
        min_events: i32,
        exclude_included: bool,
    ) -> Result<Vec<StoryArc>> {
        let query = if exclude_included {
            "SELECT id, arc_name, arc_slug, functional_category, digest_topic, started_at, \
                    last_updated_at, event_count, source_count, included_in_digest_id, included_at \
             FROM story_arcs \
             WHERE digest_topic = $1 AND event_count >= $2 AND included_in_digest_id IS NULL \
             ORDER BY event_count DESC, source_count DESC"
        } else {
            "SELECT id, arc_name, arc_slug, functional_category, digest_topic, started_at, \
                    last_updated_at, event_count, source_count, included_in_digest_id, included_at \
             FROM story_arcs \
             WHERE digest_topic = $1 AND event_count >= $2 \
             ORDER BY event_count DESC, source_count DESC"
        };

        let arc_rows = sqlx::query_as::<_, ArcRow>(query)
            .bind(digest_topic)
            .bind(min_events)
            .fetch_all(&self.pool)
            .await?;

        let mut arcs = Vec::with_capacity(arc_rows.len());
        for row in arc_rows {
            let events = self.load_events(row.id).await?;
            arcs.push(row.into_arc(events));
        }
        Ok(arcs)
    }

    pub async fn mark_included(&self, arc_id: Uuid, digest_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE story_arcs SET included_in_digest_id = $1, included_at = $2 WHERE id = $3")
            .bind(digest_id)
            .bind(Utc::now())
            .bind(arc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn cleanup_old(&self, retention_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days);
        let result = sqlx::query("DELETE FROM story_arcs WHERE last_updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn load_events(&self, arc_id: Uuid) -> Result<Vec<StoryArcEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT id, arc_id, event_date, event_summary, key_points, source_feed_id, \
                    source_episode_id, source_episode_guid, source_display_name, perspective, \
                    relevance_score, extracted_at \
             FROM story_arc_events WHERE arc_id = $1 ORDER BY event_date DESC",
        )
        .bind(arc_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EventRow::into_event).collect())
    }

    /// Renders up to `max_arcs` arcs for the extractor prompt (§4.6), each
    /// with category, dates, source count, and its most recent
    /// `max_events_per_arc_context` events.
    pub fn render_active_arcs_view(
        arcs: &[StoryArc],
        max_arcs: usize,
        max_events_per_arc_context: usize,
    ) -> String {
        arcs.iter()
            .take(max_arcs)
            .map(|arc| {
                let events_block = arc
                    .events
                    .iter()
                    .take(max_events_per_arc_context)
                    .map(|e| format!("  - {}: {}", e.event_date.date_naive(), e.event_summary))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "Arc: {} [{}]\n  started: {} | last updated: {} | sources: {}\n{}",
                    arc.arc_name,
                    arc.functional_category.as_str(),
                    arc.started_at.date_naive(),
                    arc.last_updated_at.date_naive(),
                    arc.source_count,
                    events_block
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(sqlx::FromRow)]
struct ArcRow {
    id: Uuid,
    arc_name: String,
    arc_slug: String,
    functional_category: String,
    digest_topic: String,
    started_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
    event_count: i32,
    source_count: i32,
    included_in_digest_id: Option<Uuid>,
    included_at: Option<DateTime<Utc>>,
}

impl ArcRow {
    fn into_arc(self, events: Vec<StoryArcEvent>) -> StoryArc {
        StoryArc {
            id: self.id,
            arc_name: self.arc_name,
            arc_slug: self.arc_slug,
            functional_category: FunctionalCategory::from_str_loose(&self.functional_category),
            digest_topic: self.digest_topic,
            started_at: self.started_at,
            last_updated_at: self.last_updated_at,
            event_count: self.event_count,
            source_count: self.source_count,
            included_in_digest_id: self.included_in_digest_id,
            included_at: self.included_at,
            events,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    arc_id: Uuid,
    event_date: DateTime<Utc>,
    event_summary: String,
    key_points: sqlx::types::Json<Vec<String>>,
    source_feed_id: Uuid,
    source_episode_id: Uuid,
    source_episode_guid: String,
    source_display_name: String,
    perspective: String,
    relevance_score: f64,
    extracted_at: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> StoryArcEvent {
        StoryArcEvent {
            id: self.id,
            arc_id: self.arc_id,
            event_date: self.event_date,
            event_summary: self.event_summary,
            key_points: self.key_points.0,
            source_feed_id: self.source_feed_id,
            source_episode_id: self.source_episode_id,
            source_episode_guid: self.source_episode_guid,
            source_display_name: self.source_display_name,
            perspective: Perspective::from_str_loose(&self.perspective),
            relevance_score: self.relevance_score,
            extracted_at: self.extracted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_empty_view_for_no_arcs() {
        assert_eq!(ArcStore::render_active_arcs_view(&[], 15, 5), "");
    }
}
