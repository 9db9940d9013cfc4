//! Pipeline run log (C11, §4.11).

use chrono::Utc;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::pipeline_run::{RunConclusion, RunStatus};

pub struct PipelineRunLog {
    pool: PgPool,
}

impl PipelineRunLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert by `run_id`. `phase` is written verbatim and must not be
    /// interpreted by callers (§4.11).
    pub async fn upsert(
        &self,
        run_id: &str,
        workflow_name: &str,
        trigger: &str,
        status: RunStatus,
        conclusion: Option<RunConclusion>,
        phase: serde_json::Value,
        notes: Option<&str>,
    ) -> Result<()> {
        let is_terminal = matches!(status, RunStatus::Completed | RunStatus::Failed);
        let finished_at = is_terminal.then(Utc::now);

        sqlx::query(
            "INSERT INTO pipeline_runs \
             (run_id, workflow_name, trigger, status, conclusion, started_at, finished_at, phase, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (run_id) DO UPDATE SET \
                status = EXCLUDED.status, \
                conclusion = COALESCE(EXCLUDED.conclusion, pipeline_runs.conclusion), \
                finished_at = COALESCE(EXCLUDED.finished_at, pipeline_runs.finished_at), \
                phase = EXCLUDED.phase, \
                notes = COALESCE(EXCLUDED.notes, pipeline_runs.notes)",
        )
        .bind(run_id)
        .bind(workflow_name)
        .bind(trigger)
        .bind(status.as_str())
        .bind(conclusion.map(|c| c.as_str()))
        .bind(Utc::now())
        .bind(finished_at)
        .bind(phase)
        .bind(notes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
