use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// §3: PipelineRun status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// §3: PipelineRun conclusion, set only when status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
}

impl RunConclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunConclusion::Success => "success",
            RunConclusion::Failure => "failure",
            RunConclusion::Cancelled => "cancelled",
        }
    }
}

/// §3: PipelineRun — append-only record of each scheduled run (C11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub workflow_name: String,
    pub trigger: String,
    pub status: RunStatus,
    pub conclusion: Option<RunConclusion>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Opaque JSON blob; consumers must not rely on its shape (§4.11).
    pub phase: serde_json::Value,
    pub notes: Option<String>,
}
