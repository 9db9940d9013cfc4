//! Application error taxonomy (§7 of the spec).
//!
//! Workers never propagate [`PipelineError`] to the orchestrator — they
//! return a [`crate::orchestrator::WorkerOutcome`] instead. Only
//! configuration-level and DB-connection-level errors escape to the process
//! boundary, where `main` maps them to exit codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("transient external error calling {service}: {message}")]
    TransientExternal { service: String, message: String },

    #[error("permanent external error calling {service}: {message}")]
    PermanentExternal { service: String, message: String },

    #[error("LLM schema/parse failure: {0}")]
    LlmSchemaFailure(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Classifies whether the error kind (§7) is worth retrying at the
    /// component level (C2/C3) or should be surfaced as a permanent failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::TransientExternal { .. })
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
