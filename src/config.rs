//! Process bootstrap configuration.
//!
//! Distinct from the runtime-tunable [`crate::settings::SettingsStore`]: this
//! module covers the environment variables required before anything else can
//! run (§6 of the spec). Missing or empty required variables are fatal at
//! process start.

use thiserror::Error;

/// Configuration errors. Any variant here maps to process exit code 2.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Process-level configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub openai_api_key: String,
    pub elevenlabs_api_key: String,
    pub github_token: String,
    pub github_repository: String,

    /// Default target count of relevant episodes per orchestrator run,
    /// overridable by `--limit` (§6 CLI surface).
    pub max_workers: usize,

    /// Open Question decision: whether the orchestrator also populates the
    /// legacy `EpisodeTopic` table alongside story arcs. Default false.
    pub dual_write_episode_topics: bool,
}

impl AppConfig {
    /// Load configuration from the environment, failing fast (exit code 2
    /// at the CLI boundary) if any required variable is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = resolve_database_url()?;
        let openai_api_key = require_env("OPENAI_API_KEY")?;
        let elevenlabs_api_key = require_env("ELEVENLABS_API_KEY")?;
        let github_token = require_env("GITHUB_TOKEN")?;
        let github_repository = require_env("GITHUB_REPOSITORY")?;

        if !github_repository.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "GITHUB_REPOSITORY".to_string(),
                message: "expected format owner/repo".to_string(),
            });
        }

        let max_workers = env_or_default("PIPELINE_MAX_WORKERS", 4usize);
        let dual_write_episode_topics =
            env_or_default("PIPELINE_DUAL_WRITE_EPISODE_TOPICS", false);

        Ok(Self {
            database_url,
            openai_api_key,
            elevenlabs_api_key,
            github_token,
            github_repository,
            max_workers,
            dual_write_episode_topics,
        })
    }
}

/// `DATABASE_URL` may be given directly (postgres/postgresql/
/// postgresql+psycopg/sqlite scheme) or synthesized from
/// `SUPABASE_URL` + `SUPABASE_PASSWORD` per §6.
fn resolve_database_url() -> Result<String, ConfigError> {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            return Ok(normalize_database_url(&url));
        }
    }

    let supabase_url = std::env::var("SUPABASE_URL").ok().filter(|s| !s.is_empty());
    let supabase_password = std::env::var("SUPABASE_PASSWORD")
        .ok()
        .filter(|s| !s.is_empty());

    if let (Some(supabase_url), Some(password)) = (supabase_url, supabase_password) {
        let host = supabase_host_from_url(&supabase_url)?;
        return Ok(format!(
            "postgresql://postgres:{password}@{host}:5432/postgres?sslmode=require"
        ));
    }

    Err(ConfigError::MissingRequired("DATABASE_URL".to_string()))
}

fn supabase_host_from_url(supabase_url: &str) -> Result<String, ConfigError> {
    let without_scheme = supabase_url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let project_ref = without_scheme
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "SUPABASE_URL".to_string(),
            message: "could not extract project ref".to_string(),
        })?;
    Ok(format!("db.{project_ref}.supabase.co"))
}

fn normalize_database_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("postgresql+psycopg://") {
        return format!("postgresql://{rest}");
    }
    url.to_string()
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingRequired(key.to_string())),
    }
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_psycopg_scheme() {
        assert_eq!(
            normalize_database_url("postgresql+psycopg://u:p@host/db"),
            "postgresql://u:p@host/db"
        );
    }

    #[test]
    fn synthesizes_supabase_host() {
        let host = supabase_host_from_url("https://abcdefg.supabase.co").unwrap();
        assert_eq!(host, "db.abcdefg.supabase.co");
    }
}
