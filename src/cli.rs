//! CLI surface (§6): four entry points sharing one binary.

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "podloom", version, about = "Content-ingestion and understanding pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the backfill orchestrator (C9).
    Run(RunArgs),
    /// Run the dedup/consolidation pass over episode topics (C8).
    Dedup(DedupArgs),
    /// Generate a newsletter issue from recently scored episodes (C10).
    Newsletter(NewsletterArgs),
    /// Send a previously generated newsletter issue.
    Send(SendArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Compute the plan without persisting any state changes.
    #[arg(long)]
    pub dry_run: bool,
    /// Overrides `pipeline.max_episodes_per_run` for this invocation.
    #[arg(long)]
    pub limit: Option<i64>,
    #[arg(long)]
    pub verbose: bool,
    /// Process the batch sequentially instead of fanning out across workers.
    #[arg(long)]
    pub no_parallel: bool,
    /// Restrict discovery and backfill to a single feed.
    #[arg(long)]
    pub feed_id: Option<Uuid>,
}

#[derive(Debug, Parser)]
pub struct DedupArgs {
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long)]
    pub digest_topic: String,
    #[arg(long, default_value_t = 30)]
    pub days_back: i64,
    #[arg(long)]
    pub similarity_threshold: Option<f32>,
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Parser)]
pub struct NewsletterArgs {
    #[arg(long, default_value_t = 7)]
    pub days: i64,
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Parser)]
pub struct SendArgs {
    #[arg(long)]
    pub issue_id: Option<Uuid>,
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long)]
    pub verbose: bool,
}

/// §6 exit-code contract: 0 success, 1 any failure, 2 reserved for
/// environment validation failure (handled earlier, in `main`, before the
/// CLI even dispatches).
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;
