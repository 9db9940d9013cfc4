//! CLI entry point: four subcommands sharing one process bootstrap (§6).

use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use podloom::arc_store::ArcStore;
use podloom::cli::{Cli, Command, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS};
use podloom::dedup::DedupPass;
use podloom::llm::OpenAiClient;
use podloom::models::pipeline_run::{RunConclusion, RunStatus};
use podloom::newsletter::NewsletterService;
use podloom::orchestrator::Orchestrator;
use podloom::pipeline_run_log::PipelineRunLog;
use podloom::semantic_matcher::SemanticMatcher;
use podloom::settings::SettingsStore;
use podloom::transcript::TranscriptSource;
use podloom::transcript_sources::{WhisperAudioSource, YoutubeCaptionSource};
use podloom::{AppConfig, Database};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration invalid, exiting");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let database = match Database::new(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "failed to connect to database, exiting");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    if let Err(e) = database.migrate().await {
        error!(error = %e, "failed to run migrations, exiting");
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    let pool = database.pool();
    let cli = Cli::parse();
    let run_id = Uuid::new_v4().to_string();
    let run_log = PipelineRunLog::new(pool.clone());

    let workflow_name = match &cli.command {
        Command::Run(_) => "run",
        Command::Dedup(_) => "dedup",
        Command::Newsletter(_) => "newsletter",
        Command::Send(_) => "send",
    };

    let _ = run_log
        .upsert(
            &run_id,
            workflow_name,
            "cli",
            RunStatus::Running,
            None,
            serde_json::json!({"started": true}),
            None,
        )
        .await;

    let exit_code = match cli.command {
        Command::Run(args) => run_backfill_command(pool.clone(), &config, args).await,
        Command::Dedup(args) => run_dedup_command(pool.clone(), &config, args).await,
        Command::Newsletter(args) => run_newsletter_command(pool.clone(), &config, args).await,
        Command::Send(args) => run_send_command(pool.clone(), args).await,
    };

    let (status, conclusion) = if exit_code == EXIT_SUCCESS {
        (RunStatus::Completed, RunConclusion::Success)
    } else {
        (RunStatus::Failed, RunConclusion::Failure)
    };
    let _ = run_log
        .upsert(
            &run_id,
            workflow_name,
            "cli",
            status,
            Some(conclusion),
            serde_json::json!({"finished": true}),
            None,
        )
        .await;

    std::process::exit(exit_code);
}

fn build_transcript_sources(config: &AppConfig, openai: Arc<OpenAiClient>) -> Vec<Arc<dyn TranscriptSource>> {
    // §4.3/§5: the transcription client is not documented thread-safe, so
    // each worker call builds its own reqwest client per source rather than
    // sharing one across the batch.
    vec![
        Arc::new(YoutubeCaptionSource::new(reqwest::Client::new())) as Arc<dyn TranscriptSource>,
        Arc::new(WhisperAudioSource::new(
            reqwest::Client::new(),
            openai,
            "whisper-1",
        )) as Arc<dyn TranscriptSource>,
    ]
    .into_iter()
    .collect()
}

async fn run_backfill_command(pool: sqlx::PgPool, config: &AppConfig, args: podloom::cli::RunArgs) -> i32 {
    let settings = Arc::new(SettingsStore::new(pool.clone()));
    let openai = Arc::new(OpenAiClient::new(config.openai_api_key.clone()));
    let embedding_model: String = settings
        .get(
            "topic_evolution",
            "embedding_model",
            "text-embedding-3-small".to_string(),
        )
        .await;
    let semantic_matcher = Arc::new(SemanticMatcher::new(openai.clone(), embedding_model));
    let transcript_sources = build_transcript_sources(config, openai.clone());

    let orchestrator = Orchestrator::new(
        pool,
        settings,
        transcript_sources,
        openai,
        semantic_matcher,
        config.max_workers,
        config.dual_write_episode_topics,
    );

    if !args.dry_run {
        match orchestrator.discover(args.feed_id).await {
            Ok(n) => info!(discovered = n, "feed discovery complete"),
            Err(e) => error!(error = %e, "feed discovery failed, continuing with existing queue"),
        }
    }

    let (_tx, rx) = watch::channel(false);
    match orchestrator
        .run_backfill(rx, args.limit, args.feed_id, args.no_parallel, args.dry_run)
        .await
    {
        Ok(summary) => {
            info!(
                relevant = summary.relevant,
                not_relevant = summary.not_relevant,
                failed = summary.failed,
                skipped = summary.skipped,
                rounds = summary.rounds,
                "backfill finished"
            );
            if summary.is_success() {
                EXIT_SUCCESS
            } else {
                EXIT_FAILURE
            }
        }
        Err(e) => {
            error!(error = %e, "backfill aborted");
            EXIT_FAILURE
        }
    }
}

async fn run_dedup_command(pool: sqlx::PgPool, config: &AppConfig, args: podloom::cli::DedupArgs) -> i32 {
    let settings = SettingsStore::new(pool.clone());
    let openai = Arc::new(OpenAiClient::new(config.openai_api_key.clone()));
    let embedding_model: String = settings
        .get(
            "topic_evolution",
            "embedding_model",
            "text-embedding-3-small".to_string(),
        )
        .await;
    let matcher = Arc::new(SemanticMatcher::new(openai, embedding_model));
    let dedup = DedupPass::new(pool, matcher);

    match dedup
        .run(&args.digest_topic, args.days_back, args.similarity_threshold, args.dry_run)
        .await
    {
        Ok(report) => {
            info!(
                phase1_groups = report.phase1_groups,
                phase1_merged = report.phase1_merged,
                phase2_groups = report.phase2_groups,
                phase2_merged = report.phase2_merged,
                errors = report.errors.len(),
                "dedup pass finished"
            );
            if report.errors.is_empty() {
                EXIT_SUCCESS
            } else {
                EXIT_FAILURE
            }
        }
        Err(e) => {
            error!(error = %e, "dedup pass aborted");
            EXIT_FAILURE
        }
    }
}

async fn run_newsletter_command(
    pool: sqlx::PgPool,
    config: &AppConfig,
    args: podloom::cli::NewsletterArgs,
) -> i32 {
    let openai = OpenAiClient::new(config.openai_api_key.clone());
    let settings = SettingsStore::new(pool.clone());
    let model: String = settings
        .get("ai_digest_generation", "model", "gpt-4o-mini".to_string())
        .await;
    let service = NewsletterService::new(pool.clone(), &openai, model);

    match service.generate(args.days, args.dry_run).await {
        Ok(selected) => {
            info!(
                issue_id = %selected.issue.id,
                subject_line = %selected.issue.subject_line,
                example_count = selected.examples.len(),
                "newsletter issue generated"
            );

            if !args.dry_run {
                let retention_days: i64 = settings.get("story_arcs", "retention_days", 14).await;
                let arc_store = ArcStore::new(pool);
                if let Ok(deleted) = arc_store.cleanup_old(retention_days).await {
                    if deleted > 0 {
                        info!(deleted, "pruned expired story arcs");
                    }
                }
            }

            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "newsletter generation failed");
            EXIT_FAILURE
        }
    }
}

/// SMTP delivery is an external collaborator (out of scope, §1): this marks
/// the issue as sent and leaves actual transport to that collaborator.
async fn run_send_command(pool: sqlx::PgPool, args: podloom::cli::SendArgs) -> i32 {
    let Some(issue_id) = args.issue_id else {
        error!("--issue-id is required");
        return EXIT_FAILURE;
    };

    if args.dry_run {
        info!(issue_id = %issue_id, "dry run: would mark issue sent");
        return EXIT_SUCCESS;
    }

    match sqlx::query("UPDATE newsletter_issues SET sent_at = now() WHERE id = $1")
        .bind(issue_id)
        .execute(&pool)
        .await
    {
        Ok(_) => {
            info!(issue_id = %issue_id, "issue marked sent");
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(issue_id = %issue_id, error = %e, "failed to mark issue sent");
            EXIT_FAILURE
        }
    }
}
