//! Content-ingestion and understanding pipeline: podcast/YouTube feeds are
//! discovered, transcribed, scored for relevance, tracked into cross-episode
//! story arcs, deduplicated, and periodically summarized into a newsletter.

pub mod arc_store;
pub mod cli;
pub mod config;
pub mod database;
pub mod dedup;
pub mod error;
pub mod feed_reader;
pub mod llm;
pub mod models;
pub mod newsletter;
pub mod orchestrator;
pub mod pipeline_run_log;
pub mod recovery;
pub mod semantic_matcher;
pub mod settings;
pub mod transcript;
pub mod transcript_sources;

pub use config::AppConfig;
pub use database::Database;
pub use error::{PipelineError, Result};
