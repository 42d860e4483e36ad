//! Seeding CLI for the retrieval engine (§6): walks `--filesdir`, ingests
//! every supported document into the four-table store rooted at
//! `--dbpath`, and reports a summary. Grounded in the clap-derive shape
//! the pack's CLI crates use for a single top-level args struct (no
//! subcommands needed — this binary does exactly one thing).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use retrieval_core::engine::Engine;
use retrieval_core::error::EngineError;
use retrieval_core::EngineConfig;

/// Exit codes (§6): 0 success, 1 configuration error, 2 I/O/store error,
/// 3 fatal resilience exhaustion.
const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_STORE_ERROR: u8 = 2;
const EXIT_RESILIENCE_EXHAUSTED: u8 = 3;

#[derive(Parser)]
#[command(name = "retrieval-seed", version, about = "Seed the retrieval engine's corpus store from a directory of documents")]
struct Args {
    /// Directory the four `.lance` tables and the Tantivy indexes live
    /// under.
    #[arg(long, value_name = "DIR")]
    dbpath: PathBuf,

    /// Directory to walk recursively for documents to ingest.
    #[arg(long, value_name = "DIR")]
    filesdir: PathBuf,

    /// Rebuild from scratch instead of the default incremental mode
    /// (content-hash gap detection skips unchanged documents).
    #[arg(long)]
    overwrite: bool,

    /// Consult and refresh the stage cache during ingestion. Pass
    /// `--use-cache false` to force every document through live
    /// extraction.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    use_cache: bool,

    /// Delete every staged entry before ingesting.
    #[arg(long)]
    clear_cache: bool,

    /// Fail a document instead of calling the LLM extractor when no
    /// staged entry covers it. Implies `--use-cache`.
    #[arg(long)]
    cache_only: bool,

    /// Stage cache location, if not the default `<dbpath>/stage_cache`.
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::from(EXIT_STORE_ERROR);
        }
    };

    runtime.block_on(run(args))
}

async fn run(args: Args) -> ExitCode {
    let use_cache = args.use_cache || args.cache_only;

    let mut config = EngineConfig::default();
    config.data_dir = args.dbpath.clone();
    config.apply_env_overrides();
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let engine = match Engine::open_with_stage_cache_dir(config, args.cache_dir.clone()).await {
        Ok(engine) => engine,
        Err(e) => return exit_for_engine_error(&e, "failed to open engine"),
    };

    if args.clear_cache {
        if let Err(e) = engine.clear_stage_cache() {
            return exit_for_engine_error(&e, "failed to clear stage cache");
        }
        info!("stage cache cleared");
    }

    let report = match engine
        .ingest_directory_with_cache(&args.filesdir, args.overwrite, use_cache, args.cache_only)
        .await
    {
        Ok(report) => report,
        Err(e) => return exit_for_engine_error(&e, "ingestion batch failed"),
    };

    info!(
        discovered = report.discovered,
        processed = report.processed_count(),
        skipped = report.skipped_count(),
        failed = report.failed_count(),
        "ingestion complete"
    );

    // §7: a failed batch is only a non-zero exit if no document succeeded.
    if report.discovered > 0 && report.processed_count() == 0 && report.skipped_count() == 0 {
        error!("every discovered document failed ingestion");
        return ExitCode::from(EXIT_RESILIENCE_EXHAUSTED);
    }

    ExitCode::from(EXIT_OK)
}

fn exit_for_engine_error(error: &EngineError, context: &str) -> ExitCode {
    error!(error = %error, code = error.code(), "{context}");
    let code = match error {
        EngineError::Configuration(_) | EngineError::Validation { .. } => EXIT_CONFIG_ERROR,
        EngineError::ResCircuitOpen(_) | EngineError::ResBulkheadRejected(_) | EngineError::Cancelled => {
            EXIT_RESILIENCE_EXHAUSTED
        }
        _ => EXIT_STORE_ERROR,
    };
    ExitCode::from(code)
}
