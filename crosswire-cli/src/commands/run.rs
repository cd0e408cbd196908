use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::warn;

use crosswire_core::progress::IndicatifReporter;
use crosswire_core::run::{CancelToken, Coordinator, RunOutcome};
use crosswire_core::splitter::providers::create_splitter;
use crosswire_core::store::sqlite::SqliteStore;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Workspace root holding .crosswire/ (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Database location (default: <path>/.crosswire/crosswire.db)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let root = std::fs::canonicalize(&args.path)
        .with_context(|| format!("Cannot resolve path: {}", args.path.display()))?;

    let db_path = args.db.unwrap_or_else(|| super::resolve_db_path(&root));
    if !db_path.exists() {
        anyhow::bail!(
            "Crosswire is not initialized in {}. Run `crosswire init` first.",
            root.display()
        );
    }

    let config = super::load_config(&root)?;

    let api_key = std::env::var(&config.splitter.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        warn!(
            env = %config.splitter.api_key_env,
            "Splitter API key env var is empty; runs that need re-analysis will fail"
        );
    }
    let splitter = create_splitter(
        &config.splitter.provider,
        &config.splitter.model,
        &api_key,
        config.splitter.base_url.as_deref(),
    )
    .map_err(crosswire_core::error::CrosswireError::Config)?;

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;

    // Ctrl-C requests a clean abort: in-flight batches finish, nothing
    // commits, and the checkpoint stays pending for the next run.
    let cancel = CancelToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested, finishing current batch");
            signal_cancel.cancel();
        }
    });

    let coordinator = Coordinator::new(config, splitter);
    let progress = IndicatifReporter::new();
    let report = coordinator.run_with(&store, &progress, &cancel).await?;

    match report.outcome {
        RunOutcome::NothingToDo => {
            println!("Checkpoint is empty; nothing to do.");
            Ok(2)
        }
        RunOutcome::Completed(stats) => {
            println!("Cross-indexing run complete in {:.2?}", report.duration);
            println!();
            println!(
                "  Files:        {} modified, {} added, {} deleted",
                stats.files_modified, stats.files_added, stats.files_deleted
            );
            println!(
                "  Connections:  {} shifted, {} deleted, {} created",
                stats.connections_shifted, stats.connections_deleted, stats.connections_created
            );
            println!("  Mappings:     {} created", stats.mappings_created);
            println!("  Splitter:     {} calls", stats.splitter_calls);
            Ok(0)
        }
    }
}
