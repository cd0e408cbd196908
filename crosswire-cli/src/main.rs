use clap::Parser;

use crosswire_core::error::CrosswireError;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "crosswire",
    version,
    about = "Maintain a cross-project connection graph from pending file changes"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into the crosswire exit code table.
///
/// Exit codes:
///   0  — success (including a clean cancellation)
///   2  — nothing to do (empty checkpoint)
///   10 — splitter failure after retries
///   11 — store failure
///   20 — internal invariant violation or any other fatal error
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(core) = err.downcast_ref::<CrosswireError>() {
        return match core {
            CrosswireError::Splitter(_) => 10,
            CrosswireError::Store(_) => 11,
            CrosswireError::Cancelled => 0,
            CrosswireError::Checkpoint(_)
            | CrosswireError::Diff(_)
            | CrosswireError::Reconcile(_)
            | CrosswireError::Config(_) => 20,
        };
    }

    // CLI-level failures (paths, config files, database open) that never
    // reached the engine.
    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("database") || lower.contains("sqlite") {
        11
    } else {
        20
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(20);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswire_core::error::{CheckpointError, SplitterError, StoreError};

    #[test]
    fn exit_code_splitter_failure() {
        let err = anyhow::Error::new(CrosswireError::Splitter(SplitterError::RetriesExhausted {
            attempts: 3,
            last: "timeout".into(),
        }));
        assert_eq!(classify_exit_code(&err), 10);
    }

    #[test]
    fn exit_code_store_failure() {
        let err = anyhow::Error::new(CrosswireError::Store(StoreError::InvalidRunWrites(
            "x".into(),
        )));
        assert_eq!(classify_exit_code(&err), 11);
    }

    #[test]
    fn exit_code_invariant_violation() {
        let err = anyhow::Error::new(CrosswireError::Checkpoint(
            CheckpointError::InputCorruption {
                row_id: 1,
                reason: "bad".into(),
            },
        ));
        assert_eq!(classify_exit_code(&err), 20);
    }

    #[test]
    fn exit_code_cancelled_is_clean() {
        let err = anyhow::Error::new(CrosswireError::Cancelled);
        assert_eq!(classify_exit_code(&err), 0);
    }

    #[test]
    fn exit_code_database_message_fallback() {
        let err = anyhow::anyhow!("Cannot open database: /x/.crosswire/crosswire.db");
        assert_eq!(classify_exit_code(&err), 11);
    }

    #[test]
    fn exit_code_unknown_fallback() {
        let err = anyhow::anyhow!("something unexpected");
        assert_eq!(classify_exit_code(&err), 20);
    }
}
