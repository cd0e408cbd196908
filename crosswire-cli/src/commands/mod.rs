pub mod init;
pub mod mappings;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;

use crosswire_core::config::CrosswireConfig;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize crosswire for a project (database, config, project row)
    Init(init::InitArgs),
    /// Process the pending checkpoint: reconcile, split, match, commit
    Run(run::RunArgs),
    /// Show pending checkpoint rows and store totals
    Status(status::StatusArgs),
    /// List cross-project connection mappings
    Mappings(mappings::MappingsArgs),
}

/// Run the selected command, returning the process exit code.
pub async fn run(cmd: Command) -> anyhow::Result<i32> {
    match cmd {
        Command::Init(args) => init::run(args).await,
        Command::Run(args) => run::run(args).await,
        Command::Status(args) => status::run(args).await,
        Command::Mappings(args) => mappings::run(args).await,
    }
}

/// Database location under a workspace root.
pub fn resolve_db_path(root: &Path) -> PathBuf {
    root.join(".crosswire").join("crosswire.db")
}

/// Config location under a workspace root.
pub fn resolve_config_path(root: &Path) -> PathBuf {
    root.join(".crosswire").join("config.toml")
}

/// Load the config file, or defaults when it doesn't exist.
pub fn load_config(root: &Path) -> anyhow::Result<CrosswireConfig> {
    let path = resolve_config_path(root);
    if !path.exists() {
        return Ok(CrosswireConfig::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Cannot parse config: {}", path.display()))
}
