use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;

use crosswire_core::config::CrosswireConfig;
use crosswire_core::store::GraphStore;
use crosswire_core::store::sqlite::SqliteStore;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project root directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Project name (default: the directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Short project description, handed to the splitter as context
    #[arg(long)]
    pub description: Option<String>,

    /// Database location (default: <path>/.crosswire/crosswire.db)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub async fn run(args: InitArgs) -> anyhow::Result<i32> {
    let root = std::fs::canonicalize(&args.path)
        .with_context(|| format!("Cannot resolve path: {}", args.path.display()))?;

    let name = match args.name {
        Some(name) => name,
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };

    let crosswire_dir = root.join(".crosswire");
    std::fs::create_dir_all(&crosswire_dir)
        .with_context(|| format!("Cannot create {}", crosswire_dir.display()))?;

    // Write a default config if none exists, so the knobs are discoverable.
    let config_path = super::resolve_config_path(&root);
    if !config_path.exists() {
        let rendered = toml::to_string_pretty(&CrosswireConfig::default())
            .context("Cannot render default config")?;
        std::fs::write(&config_path, rendered)
            .with_context(|| format!("Cannot write config: {}", config_path.display()))?;
        info!(path = %config_path.display(), "Wrote default config");
    }

    let db_path = args.db.unwrap_or_else(|| super::resolve_db_path(&root));
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;

    let project_id = store
        .register_project(&name, &root.to_string_lossy(), args.description.as_deref())
        .await
        .context("Cannot register project")?;

    println!("Initialized crosswire for project \"{name}\" (id {project_id})");
    println!("  Root:     {}", root.display());
    println!("  Database: {}", db_path.display());
    println!("  Config:   {}", config_path.display());

    Ok(0)
}
