use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crosswire_core::store::GraphStore;
use crosswire_core::store::sqlite::SqliteStore;
use crosswire_core::types::ProjectId;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Workspace root holding .crosswire/ (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Database location (default: <path>/.crosswire/crosswire.db)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub async fn run(args: StatusArgs) -> anyhow::Result<i32> {
    let root = std::fs::canonicalize(&args.path)
        .with_context(|| format!("Cannot resolve path: {}", args.path.display()))?;
    let db_path = args.db.unwrap_or_else(|| super::resolve_db_path(&root));
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;

    let stats = store.stats().await.context("Cannot read store stats")?;
    println!("Crosswire store: {}", db_path.display());
    println!();
    println!("  Projects:            {}", stats.projects);
    println!("  Files:               {}", stats.files);
    println!("  Connections:         {}", stats.connections);
    println!("  Mappings:            {}", stats.mappings);
    println!("  Pending checkpoints: {}", stats.pending_checkpoints);

    if stats.pending_checkpoints > 0 {
        let rows = store.list_checkpoints().await?;
        let mut by_project: BTreeMap<ProjectId, u64> = BTreeMap::new();
        for row in &rows {
            *by_project.entry(row.project_id).or_default() += 1;
        }

        println!();
        println!("  Pending by project:");
        for (project_id, count) in by_project {
            let name = store
                .project(project_id)
                .await?
                .map_or_else(|| format!("project {project_id}"), |p| p.name);
            println!("    {name}: {count} rows");
        }
    }

    Ok(0)
}
