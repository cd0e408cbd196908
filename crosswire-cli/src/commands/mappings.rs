use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crosswire_core::store::GraphStore;
use crosswire_core::store::sqlite::SqliteStore;

#[derive(Args, Debug)]
pub struct MappingsArgs {
    /// Workspace root holding .crosswire/ (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Database location (default: <path>/.crosswire/crosswire.db)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Only show mappings at or above this confidence
    #[arg(long, default_value_t = 0.0)]
    pub min_confidence: f64,
}

pub async fn run(args: MappingsArgs) -> anyhow::Result<i32> {
    let root = std::fs::canonicalize(&args.path)
        .with_context(|| format!("Cannot resolve path: {}", args.path.display()))?;
    let db_path = args.db.unwrap_or_else(|| super::resolve_db_path(&root));
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;

    let mappings = store.mappings().await.context("Cannot read mappings")?;
    let shown: Vec<_> = mappings
        .iter()
        .filter(|m| m.confidence >= args.min_confidence)
        .collect();

    if shown.is_empty() {
        println!("No mappings.");
        return Ok(0);
    }

    println!("{} mappings:", shown.len());
    for mapping in shown {
        println!();
        println!(
            "  [{}] {} -> {} ({}, confidence {:.2})",
            mapping.id,
            mapping.outgoing_id,
            mapping.incoming_id,
            mapping.technology_name,
            mapping.confidence
        );
        if let Some(out) = store.connection(mapping.outgoing_id).await? {
            println!("    out: {}", out.description);
        }
        if let Some(inc) = store.connection(mapping.incoming_id).await? {
            println!("    in:  {}", inc.description);
        }
        if let Some(rationale) = &mapping.rationale {
            println!("    why: {rationale}");
        }
    }

    Ok(0)
}
