//! Run coordination — the entry point that drives one incremental
//! cross-indexing run.
//!
//! Phase order: Loading → Diffing/Reconciling → Splitting → Matching →
//! Committing. All store writes accumulate in a [`RunWrites`] and land in
//! a single transaction at the end; any fatal error (or cancellation)
//! discards them and leaves the checkpoint queue pending for the next run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::batch::plan_batches;
use crate::checkpoint::load_change_set;
use crate::config::CrosswireConfig;
use crate::error::CrosswireError;
use crate::matcher::strategies::StrategyRegistry;
use crate::matcher::{ConnectionView, match_connections};
use crate::progress::{NoopReporter, ProgressReporter};
use crate::reconcile::{
    FileOutcome, added_file_job, deleted_file_outcome, reconcile_modified_file,
};
use crate::splitter::{Splitter, SplitterDriver};
use crate::store::GraphStore;
use crate::types::{
    Change, Connection, ConnectionRef, Direction, FileRef, NewFile, ProjectId, RunStats,
    RunWrites, SnippetJob, SourceFile, content_hash, language_for_path,
};

/// Cooperative cancellation signal. Cancelling lets in-flight splitter
/// batches finish, then aborts the run cleanly: nothing commits and the
/// checkpoint stays pending.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a run did, or why it did nothing.
#[derive(Debug)]
pub enum RunOutcome {
    /// Empty checkpoint: the store was not touched at all.
    NothingToDo,
    Completed(RunStats),
}

/// Result of a coordinator run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub duration: std::time::Duration,
}

/// One file's unit of reconciliation work, prepared before the CPU fan-out.
enum WorkItem {
    Modified {
        file: SourceFile,
        connections: Vec<Connection>,
        old: String,
        new: String,
    },
    /// A brand-new file; `new_file_index` points into `RunWrites::new_files`.
    Added {
        project_id: ProjectId,
        path: String,
        new_file_index: usize,
        new: String,
    },
    /// A re-added file the store already knows: every old connection is
    /// re-derived from the full new content.
    Readded {
        file: SourceFile,
        connections: Vec<Connection>,
        new: String,
    },
    Deleted {
        file: SourceFile,
        connections: Vec<Connection>,
    },
}

/// Drives the incremental cross-indexing engine over a store.
pub struct Coordinator {
    config: CrosswireConfig,
    splitter: Arc<dyn Splitter>,
}

impl Coordinator {
    pub fn new(config: CrosswireConfig, splitter: Arc<dyn Splitter>) -> Self {
        Self { config, splitter }
    }

    pub async fn run(&self, store: &dyn GraphStore) -> crate::error::Result<RunReport> {
        self.run_with(store, &NoopReporter, &CancelToken::new()).await
    }

    /// Run with progress reporting and a cancellation token.
    #[instrument(skip_all)]
    #[allow(clippy::too_many_lines)]
    pub async fn run_with(
        &self,
        store: &dyn GraphStore,
        progress: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> crate::error::Result<RunReport> {
        let start = Instant::now();
        let mut stats = RunStats::default();
        let mut writes = RunWrites::default();

        // ── Loading ───────────────────────────────────────────────
        progress.start("Loading checkpoint", None);
        let rows = store.list_checkpoints().await?;
        if rows.is_empty() {
            progress.finish();
            info!("Checkpoint is empty, nothing to do");
            return Ok(RunReport {
                outcome: RunOutcome::NothingToDo,
                duration: start.elapsed(),
            });
        }
        let (change_set, row_ids) = load_change_set(&rows)?;
        writes.checkpoint_deletes = row_ids;
        progress.message(&format!(
            "{} pending rows, {} net changes",
            rows.len(),
            change_set.len()
        ));
        progress.finish();

        if cancel.is_cancelled() {
            return Err(CrosswireError::Cancelled);
        }

        // ── Diffing & Reconciling ─────────────────────────────────
        progress.start("Reconciling", Some(change_set.len() as u64));
        let mut items: Vec<WorkItem> = Vec::new();
        let mut contents: HashMap<(ProjectId, String), String> = HashMap::new();

        for ((project_id, path), change) in &change_set.changes {
            let stored = store.file_by_path(*project_id, path).await?;
            match change {
                Change::Modified { old, new } => {
                    stats.files_modified += 1;
                    contents.insert((*project_id, path.clone()), new.clone());
                    match stored {
                        Some(file) => {
                            let connections = store.connections_for_file(file.id).await?;
                            items.push(WorkItem::Modified {
                                file,
                                connections,
                                old: old.clone(),
                                new: new.clone(),
                            });
                        }
                        None => {
                            // The store never saw this file; index it fresh.
                            warn!(project = %project_id, path = %path, "Modified file unknown to store, treating as added");
                            let new_file_index = writes.new_files.len();
                            writes.new_files.push(NewFile {
                                project_id: *project_id,
                                path: path.clone(),
                                language: language_for_path(path).to_string(),
                                content_hash: content_hash(new.as_bytes()),
                            });
                            items.push(WorkItem::Added {
                                project_id: *project_id,
                                path: path.clone(),
                                new_file_index,
                                new: new.clone(),
                            });
                        }
                    }
                }
                Change::Added { new } => {
                    stats.files_added += 1;
                    contents.insert((*project_id, path.clone()), new.clone());
                    match stored {
                        Some(file) => {
                            let connections = store.connections_for_file(file.id).await?;
                            writes
                                .file_hash_updates
                                .push((file.id, content_hash(new.as_bytes())));
                            items.push(WorkItem::Readded {
                                file,
                                connections,
                                new: new.clone(),
                            });
                        }
                        None => {
                            let new_file_index = writes.new_files.len();
                            writes.new_files.push(NewFile {
                                project_id: *project_id,
                                path: path.clone(),
                                language: language_for_path(path).to_string(),
                                content_hash: content_hash(new.as_bytes()),
                            });
                            items.push(WorkItem::Added {
                                project_id: *project_id,
                                path: path.clone(),
                                new_file_index,
                                new: new.clone(),
                            });
                        }
                    }
                }
                Change::Deleted { .. } => {
                    stats.files_deleted += 1;
                    if let Some(file) = stored {
                        let connections = store.connections_for_file(file.id).await?;
                        items.push(WorkItem::Deleted { file, connections });
                    }
                }
            }
        }

        let adjacency = self.config.engine.adjacency_threshold;
        let outcomes = self.reconcile_items(&items, adjacency)?;

        let mut jobs_by_project: BTreeMap<ProjectId, Vec<SnippetJob>> = BTreeMap::new();
        for (item, outcome) in items.iter().zip(outcomes) {
            match item {
                WorkItem::Modified { file, new, .. } => {
                    writes
                        .file_hash_updates
                        .push((file.id, content_hash(new.as_bytes())));
                    stats.connections_shifted += outcome.shifts.len() as u64;
                    stats.connections_deleted += outcome.deletes.len() as u64;
                    writes.connection_shifts.extend(outcome.shifts);
                    writes.connection_deletes.extend(outcome.deletes);
                    for job in outcome.jobs {
                        jobs_by_project.entry(job.project_id).or_default().push(job);
                    }
                }
                WorkItem::Added {
                    project_id,
                    path,
                    new_file_index,
                    new,
                } => {
                    if let Some(job) =
                        added_file_job(*project_id, FileRef::New(*new_file_index), path, new)
                    {
                        jobs_by_project.entry(*project_id).or_default().push(job);
                    }
                }
                WorkItem::Readded { file, connections, new } => {
                    stats.connections_deleted += connections.len() as u64;
                    writes
                        .connection_deletes
                        .extend(connections.iter().map(|c| c.id));
                    if let Some(job) = added_file_job(
                        file.project_id,
                        FileRef::Existing(file.id),
                        &file.path,
                        new,
                    ) {
                        jobs_by_project.entry(file.project_id).or_default().push(job);
                    }
                }
                WorkItem::Deleted { file, connections } => {
                    stats.connections_deleted += connections.len() as u64;
                    writes.file_deletes.push(file.id);
                }
            }
            progress.advance(1);
        }
        progress.finish();

        if cancel.is_cancelled() {
            return Err(CrosswireError::Cancelled);
        }

        // ── Splitting ─────────────────────────────────────────────
        let batches: Vec<_> = jobs_by_project
            .into_iter()
            .flat_map(|(project_id, jobs)| {
                plan_batches(project_id, jobs, self.config.engine.batch_line_budget)
            })
            .collect();

        if !batches.is_empty() {
            progress.start("Splitting", Some(batches.len() as u64));
            let mut descriptions = HashMap::new();
            for batch in &batches {
                if let Some(description) = store.project_description(batch.project_id).await? {
                    descriptions.insert(batch.project_id, description);
                }
            }
            let driver = SplitterDriver::new(
                Arc::clone(&self.splitter),
                self.config.splitter.retries,
                self.config.splitter.concurrency,
            );
            let split = driver
                .run_batches(batches, descriptions, Arc::new(contents), cancel)
                .await?;
            stats.splitter_calls = split.calls;
            writes.new_connections = split.connections;
            progress.finish();
        }

        if cancel.is_cancelled() {
            return Err(CrosswireError::Cancelled);
        }

        // ── Matching ──────────────────────────────────────────────
        progress.start("Matching", None);
        let view = self.build_view(store, &writes).await?;
        let existing_pairs = store.mapping_pairs().await?;
        writes.new_mappings = match_connections(
            &view,
            &existing_pairs,
            self.config.matcher.threshold,
            &StrategyRegistry::default(),
        );
        progress.finish();

        if cancel.is_cancelled() {
            return Err(CrosswireError::Cancelled);
        }

        // ── Committing ────────────────────────────────────────────
        progress.start("Committing", None);
        let receipt = store.commit_run(writes).await?;
        stats.connections_created = receipt.new_connection_ids.len() as u64;
        stats.mappings_created = receipt.mappings_created;
        progress.finish();

        info!(
            files_modified = stats.files_modified,
            files_added = stats.files_added,
            files_deleted = stats.files_deleted,
            shifted = stats.connections_shifted,
            deleted = stats.connections_deleted,
            created = stats.connections_created,
            mappings = stats.mappings_created,
            splitter_calls = stats.splitter_calls,
            duration = ?start.elapsed(),
            "Run complete"
        );

        Ok(RunReport {
            outcome: RunOutcome::Completed(stats),
            duration: start.elapsed(),
        })
    }

    /// Fan per-file diff/reconcile work out over the CPU pool. Workers
    /// hold read-only references and return owned accumulators; results
    /// come back in input order.
    fn reconcile_items(
        &self,
        items: &[WorkItem],
        adjacency: u32,
    ) -> crate::error::Result<Vec<FileOutcome>> {
        use rayon::prelude::*;

        let reconcile_one = |item: &WorkItem| -> crate::error::Result<FileOutcome> {
            match item {
                WorkItem::Modified {
                    file,
                    connections,
                    old,
                    new,
                } => reconcile_modified_file(
                    file.project_id,
                    file,
                    connections,
                    old,
                    new,
                    adjacency,
                ),
                WorkItem::Deleted { connections, .. } => Ok(deleted_file_outcome(connections)),
                // Added and re-added files have no diff to reconcile.
                WorkItem::Added { .. } | WorkItem::Readded { .. } => Ok(FileOutcome::default()),
            }
        };

        let workers = self.config.engine.cpu_workers as usize;
        if workers == 0 {
            items.par_iter().map(reconcile_one).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| {
                    crate::error::ConfigError::Invalid(format!("cpu pool: {e}"))
                })?;
            pool.install(|| items.par_iter().map(reconcile_one).collect())
        }
    }

    /// Assemble the post-run connection view the matcher scores: every
    /// stored connection that survives this run, plus this run's pending
    /// inserts.
    async fn build_view(
        &self,
        store: &dyn GraphStore,
        writes: &RunWrites,
    ) -> crate::error::Result<Vec<ConnectionView>> {
        use std::collections::HashSet;

        let deleted: HashSet<_> = writes.connection_deletes.iter().copied().collect();
        let dropped_files: HashSet<_> = writes.file_deletes.iter().copied().collect();

        let mut view = Vec::new();
        for project in store.projects().await? {
            for direction in [Direction::Outgoing, Direction::Incoming] {
                for conn in store.connections_for_project(project.id, direction).await? {
                    if deleted.contains(&conn.id) || dropped_files.contains(&conn.file_id) {
                        continue;
                    }
                    view.push(ConnectionView {
                        connection: ConnectionRef::Existing(conn.id),
                        project_id: project.id,
                        direction: conn.direction,
                        description: conn.description,
                        code_snippet: conn.code_snippet,
                        technology_name: conn.technology_name,
                    });
                }
            }
        }

        for (index, conn) in writes.new_connections.iter().enumerate() {
            view.push(ConnectionView {
                connection: ConnectionRef::New(index),
                project_id: conn.project_id,
                direction: conn.direction,
                description: conn.description.clone(),
                code_snippet: conn.code_snippet.clone(),
                technology_name: conn.technology_name.clone(),
            });
        }

        Ok(view)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
