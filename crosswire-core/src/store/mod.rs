pub mod schema;
pub mod sqlite;

use std::collections::HashSet;

use crate::types::{
    CheckpointRow, CheckpointRowId, ChangeKind, Connection, ConnectionId, ConnectionMapping,
    Direction, FileId, Project, ProjectId, RunWrites, SourceFile, StoreStats,
};

/// IDs assigned while committing a run's accumulated writes.
///
/// `new_file_ids[i]` / `new_connection_ids[i]` resolve the `New(i)` refs the
/// run used before the rows existed.
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    pub new_file_ids: Vec<FileId>,
    pub new_connection_ids: Vec<ConnectionId>,
    pub mappings_created: u64,
}

/// The store abstraction the engine runs against.
///
/// Reads may happen at any point of a run and observe pre-run state. All
/// writes are accumulated into a [`RunWrites`] and applied atomically by
/// [`GraphStore::commit_run`]; a failed commit leaves the store untouched,
/// including the checkpoint queue.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    // ── Projects ───────────────────────────────────────────────────

    /// Register a project, or return the existing ID for its name.
    async fn register_project(
        &self,
        name: &str,
        root_path: &str,
        description: Option<&str>,
    ) -> crate::error::Result<ProjectId>;

    async fn project(&self, id: ProjectId) -> crate::error::Result<Option<Project>>;

    async fn project_by_name(&self, name: &str) -> crate::error::Result<Option<Project>>;

    async fn projects(&self) -> crate::error::Result<Vec<Project>>;

    /// Short natural-language project description, handed to the splitter.
    async fn project_description(&self, id: ProjectId) -> crate::error::Result<Option<String>>;

    // ── Files ──────────────────────────────────────────────────────

    /// Insert or update a file row (upsert by `(project_id, path)`).
    async fn upsert_file(
        &self,
        project_id: ProjectId,
        path: &str,
        language: &str,
        content_hash: u64,
    ) -> crate::error::Result<FileId>;

    async fn file_by_path(
        &self,
        project_id: ProjectId,
        path: &str,
    ) -> crate::error::Result<Option<SourceFile>>;

    async fn files_for_project(&self, project_id: ProjectId)
        -> crate::error::Result<Vec<SourceFile>>;

    // ── Connections ────────────────────────────────────────────────

    /// Insert a connection row. The `id` and `created_at` fields of the
    /// argument are ignored. Used by seeding and tests; the engine itself
    /// inserts through [`GraphStore::commit_run`].
    async fn insert_connection(&self, conn: &Connection) -> crate::error::Result<ConnectionId>;

    async fn connection(&self, id: ConnectionId) -> crate::error::Result<Option<Connection>>;

    /// All connections anchored in a file, ascending by ID.
    async fn connections_for_file(&self, file_id: FileId)
        -> crate::error::Result<Vec<Connection>>;

    /// All connections of one direction across a project, ascending by ID.
    async fn connections_for_project(
        &self,
        project_id: ProjectId,
        direction: Direction,
    ) -> crate::error::Result<Vec<Connection>>;

    // ── Mappings ───────────────────────────────────────────────────

    async fn mappings(&self) -> crate::error::Result<Vec<ConnectionMapping>>;

    /// The set of `(outgoing, incoming)` pairs that already have a mapping.
    async fn mapping_pairs(
        &self,
    ) -> crate::error::Result<HashSet<(ConnectionId, ConnectionId)>>;

    // ── Checkpoint queue ───────────────────────────────────────────

    /// Append a pending change row (the watcher-facing write path).
    async fn append_checkpoint(
        &self,
        project_id: ProjectId,
        file_path: &str,
        change_kind: ChangeKind,
        old_content: Option<&str>,
        new_content: Option<&str>,
    ) -> crate::error::Result<CheckpointRowId>;

    /// All pending rows, ascending by ID (insertion order).
    async fn list_checkpoints(&self) -> crate::error::Result<Vec<CheckpointRow>>;

    // ── Run commit ─────────────────────────────────────────────────

    /// Apply every accumulated write of a run inside one transaction.
    ///
    /// Order within the transaction: new files, file hash updates,
    /// connection shifts (ascending connection ID), connection deletes,
    /// new connections, mappings, file deletes, checkpoint deletes.
    /// Retried once on a transient busy error; any other failure rolls
    /// back and leaves the checkpoint queue intact.
    async fn commit_run(&self, writes: RunWrites) -> crate::error::Result<CommitReceipt>;

    // ── Metrics ────────────────────────────────────────────────────

    async fn stats(&self) -> crate::error::Result<StoreStats>;
}
