use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Typed ID wrappers ──────────────────────────────────────────────

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

typed_id!(ProjectId);
typed_id!(FileId);
typed_id!(ConnectionId);
typed_id!(MappingId);
typed_id!(CheckpointRowId);

// ── Projects and files ─────────────────────────────────────────────

/// An indexed project. Created once when the project is first registered;
/// never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub root_path: String,
    /// Short natural-language description, handed to the splitter as context.
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A source file tracked within a project. Unique by `(project_id, path)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: FileId,
    pub project_id: ProjectId,
    /// Path relative to the project root.
    pub path: String,
    pub language: String,
    /// FNV-1a hash of the file's bytes, for change detection.
    pub content_hash: u64,
}

/// Infer a language tag from a file path's extension.
///
/// Unknown extensions map to `"text"` — the splitter still receives the code.
pub fn language_for_path(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("rs") => "rust",
        Some("py") => "python",
        Some("ts" | "tsx") => "typescript",
        Some("js" | "jsx") => "javascript",
        Some("go") => "go",
        Some("java") => "java",
        Some("rb") => "ruby",
        Some("cs") => "csharp",
        Some("php") => "php",
        Some("kt") => "kotlin",
        _ => "text",
    }
}

/// Compute a content hash for a byte slice using FNV-1a (64-bit).
///
/// Non-cryptographic on purpose; collisions only cost a spurious re-index.
pub fn content_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

// ── Connections ────────────────────────────────────────────────────

/// Which way an integration point faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The file serves this integration point (e.g. an HTTP handler).
    Incoming,
    /// The file calls out through this integration point.
    Outgoing,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(Self::Incoming),
            "outgoing" => Some(Self::Outgoing),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single external integration point attributed to a line range in one file.
///
/// `code_snippet` always equals the exact `start_line..=end_line` slice of the
/// file's current content. `description` and `technology_name` come from the
/// splitter only; the reconciler never fabricates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub file_id: FileId,
    pub direction: Direction,
    /// 1-based, inclusive.
    pub start_line: u32,
    /// 1-based, inclusive; `start_line <= end_line`.
    pub end_line: u32,
    pub code_snippet: String,
    pub description: String,
    pub technology_name: String,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

/// A directed pair linking an outgoing connection in one project to an
/// incoming connection in another, with a confidence score in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMapping {
    pub id: MappingId,
    pub outgoing_id: ConnectionId,
    pub incoming_id: ConnectionId,
    pub confidence: f64,
    pub technology_name: String,
    pub rationale: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Checkpoint rows and the change set ─────────────────────────────

/// Kind of a pending file change written by external watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(Self::Added),
            "modified" => Some(Self::Modified),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending change as stored in the checkpoint queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRow {
    pub id: CheckpointRowId,
    pub project_id: ProjectId,
    pub file_path: String,
    pub change_kind: ChangeKind,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The net effect of all checkpoint rows for one file.
///
/// Coalescing keeps the earliest `old` and the latest `new`; a file that was
/// added and then deleted collapses to no entry at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added { new: String },
    Modified { old: String, new: String },
    Deleted { old: String },
}

/// Key identifying a file across projects.
pub type FileKey = (ProjectId, String);

/// Coalesced pending changes for one run, keyed by `(project, path)`.
///
/// A `BTreeMap` so iteration order is deterministic across runs.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub changes: BTreeMap<FileKey, Change>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

// ── Snippet jobs ───────────────────────────────────────────────────

/// Where a snippet job came from; modified-file jobs are split before
/// added-file jobs within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOrigin {
    ModifiedFile,
    AddedFile,
}

/// A file the engine is writing or touching during this run.
///
/// New files have no row yet; their IDs are assigned when the run commits,
/// so pending work refers to them by index into [`RunWrites::new_files`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FileRef {
    Existing(FileId),
    New(usize),
}

/// A connection that exists either in the store or in this run's pending
/// inserts. Ordering puts existing rows (by ID) before pending ones (by
/// insertion index), which is what gives the matcher a stable input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConnectionRef {
    Existing(ConnectionId),
    New(usize),
}

/// A code range queued for the splitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetJob {
    pub file: FileRef,
    pub project_id: ProjectId,
    pub path: String,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
    pub code: String,
    /// Set only for contained-replacement re-derivations, as context.
    pub prior_description: Option<String>,
    pub origin: JobOrigin,
}

impl SnippetJob {
    pub fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

// ── Accumulated run writes ─────────────────────────────────────────

/// A file row to create when the run commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub project_id: ProjectId,
    pub path: String,
    pub language: String,
    pub content_hash: u64,
}

/// An in-place line-range update for a connection that survived a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftUpdate {
    pub connection_id: ConnectionId,
    pub start_line: u32,
    pub end_line: u32,
    pub code_snippet: String,
}

/// A connection row to insert, produced by the splitter.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub file: FileRef,
    pub project_id: ProjectId,
    pub direction: Direction,
    pub start_line: u32,
    pub end_line: u32,
    pub code_snippet: String,
    pub description: String,
    pub technology_name: String,
}

/// A mapping row to insert, produced by the matcher. Endpoints may refer to
/// connections created in this same run.
#[derive(Debug, Clone)]
pub struct NewMapping {
    pub outgoing: ConnectionRef,
    pub incoming: ConnectionRef,
    pub confidence: f64,
    pub technology_name: String,
    pub rationale: Option<String>,
}

/// Every write the run intends to make, applied atomically by
/// [`crate::store::GraphStore::commit_run`]. Nothing here touches the store
/// until the coordinator commits.
#[derive(Debug, Clone, Default)]
pub struct RunWrites {
    pub new_files: Vec<NewFile>,
    pub file_hash_updates: Vec<(FileId, u64)>,
    pub file_deletes: Vec<FileId>,
    pub connection_shifts: Vec<ShiftUpdate>,
    pub connection_deletes: Vec<ConnectionId>,
    pub new_connections: Vec<NewConnection>,
    pub new_mappings: Vec<NewMapping>,
    pub checkpoint_deletes: Vec<CheckpointRowId>,
}

impl RunWrites {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty()
            && self.file_hash_updates.is_empty()
            && self.file_deletes.is_empty()
            && self.connection_shifts.is_empty()
            && self.connection_deletes.is_empty()
            && self.new_connections.is_empty()
            && self.new_mappings.is_empty()
            && self.checkpoint_deletes.is_empty()
    }
}

// ── Run statistics ─────────────────────────────────────────────────

/// Counters reported after a run, in the shape the CLI prints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub files_modified: u64,
    pub files_added: u64,
    pub files_deleted: u64,
    pub connections_shifted: u64,
    pub connections_deleted: u64,
    pub connections_created: u64,
    pub mappings_created: u64,
    pub splitter_calls: u64,
}

/// Summary statistics for the store, used by `crosswire status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub projects: u64,
    pub files: u64,
    pub connections: u64,
    pub mappings: u64,
    pub pending_checkpoints: u64,
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trip() {
        for d in [Direction::Incoming, Direction::Outgoing] {
            assert_eq!(Direction::parse(d.as_str()), Some(d));
        }
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn change_kind_round_trip() {
        for k in [ChangeKind::Added, ChangeKind::Modified, ChangeKind::Deleted] {
            assert_eq!(ChangeKind::parse(k.as_str()), Some(k));
        }
        assert_eq!(ChangeKind::parse(""), None);
    }

    #[test]
    fn typed_id_display() {
        assert_eq!(ProjectId(3).to_string(), "3");
        assert_eq!(ConnectionId(42).to_string(), "42");
    }

    #[test]
    fn language_inference() {
        assert_eq!(language_for_path("svc/queue.go"), "go");
        assert_eq!(language_for_path("src/main.rs"), "rust");
        assert_eq!(language_for_path("app.tsx"), "typescript");
        assert_eq!(language_for_path("Makefile"), "text");
    }

    #[test]
    fn content_hash_deterministic() {
        let a = content_hash(b"GET /health");
        assert_eq!(a, content_hash(b"GET /health"));
        assert_ne!(a, content_hash(b"GET /ready"));
        assert_ne!(content_hash(b""), 0);
    }

    #[test]
    fn connection_ref_orders_existing_before_new() {
        let mut refs = vec![
            ConnectionRef::New(0),
            ConnectionRef::Existing(ConnectionId(9)),
            ConnectionRef::Existing(ConnectionId(2)),
            ConnectionRef::New(3),
        ];
        refs.sort();
        assert_eq!(
            refs,
            vec![
                ConnectionRef::Existing(ConnectionId(2)),
                ConnectionRef::Existing(ConnectionId(9)),
                ConnectionRef::New(0),
                ConnectionRef::New(3),
            ]
        );
    }

    #[test]
    fn run_writes_empty_check() {
        let mut writes = RunWrites::default();
        assert!(writes.is_empty());
        writes.checkpoint_deletes.push(CheckpointRowId(1));
        assert!(!writes.is_empty());
    }
}
