use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection as SqlConnection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::error::{CrosswireError, StoreError};
use crate::types::{
    ChangeKind, CheckpointRow, CheckpointRowId, Connection, ConnectionId, ConnectionMapping,
    ConnectionRef, Direction, FileId, FileRef, MappingId, Project, ProjectId, RunWrites,
    SourceFile, StoreStats,
};

use super::schema;
use super::{CommitReceipt, GraphStore};

/// SQLite-backed implementation of [`GraphStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<SqlConnection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = SqlConnection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = SqlConnection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(StoreError::Sqlite)?;

        // WAL is silently ignored for in-memory databases
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;

        conn.execute(
            "INSERT OR IGNORE INTO crosswire_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        Ok(())
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
    }

    fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
        let created_at: String = row.get("created_at")?;
        Ok(Project {
            id: ProjectId(row.get("id")?),
            name: row.get("name")?,
            root_path: row.get("root_path")?,
            description: row.get("description")?,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceFile> {
        // SQLite INTEGER is i64; the hash was written with its bits reinterpreted
        let hash_i64: i64 = row.get("content_hash")?;
        Ok(SourceFile {
            id: FileId(row.get("id")?),
            project_id: ProjectId(row.get("project_id")?),
            path: row.get("path")?,
            language: row.get("language")?,
            #[allow(clippy::cast_sign_loss)]
            content_hash: hash_i64 as u64,
        })
    }

    fn row_to_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Connection> {
        let direction_str: String = row.get("direction")?;
        let created_at: String = row.get("created_at")?;
        Ok(Connection {
            id: ConnectionId(row.get("id")?),
            file_id: FileId(row.get("file_id")?),
            direction: Direction::parse(&direction_str).unwrap_or(Direction::Outgoing),
            start_line: row.get("start_line")?,
            end_line: row.get("end_line")?,
            code_snippet: row.get("code_snippet")?,
            description: row.get("description")?,
            technology_name: row.get("technology_name")?,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_mapping(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectionMapping> {
        let created_at: String = row.get("created_at")?;
        Ok(ConnectionMapping {
            id: MappingId(row.get("id")?),
            outgoing_id: ConnectionId(row.get("outgoing_id")?),
            incoming_id: ConnectionId(row.get("incoming_id")?),
            confidence: row.get("confidence")?,
            technology_name: row.get("technology_name")?,
            rationale: row.get("rationale")?,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckpointRow> {
        let kind_str: String = row.get("change_kind")?;
        let created_at: String = row.get("created_at")?;
        Ok(CheckpointRow {
            id: CheckpointRowId(row.get("id")?),
            project_id: ProjectId(row.get("project_id")?),
            file_path: row.get("file_path")?,
            change_kind: ChangeKind::parse(&kind_str).unwrap_or(ChangeKind::Modified),
            old_content: row.get("old_content")?,
            new_content: row.get("new_content")?,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    /// Apply the run's writes inside a single transaction.
    #[allow(clippy::too_many_lines, clippy::cast_possible_wrap)]
    fn apply_run(&self, writes: &RunWrites) -> crate::error::Result<CommitReceipt> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        let now = Utc::now().to_rfc3339();
        let mut receipt = CommitReceipt::default();

        // 1. New files — resolves FileRef::New for the connections below.
        for file in &writes.new_files {
            tx.execute(
                "INSERT INTO files (project_id, path, language, content_hash)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(project_id, path) DO UPDATE SET
                    language = excluded.language,
                    content_hash = excluded.content_hash",
                params![
                    file.project_id.0,
                    file.path,
                    file.language,
                    file.content_hash as i64
                ],
            )
            .map_err(StoreError::Sqlite)?;
            let id: i64 = tx
                .query_row(
                    "SELECT id FROM files WHERE project_id = ?1 AND path = ?2",
                    params![file.project_id.0, file.path],
                    |row| row.get(0),
                )
                .map_err(StoreError::Sqlite)?;
            receipt.new_file_ids.push(FileId(id));
        }

        // 2. File hash updates for modified files.
        for &(file_id, hash) in &writes.file_hash_updates {
            tx.execute(
                "UPDATE files SET content_hash = ?1 WHERE id = ?2",
                params![hash as i64, file_id.0],
            )
            .map_err(StoreError::Sqlite)?;
        }

        // 3. Survive-shift updates, ascending connection ID.
        let mut shifts = writes.connection_shifts.clone();
        shifts.sort_by_key(|s| s.connection_id);
        for shift in &shifts {
            tx.execute(
                "UPDATE connections
                 SET start_line = ?1, end_line = ?2, code_snippet = ?3
                 WHERE id = ?4",
                params![
                    shift.start_line,
                    shift.end_line,
                    shift.code_snippet,
                    shift.connection_id.0
                ],
            )
            .map_err(StoreError::Sqlite)?;
        }

        // 4. Connection deletes; mapping rows cascade via FK.
        for id in &writes.connection_deletes {
            tx.execute("DELETE FROM connections WHERE id = ?1", params![id.0])
                .map_err(StoreError::Sqlite)?;
        }

        // 5. New connections, resolving pending file refs.
        for conn in &writes.new_connections {
            let file_id = resolve_file(&receipt.new_file_ids, conn.file)?;
            tx.execute(
                "INSERT INTO connections
                    (file_id, direction, start_line, end_line, code_snippet,
                     description, technology_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    file_id,
                    conn.direction.as_str(),
                    conn.start_line,
                    conn.end_line,
                    conn.code_snippet,
                    conn.description,
                    conn.technology_name,
                    now
                ],
            )
            .map_err(StoreError::Sqlite)?;
            receipt
                .new_connection_ids
                .push(ConnectionId(tx.last_insert_rowid()));
        }

        // 6. Mappings — always after every connection write.
        for mapping in &writes.new_mappings {
            let outgoing = resolve_conn(&receipt.new_connection_ids, mapping.outgoing)?;
            let incoming = resolve_conn(&receipt.new_connection_ids, mapping.incoming)?;
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO connection_mappings
                        (outgoing_id, incoming_id, confidence, technology_name, rationale, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        outgoing,
                        incoming,
                        mapping.confidence,
                        mapping.technology_name,
                        mapping.rationale,
                        now
                    ],
                )
                .map_err(StoreError::Sqlite)?;
            receipt.mappings_created += inserted as u64;
        }

        // 7. File deletes; connections and their mappings cascade.
        for id in &writes.file_deletes {
            tx.execute("DELETE FROM files WHERE id = ?1", params![id.0])
                .map_err(StoreError::Sqlite)?;
        }

        // 8. Consume the processed checkpoint rows, and only those.
        for id in &writes.checkpoint_deletes {
            tx.execute("DELETE FROM checkpoints WHERE id = ?1", params![id.0])
                .map_err(StoreError::Sqlite)?;
        }

        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(receipt)
    }
}

/// Resolve a file ref against the IDs inserted earlier in this commit.
fn resolve_file(new_file_ids: &[FileId], file: FileRef) -> crate::error::Result<i64> {
    match file {
        FileRef::Existing(id) => Ok(id.0),
        FileRef::New(i) => new_file_ids.get(i).map(|id| id.0).ok_or_else(|| {
            StoreError::InvalidRunWrites(format!("file ref New({i}) out of range")).into()
        }),
    }
}

/// Resolve a connection ref against the IDs inserted earlier in this commit.
fn resolve_conn(
    new_connection_ids: &[ConnectionId],
    cref: ConnectionRef,
) -> crate::error::Result<i64> {
    match cref {
        ConnectionRef::Existing(id) => Ok(id.0),
        ConnectionRef::New(i) => new_connection_ids.get(i).map(|id| id.0).ok_or_else(|| {
            StoreError::InvalidRunWrites(format!("connection ref New({i}) out of range")).into()
        }),
    }
}

/// Whether a SQLite error is a transient busy/locked condition.
fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

#[async_trait::async_trait]
impl GraphStore for SqliteStore {
    // ── Projects ───────────────────────────────────────────────────

    async fn register_project(
        &self,
        name: &str,
        root_path: &str,
        description: Option<&str>,
    ) -> crate::error::Result<ProjectId> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO projects (name, root_path, description, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, root_path, description, now],
        )
        .map_err(StoreError::Sqlite)?;

        let id: i64 = conn
            .query_row(
                "SELECT id FROM projects WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        Ok(ProjectId(id))
    }

    async fn project(&self, id: ProjectId) -> crate::error::Result<Option<Project>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM projects WHERE id = ?1",
            params![id.0],
            Self::row_to_project,
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(CrosswireError::Store)
    }

    async fn project_by_name(&self, name: &str) -> crate::error::Result<Option<Project>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM projects WHERE name = ?1",
            params![name],
            Self::row_to_project,
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(CrosswireError::Store)
    }

    async fn projects(&self) -> crate::error::Result<Vec<Project>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM projects ORDER BY id")
            .map_err(StoreError::Sqlite)?;
        let projects = stmt
            .query_map([], Self::row_to_project)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(projects)
    }

    async fn project_description(&self, id: ProjectId) -> crate::error::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT description FROM projects WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(CrosswireError::Store)
        .map(Option::flatten)
    }

    // ── Files ──────────────────────────────────────────────────────

    #[allow(clippy::cast_possible_wrap)]
    async fn upsert_file(
        &self,
        project_id: ProjectId,
        path: &str,
        language: &str,
        content_hash: u64,
    ) -> crate::error::Result<FileId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO files (project_id, path, language, content_hash)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_id, path) DO UPDATE SET
                language = excluded.language,
                content_hash = excluded.content_hash",
            params![project_id.0, path, language, content_hash as i64],
        )
        .map_err(StoreError::Sqlite)?;

        // Query the actual id — last_insert_rowid() is unreliable after
        // ON CONFLICT DO UPDATE.
        let id: i64 = conn
            .query_row(
                "SELECT id FROM files WHERE project_id = ?1 AND path = ?2",
                params![project_id.0, path],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        Ok(FileId(id))
    }

    async fn file_by_path(
        &self,
        project_id: ProjectId,
        path: &str,
    ) -> crate::error::Result<Option<SourceFile>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM files WHERE project_id = ?1 AND path = ?2",
            params![project_id.0, path],
            Self::row_to_file,
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(CrosswireError::Store)
    }

    async fn files_for_project(
        &self,
        project_id: ProjectId,
    ) -> crate::error::Result<Vec<SourceFile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM files WHERE project_id = ?1 ORDER BY id")
            .map_err(StoreError::Sqlite)?;
        let files = stmt
            .query_map(params![project_id.0], Self::row_to_file)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(files)
    }

    // ── Connections ────────────────────────────────────────────────

    async fn insert_connection(&self, conn_row: &Connection) -> crate::error::Result<ConnectionId> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO connections
                (file_id, direction, start_line, end_line, code_snippet,
                 description, technology_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                conn_row.file_id.0,
                conn_row.direction.as_str(),
                conn_row.start_line,
                conn_row.end_line,
                conn_row.code_snippet,
                conn_row.description,
                conn_row.technology_name,
                now
            ],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(ConnectionId(conn.last_insert_rowid()))
    }

    async fn connection(&self, id: ConnectionId) -> crate::error::Result<Option<Connection>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM connections WHERE id = ?1",
            params![id.0],
            Self::row_to_connection,
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(CrosswireError::Store)
    }

    async fn connections_for_file(
        &self,
        file_id: FileId,
    ) -> crate::error::Result<Vec<Connection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM connections WHERE file_id = ?1 ORDER BY id")
            .map_err(StoreError::Sqlite)?;
        let connections = stmt
            .query_map(params![file_id.0], Self::row_to_connection)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(connections)
    }

    async fn connections_for_project(
        &self,
        project_id: ProjectId,
        direction: Direction,
    ) -> crate::error::Result<Vec<Connection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.* FROM connections c
                 JOIN files f ON c.file_id = f.id
                 WHERE f.project_id = ?1 AND c.direction = ?2
                 ORDER BY c.id",
            )
            .map_err(StoreError::Sqlite)?;
        let connections = stmt
            .query_map(params![project_id.0, direction.as_str()], Self::row_to_connection)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(connections)
    }

    // ── Mappings ───────────────────────────────────────────────────

    async fn mappings(&self) -> crate::error::Result<Vec<ConnectionMapping>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM connection_mappings ORDER BY id")
            .map_err(StoreError::Sqlite)?;
        let mappings = stmt
            .query_map([], Self::row_to_mapping)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(mappings)
    }

    async fn mapping_pairs(
        &self,
    ) -> crate::error::Result<HashSet<(ConnectionId, ConnectionId)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT outgoing_id, incoming_id FROM connection_mappings")
            .map_err(StoreError::Sqlite)?;
        let pairs = stmt
            .query_map([], |row| {
                Ok((ConnectionId(row.get(0)?), ConnectionId(row.get(1)?)))
            })
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<HashSet<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(pairs)
    }

    // ── Checkpoint queue ───────────────────────────────────────────

    async fn append_checkpoint(
        &self,
        project_id: ProjectId,
        file_path: &str,
        change_kind: ChangeKind,
        old_content: Option<&str>,
        new_content: Option<&str>,
    ) -> crate::error::Result<CheckpointRowId> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO checkpoints
                (project_id, file_path, change_kind, old_content, new_content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project_id.0,
                file_path,
                change_kind.as_str(),
                old_content,
                new_content,
                now
            ],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(CheckpointRowId(conn.last_insert_rowid()))
    }

    async fn list_checkpoints(&self) -> crate::error::Result<Vec<CheckpointRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT * FROM checkpoints ORDER BY id")
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map([], Self::row_to_checkpoint)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(rows)
    }

    // ── Run commit ─────────────────────────────────────────────────

    async fn commit_run(&self, writes: RunWrites) -> crate::error::Result<CommitReceipt> {
        debug!(
            new_files = writes.new_files.len(),
            shifts = writes.connection_shifts.len(),
            deletes = writes.connection_deletes.len(),
            new_connections = writes.new_connections.len(),
            new_mappings = writes.new_mappings.len(),
            checkpoint_deletes = writes.checkpoint_deletes.len(),
            "Committing run writes"
        );

        match self.apply_run(&writes) {
            Err(CrosswireError::Store(StoreError::Sqlite(ref e))) if is_busy(e) => {
                warn!(error = %e, "Commit hit a busy database, retrying once");
                self.apply_run(&writes)
            }
            other => other,
        }
    }

    // ── Metrics ────────────────────────────────────────────────────

    async fn stats(&self) -> crate::error::Result<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let count = |table: &str| -> crate::error::Result<u64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(StoreError::Sqlite)
            .map_err(CrosswireError::Store)
        };

        Ok(StoreStats {
            projects: count("projects")?,
            files: count("files")?,
            connections: count("connections")?,
            mappings: count("connection_mappings")?,
            pending_checkpoints: count("checkpoints")?,
        })
    }
}
