/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for the crosswire `SQLite` database.
///
/// Line-range and direction invariants are enforced here with CHECK
/// constraints so the engine never observes a malformed connection row.
/// Mapping rows cascade away when either endpoint connection is deleted.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS crosswire_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Indexed projects
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    root_path TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

-- Source files, relative to their project root
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    language TEXT NOT NULL,
    content_hash INTEGER NOT NULL,
    UNIQUE(project_id, path)
);
CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id);

-- Integration points anchored to a line range in one file
CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    direction TEXT NOT NULL CHECK (direction IN ('incoming', 'outgoing')),
    start_line INTEGER NOT NULL CHECK (start_line >= 1),
    end_line INTEGER NOT NULL CHECK (end_line >= start_line),
    code_snippet TEXT NOT NULL,
    description TEXT NOT NULL,
    technology_name TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_connections_file ON connections(file_id);
CREATE INDEX IF NOT EXISTS idx_connections_direction ON connections(direction);
CREATE INDEX IF NOT EXISTS idx_connections_technology ON connections(technology_name);

-- Cross-project matches between an outgoing and an incoming connection
CREATE TABLE IF NOT EXISTS connection_mappings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    outgoing_id INTEGER NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
    incoming_id INTEGER NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    technology_name TEXT NOT NULL,
    rationale TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(outgoing_id, incoming_id)
);
CREATE INDEX IF NOT EXISTS idx_mappings_outgoing ON connection_mappings(outgoing_id);
CREATE INDEX IF NOT EXISTS idx_mappings_incoming ON connection_mappings(incoming_id);

-- Pending file changes written by external watchers (read-consume-delete)
CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    change_kind TEXT NOT NULL CHECK (change_kind IN ('added', 'modified', 'deleted')),
    old_content TEXT,
    new_content TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_checkpoints_project ON checkpoints(project_id);
";

/// `SQLite` PRAGMAs for performance and integrity.
pub const PRAGMAS_SQL: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA foreign_keys = ON;
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_executes_on_in_memory_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"projects".to_string()));
        assert!(tables.contains(&"files".to_string()));
        assert!(tables.contains(&"connections".to_string()));
        assert!(tables.contains(&"connection_mappings".to_string()));
        assert!(tables.contains(&"checkpoints".to_string()));
        assert!(tables.contains(&"crosswire_meta".to_string()));
    }

    #[test]
    fn connection_check_constraints_reject_bad_rows() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        conn.execute(
            "INSERT INTO projects (name, root_path, created_at) VALUES ('p', '/p', '2026-01-01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO files (project_id, path, language, content_hash)
             VALUES (1, 'a.rs', 'rust', 0)",
            [],
        )
        .unwrap();

        // end_line < start_line must be rejected
        let result = conn.execute(
            "INSERT INTO connections
                (file_id, direction, start_line, end_line, code_snippet, description, technology_name, created_at)
             VALUES (1, 'outgoing', 5, 2, '', '', 'HTTP/GET', '2026-01-01')",
            [],
        );
        assert!(result.is_err(), "inverted range should violate CHECK");

        // Unknown direction must be rejected
        let result = conn.execute(
            "INSERT INTO connections
                (file_id, direction, start_line, end_line, code_snippet, description, technology_name, created_at)
             VALUES (1, 'sideways', 1, 1, '', '', 'HTTP/GET', '2026-01-01')",
            [],
        );
        assert!(result.is_err(), "unknown direction should violate CHECK");
    }

    #[test]
    fn schema_version_is_set() {
        assert_eq!(SCHEMA_VERSION, "1");
    }
}
