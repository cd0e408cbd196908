/// Top-level crosswire error type.
#[derive(thiserror::Error, Debug)]
pub enum CrosswireError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Splitter error: {0}")]
    Splitter(#[from] SplitterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Clean abort in response to a cancellation signal. Not a failure:
    /// no writes happen and the checkpoint stays pending.
    #[error("Run cancelled")]
    Cancelled,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A pending `New(i)` reference in the run's writes points past the
    /// end of the corresponding insert list.
    #[error("Invalid run writes: {0}")]
    InvalidRunWrites(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CheckpointError {
    /// A checkpoint row carries contents inconsistent with its change kind
    /// (e.g. `modified` without `old_content`). The run aborts without
    /// deleting any rows.
    #[error("Corrupt checkpoint row {row_id}: {reason}")]
    InputCorruption { row_id: i64, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum DiffError {
    /// The computed line map violates its internal invariants. Indicates a
    /// bug in the diff, never bad input.
    #[error("Diff invariant violated for {path}: {detail}")]
    InvariantViolation { path: String, detail: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    /// A refreshed or splitter-returned snippet is not the exact slice of
    /// the file's new content.
    #[error("Snippet for connection range {start}..{end} in {path} does not match file content")]
    SnippetMismatch {
        path: String,
        start: u32,
        end: u32,
    },

    #[error("Connection {connection_id} has an invalid line range {start}..{end}")]
    InvalidRange {
        connection_id: i64,
        start: u32,
        end: u32,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum SplitterError {
    /// Retryable: timeouts, rate limits, transport hiccups.
    #[error("Transient splitter failure: {0}")]
    Transient(String),

    /// Not retryable: bad request, auth failure, malformed response.
    #[error("Permanent splitter failure: {0}")]
    Permanent(String),

    #[error("Splitter failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Splitter response parse error: {0}")]
    Parse(String),
}

impl SplitterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Unknown splitter provider: {0}. Use: anthropic, openai, custom")]
    UnknownProvider(String),
}

pub type Result<T> = std::result::Result<T, CrosswireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitter_transient_classification() {
        assert!(SplitterError::Transient("429".into()).is_transient());
        assert!(!SplitterError::Permanent("401".into()).is_transient());
        assert!(
            !SplitterError::RetriesExhausted {
                attempts: 3,
                last: "timeout".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn error_messages_carry_identifiers() {
        let err = CrosswireError::Checkpoint(CheckpointError::InputCorruption {
            row_id: 17,
            reason: "modified row without old_content".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("17"), "message should name the row: {msg}");

        let err = CrosswireError::Reconcile(ReconcileError::SnippetMismatch {
            path: "svc/api.go".into(),
            start: 4,
            end: 9,
        });
        assert!(err.to_string().contains("svc/api.go"));
    }
}
