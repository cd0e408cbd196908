// Integration test utilities and fixtures for the crosswire engine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crosswire_core::config::CrosswireConfig;
use crosswire_core::error::SplitterError;
use crosswire_core::run::{Coordinator, RunReport};
use crosswire_core::splitter::{
    DerivedConnection, SplitRequest, SplitResponse, Splitter,
};
use crosswire_core::store::GraphStore;
use crosswire_core::store::sqlite::SqliteStore;
use crosswire_core::types::{
    Connection, ConnectionId, Direction, FileId, ProjectId, content_hash, language_for_path,
};

/// Splitter double fed from a queue of canned results; records every
/// request it sees. An exhausted queue answers with an empty response.
pub struct ScriptedSplitter {
    responses: Mutex<VecDeque<Result<SplitResponse, SplitterError>>>,
    requests: Mutex<Vec<SplitRequest>>,
    calls: AtomicU64,
}

impl ScriptedSplitter {
    pub fn new(responses: Vec<Result<SplitResponse, SplitterError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
        })
    }

    /// A splitter that must stay idle; exhaustion still answers empty, so
    /// pair this with an assertion on [`ScriptedSplitter::calls`].
    pub fn idle() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SplitRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Splitter for ScriptedSplitter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn split(&self, request: &SplitRequest) -> Result<SplitResponse, SplitterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(SplitResponse::default()))
    }
}

/// Splitter double that fails every call the same way.
pub struct AlwaysFailingSplitter {
    pub transient: bool,
    calls: AtomicU64,
}

impl AlwaysFailingSplitter {
    pub fn permanent() -> Arc<Self> {
        Arc::new(Self {
            transient: false,
            calls: AtomicU64::new(0),
        })
    }

    pub fn transient() -> Arc<Self> {
        Arc::new(Self {
            transient: true,
            calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Splitter for AlwaysFailingSplitter {
    fn name(&self) -> &str {
        "always-failing"
    }

    async fn split(&self, _request: &SplitRequest) -> Result<SplitResponse, SplitterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.transient {
            Err(SplitterError::Transient("scripted timeout".into()))
        } else {
            Err(SplitterError::Permanent("scripted outage".into()))
        }
    }
}

/// The exact `lo..=hi` line slice of content, as stored in `code_snippet`.
pub fn snippet_of(content: &str, lo: u32, hi: u32) -> String {
    let lines: Vec<&str> = {
        let trimmed = content.strip_suffix('\n').unwrap_or(content);
        if content.is_empty() {
            Vec::new()
        } else {
            trimmed.split('\n').collect()
        }
    };
    lines[(lo - 1) as usize..hi as usize].join("\n")
}

/// Shorthand for a splitter-derived connection whose snippet is the exact
/// slice of `file_content`.
pub fn derived(
    source_index: usize,
    direction: Direction,
    lo: u32,
    hi: u32,
    file_content: &str,
    description: &str,
    technology: &str,
) -> DerivedConnection {
    DerivedConnection {
        source_index,
        direction,
        start_line: lo,
        end_line: hi,
        code_snippet: snippet_of(file_content, lo, hi),
        description: description.to_string(),
        technology_name: technology.to_string(),
    }
}

pub async fn seed_project(store: &SqliteStore, name: &str, description: &str) -> ProjectId {
    store
        .register_project(name, &format!("/work/{name}"), Some(description))
        .await
        .expect("register project")
}

pub async fn seed_file(
    store: &SqliteStore,
    project_id: ProjectId,
    path: &str,
    content: &str,
) -> FileId {
    store
        .upsert_file(
            project_id,
            path,
            language_for_path(path),
            content_hash(content.as_bytes()),
        )
        .await
        .expect("seed file")
}

#[allow(clippy::too_many_arguments)]
pub async fn seed_connection(
    store: &SqliteStore,
    file_id: FileId,
    direction: Direction,
    lo: u32,
    hi: u32,
    content: &str,
    description: &str,
    technology: &str,
) -> ConnectionId {
    store
        .insert_connection(&Connection {
            id: ConnectionId(0),
            file_id,
            direction,
            start_line: lo,
            end_line: hi,
            code_snippet: snippet_of(content, lo, hi),
            description: description.to_string(),
            technology_name: technology.to_string(),
            created_at: chrono::Utc::now(),
        })
        .await
        .expect("seed connection")
}

/// Seed a mapping row between two existing connections.
pub async fn seed_mapping(
    store: &SqliteStore,
    outgoing: ConnectionId,
    incoming: ConnectionId,
    technology: &str,
) {
    use crosswire_core::types::{ConnectionRef, NewMapping, RunWrites};
    store
        .commit_run(RunWrites {
            new_mappings: vec![NewMapping {
                outgoing: ConnectionRef::Existing(outgoing),
                incoming: ConnectionRef::Existing(incoming),
                confidence: 0.9,
                technology_name: technology.to_string(),
                rationale: None,
            }],
            ..Default::default()
        })
        .await
        .expect("seed mapping");
}

/// Run the engine with default configuration.
pub async fn run_engine(
    store: &SqliteStore,
    splitter: Arc<dyn Splitter>,
) -> crosswire_core::error::Result<RunReport> {
    Coordinator::new(CrosswireConfig::default(), splitter)
        .run(store)
        .await
}

/// Assert P1 for one file: every surviving connection's snippet equals the
/// exact line slice of the file's current content.
pub async fn assert_snippets_exact(store: &SqliteStore, file_id: FileId, content: &str) {
    for conn in store
        .connections_for_file(file_id)
        .await
        .expect("read connections")
    {
        assert_eq!(
            conn.code_snippet,
            snippet_of(content, conn.start_line, conn.end_line),
            "connection {} snippet drifted from file content",
            conn.id
        );
    }
}
