//! Splitter driving — turns batched snippet jobs into connection rows via
//! the external code-to-connections analyzer.
//!
//! The splitter itself is interchangeable (see [`providers`] for the
//! LLM-backed implementations); this module owns retries, bounded
//! concurrency, and response validation. Batches are all-or-nothing: a
//! batch either yields its full set of pending connection inserts or the
//! run aborts.

pub mod providers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::diff::split_lines;
use crate::error::{CrosswireError, ReconcileError, SplitterError};
use crate::run::CancelToken;
use crate::types::{Direction, NewConnection, ProjectId};

// ── Wire format ────────────────────────────────────────────────────

/// One code range in a split request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSnippet {
    pub file_path: String,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_description: Option<String>,
}

/// A request to the splitter: the batch's snippets plus project context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_description: Option<String>,
    pub snippets: Vec<SplitSnippet>,
}

/// A connection record derived by the splitter, keyed back to its snippet.
/// Line numbers are absolute in the source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedConnection {
    pub source_index: usize,
    pub direction: Direction,
    pub start_line: u32,
    pub end_line: u32,
    pub code_snippet: String,
    pub description: String,
    pub technology_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitResponse {
    pub connections: Vec<DerivedConnection>,
}

/// The external analyzer. Treated as a pure function up to retries.
#[async_trait::async_trait]
pub trait Splitter: Send + Sync {
    /// Human-readable implementation name, for logs.
    fn name(&self) -> &str;

    async fn split(&self, request: &SplitRequest) -> Result<SplitResponse, SplitterError>;
}

// ── Driver ─────────────────────────────────────────────────────────

/// Accumulated result of running every batch through the splitter.
#[derive(Debug, Default)]
pub struct SplitOutcome {
    pub connections: Vec<NewConnection>,
    pub calls: u64,
}

/// Runs batches against a [`Splitter`] with bounded concurrency and
/// exponential backoff on transient failures.
pub struct SplitterDriver {
    splitter: Arc<dyn Splitter>,
    retries: u32,
    concurrency: usize,
}

impl SplitterDriver {
    pub fn new(splitter: Arc<dyn Splitter>, retries: u32, concurrency: u32) -> Self {
        Self {
            splitter,
            retries: retries.max(1),
            concurrency: concurrency.max(1) as usize,
        }
    }

    /// Run all batches. `contents` maps `(project, path)` to the file's
    /// current content, used to verify returned snippets byte-for-byte.
    ///
    /// Results come back in batch order regardless of completion order.
    /// On cancellation, in-flight batches finish and their results are
    /// discarded; no new batches are dispatched.
    pub async fn run_batches(
        &self,
        batches: Vec<Batch>,
        descriptions: HashMap<ProjectId, String>,
        contents: Arc<HashMap<(ProjectId, String), String>>,
        cancel: &CancelToken,
    ) -> crate::error::Result<SplitOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(usize, crate::error::Result<(Vec<NewConnection>, u64)>)> =
            JoinSet::new();
        let mut cancelled = false;

        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let splitter = Arc::clone(&self.splitter);
            let semaphore = Arc::clone(&semaphore);
            let contents = Arc::clone(&contents);
            let description = descriptions.get(&batch.project_id).cloned();
            let retries = self.retries;

            tasks.spawn(async move {
                // Closed only when the driver is dropped mid-run.
                let Ok(_permit) = semaphore.acquire().await else {
                    return (
                        index,
                        Err(SplitterError::Transient("semaphore closed".into()).into()),
                    );
                };
                let result =
                    run_one_batch(&*splitter, &batch, description.as_deref(), &contents, retries)
                        .await;
                (index, result)
            });
        }

        let mut results: Vec<(usize, Vec<NewConnection>)> = Vec::new();
        let mut calls = 0u64;
        let mut first_error: Option<CrosswireError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok((connections, batch_calls)))) => {
                    calls += batch_calls;
                    results.push((index, connections));
                }
                Ok((_, Err(err))) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error =
                            Some(SplitterError::Permanent(format!("task panic: {join_err}")).into());
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        if cancelled || cancel.is_cancelled() {
            return Err(CrosswireError::Cancelled);
        }

        results.sort_by_key(|(index, _)| *index);
        Ok(SplitOutcome {
            connections: results.into_iter().flat_map(|(_, c)| c).collect(),
            calls,
        })
    }
}

/// Call the splitter for one batch, retrying transient failures, and
/// validate everything it returned.
async fn run_one_batch(
    splitter: &dyn Splitter,
    batch: &Batch,
    project_description: Option<&str>,
    contents: &HashMap<(ProjectId, String), String>,
    retries: u32,
) -> crate::error::Result<(Vec<NewConnection>, u64)> {
    let request = SplitRequest {
        project_description: project_description.map(str::to_string),
        snippets: batch
            .jobs
            .iter()
            .map(|job| SplitSnippet {
                file_path: job.path.clone(),
                language: job.language.clone(),
                start_line: job.start_line,
                end_line: job.end_line,
                code: job.code.clone(),
                prior_description: job.prior_description.clone(),
            })
            .collect(),
    };

    let mut calls = 0u64;
    let mut attempt = 0u32;
    let response = loop {
        attempt += 1;
        calls += 1;
        match splitter.split(&request).await {
            Ok(response) => break response,
            Err(err) if err.is_transient() && attempt < retries => {
                let delay = Duration::from_millis(100u64 << (attempt - 1));
                warn!(
                    splitter = splitter.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient splitter failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.is_transient() => {
                return Err(SplitterError::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        }
    };

    debug!(
        splitter = splitter.name(),
        snippets = batch.jobs.len(),
        connections = response.connections.len(),
        calls,
        "Batch split complete"
    );

    let mut out = Vec::with_capacity(response.connections.len());
    for derived in response.connections {
        let job = batch.jobs.get(derived.source_index).ok_or_else(|| {
            SplitterError::Parse(format!(
                "source_index {} out of range for batch of {}",
                derived.source_index,
                batch.jobs.len()
            ))
        })?;
        let content = contents
            .get(&(job.project_id, job.path.clone()))
            .map(String::as_str)
            .unwrap_or_default();
        validate_snippet(content, &derived, &job.path)?;
        out.push(NewConnection {
            file: job.file,
            project_id: job.project_id,
            direction: derived.direction,
            start_line: derived.start_line,
            end_line: derived.end_line,
            code_snippet: derived.code_snippet,
            description: derived.description,
            technology_name: derived.technology_name,
        });
    }
    Ok((out, calls))
}

/// Verify that a derived connection's snippet is the exact slice of the
/// file's current content. A mismatch means the analyzer hallucinated or
/// drifted from the input; the run must abort rather than persist it.
fn validate_snippet(
    content: &str,
    derived: &DerivedConnection,
    path: &str,
) -> Result<(), ReconcileError> {
    let lines = split_lines(content);
    let mismatch = || ReconcileError::SnippetMismatch {
        path: path.to_string(),
        start: derived.start_line,
        end: derived.end_line,
    };

    #[allow(clippy::cast_possible_truncation)]
    let len = lines.len() as u32;
    if derived.start_line < 1 || derived.end_line < derived.start_line || derived.end_line > len {
        return Err(mismatch());
    }
    let slice =
        lines[(derived.start_line - 1) as usize..derived.end_line as usize].join("\n");
    if slice != derived.code_snippet {
        return Err(mismatch());
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────
