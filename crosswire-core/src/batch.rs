//! Batch planning — packs snippet jobs into budgeted splitter batches.
//!
//! Batches never mix projects. Within a project, jobs from modified files
//! run before jobs from added files so the matcher sees reconciled state
//! as early as possible.

use crate::types::{JobOrigin, ProjectId, SnippetJob};

/// One splitter call's worth of work.
#[derive(Debug, Clone)]
pub struct Batch {
    pub project_id: ProjectId,
    pub jobs: Vec<SnippetJob>,
}

impl Batch {
    pub fn line_count(&self) -> u64 {
        self.jobs.iter().map(|j| u64::from(j.line_count())).sum()
    }
}

/// Pack one project's jobs into batches whose summed line counts stay
/// within `budget`. A single job larger than the budget forms its own
/// batch rather than being split.
pub fn plan_batches(project_id: ProjectId, jobs: Vec<SnippetJob>, budget: u32) -> Vec<Batch> {
    let mut ordered = jobs;
    // Stable: preserves reconciliation order within each origin class.
    ordered.sort_by_key(|job| match job.origin {
        JobOrigin::ModifiedFile => 0u8,
        JobOrigin::AddedFile => 1u8,
    });

    let budget = u64::from(budget);
    let mut batches: Vec<Batch> = Vec::new();
    let mut current: Vec<SnippetJob> = Vec::new();
    let mut current_lines = 0u64;

    for job in ordered {
        let lines = u64::from(job.line_count());
        if !current.is_empty() && current_lines + lines > budget {
            batches.push(Batch {
                project_id,
                jobs: std::mem::take(&mut current),
            });
            current_lines = 0;
        }
        current_lines += lines;
        current.push(job);
        // An oversized job is flushed alone immediately.
        if current_lines > budget {
            batches.push(Batch {
                project_id,
                jobs: std::mem::take(&mut current),
            });
            current_lines = 0;
        }
    }

    if !current.is_empty() {
        batches.push(Batch {
            project_id,
            jobs: current,
        });
    }

    batches
}
