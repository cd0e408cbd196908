//! Connection reconciliation — applies a file diff to every connection
//! anchored in the file.
//!
//! Each connection lands in one of three buckets: survive-shift (line range
//! updated in place, code unchanged), delete, or delete-and-re-derive via a
//! [`SnippetJob`]. The classifier is pure: it only accumulates intended
//! writes, which the coordinator commits at the end of the run.

use std::collections::BTreeSet;

use tracing::debug;

use crate::diff::{FileDiff, ReplacedRange, diff_lines, split_lines};
use crate::error::ReconcileError;
use crate::types::{
    Connection, ConnectionId, FileRef, JobOrigin, ProjectId, ShiftUpdate, SnippetJob, SourceFile,
    language_for_path,
};

/// The three-way output of reconciling one file.
#[derive(Debug, Clone, Default)]
pub struct FileOutcome {
    pub shifts: Vec<ShiftUpdate>,
    pub deletes: Vec<ConnectionId>,
    pub jobs: Vec<SnippetJob>,
}

/// How a replaced range overlaps a connection's old span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlapCase {
    /// The replacement fully covers the connection.
    Covers,
    /// The replacement overlaps and extends beyond at least one boundary.
    Extends,
    /// The replacement is strictly inside the connection.
    Inside,
}

fn classify(range: &ReplacedRange, c_lo: u32, c_hi: u32) -> Option<OverlapCase> {
    if range.old_hi < c_lo || range.old_lo > c_hi {
        return None;
    }
    if range.old_lo <= c_lo && range.old_hi >= c_hi {
        Some(OverlapCase::Covers)
    } else if c_lo < range.old_lo && range.old_hi < c_hi {
        Some(OverlapCase::Inside)
    } else {
        Some(OverlapCase::Extends)
    }
}

/// Join the 1-based inclusive line range of pre-split content.
fn slice_lines(lines: &[&str], lo: u32, hi: u32) -> String {
    lines[(lo - 1) as usize..hi as usize].join("\n")
}

/// Grow a range over nearby added lines until it stops moving. An added
/// line within `adjacency` of a boundary pulls the boundary onto it, which
/// can expose further added lines.
fn extend_by_added(lo: &mut u32, hi: &mut u32, added: &BTreeSet<u32>, adjacency: u32) {
    loop {
        let mut grew = false;
        let window_lo = lo.saturating_sub(adjacency).max(1);
        if let Some(&line) = added.range(window_lo..*lo).next() {
            *lo = line;
            grew = true;
        }
        if let Some(&line) = added.range(*hi + 1..=*hi + adjacency).next_back() {
            *hi = line;
            grew = true;
        }
        if !grew {
            break;
        }
    }
}

/// Union-merge overlapping or touching ranges; input sorted by `lo`.
fn merge_ranges(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        match merged.last_mut() {
            Some(last) if lo <= last.1 + 1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// Reconcile the connections of a modified file against its diff.
///
/// `connections` must be in ascending ID order; outputs preserve it.
#[allow(clippy::too_many_lines)]
pub fn reconcile_modified_file(
    project_id: ProjectId,
    file: &SourceFile,
    connections: &[Connection],
    old_content: &str,
    new_content: &str,
    adjacency: u32,
) -> Result<FileOutcome, crate::error::CrosswireError> {
    let diff = diff_lines(old_content, new_content);
    diff.validate(&file.path)?;

    let new_lines = split_lines(new_content);
    let mut outcome = FileOutcome::default();
    // New-file spans of surviving connections; added runs near these are
    // part of an already-analyzed unit and spawn no standalone job.
    let mut surviving_spans: Vec<(u32, u32)> = Vec::new();

    for conn in connections {
        if conn.start_line < 1 || conn.end_line > diff.old_len || conn.start_line > conn.end_line {
            return Err(ReconcileError::InvalidRange {
                connection_id: conn.id.0,
                start: conn.start_line,
                end: conn.end_line,
            }
            .into());
        }

        let (c_lo, c_hi) = (conn.start_line, conn.end_line);
        let matching: Vec<(&ReplacedRange, OverlapCase)> = diff
            .replaced_ranges
            .iter()
            .filter_map(|r| classify(r, c_lo, c_hi).map(|case| (r, case)))
            .collect();

        if matching.is_empty() {
            reconcile_unreplaced(project_id, file, conn, &diff, &new_lines, adjacency, &mut outcome, &mut surviving_spans);
            continue;
        }

        // Cases 1-3: the connection is deleted; each matching range
        // contributes a new-side range per its own case, merged by union.
        outcome.deletes.push(conn.id);

        // The first matching rule (ascending old_lo) governs the job's
        // prior_description; only a contained replacement carries context.
        let first_case = matching[0].1;
        let prior = (first_case == OverlapCase::Inside).then(|| conn.description.clone());
        let extend = matching
            .iter()
            .any(|(_, case)| *case != OverlapCase::Inside);

        let mut raw: Vec<(u32, u32)> = Vec::new();
        for (range, case) in &matching {
            match case {
                OverlapCase::Covers => raw.push((range.new_lo, range.new_hi)),
                OverlapCase::Extends => {
                    let lo_img = diff.nearest_surviving(c_lo).unwrap_or(range.new_lo);
                    let hi_img = diff.nearest_surviving(c_hi).unwrap_or(range.new_hi);
                    raw.push((range.new_lo.min(lo_img), range.new_hi.max(hi_img)));
                }
                OverlapCase::Inside => {
                    let lo_img = diff.nearest_surviving(c_lo).unwrap_or(range.new_lo);
                    let hi_img = diff.nearest_surviving(c_hi).unwrap_or(range.new_hi);
                    raw.push((lo_img.min(hi_img), lo_img.max(hi_img)));
                }
            }
        }

        for (mut lo, mut hi) in merge_ranges(raw) {
            if extend {
                extend_by_added(&mut lo, &mut hi, &diff.added, adjacency);
            }
            hi = hi.min(diff.new_len);
            if lo < 1 || lo > hi {
                continue;
            }
            outcome.jobs.push(SnippetJob {
                file: FileRef::Existing(file.id),
                project_id,
                path: file.path.clone(),
                language: file.language.clone(),
                start_line: lo,
                end_line: hi,
                code: slice_lines(&new_lines, lo, hi),
                prior_description: prior.clone(),
                origin: JobOrigin::ModifiedFile,
            });
        }
    }

    emit_added_run_jobs(project_id, file, &diff, &new_lines, adjacency, &surviving_spans, &mut outcome);

    debug!(
        file = %file.path,
        shifts = outcome.shifts.len(),
        deletes = outcome.deletes.len(),
        jobs = outcome.jobs.len(),
        "Reconciled modified file"
    );
    Ok(outcome)
}

/// Handle a connection no replaced range overlaps: clean shift, interior
/// change, or destroyed boundary.
#[allow(clippy::too_many_arguments)]
fn reconcile_unreplaced(
    project_id: ProjectId,
    file: &SourceFile,
    conn: &Connection,
    diff: &FileDiff,
    new_lines: &[&str],
    adjacency: u32,
    outcome: &mut FileOutcome,
    surviving_spans: &mut Vec<(u32, u32)>,
) {
    let (c_lo, c_hi) = (conn.start_line, conn.end_line);

    let (Some(new_lo), Some(new_hi)) = (diff.map(c_lo), diff.map(c_hi)) else {
        // A boundary line was destroyed without a replacement: re-derive
        // around the nearest surviving lines. With no surviving line in
        // the file there is nothing left to analyze.
        outcome.deletes.push(conn.id);
        let (Some(lo_img), Some(hi_img)) =
            (diff.nearest_surviving(c_lo), diff.nearest_surviving(c_hi))
        else {
            return;
        };
        let (mut lo, mut hi) = (lo_img.min(hi_img), lo_img.max(hi_img));
        extend_by_added(&mut lo, &mut hi, &diff.added, adjacency);
        outcome.jobs.push(SnippetJob {
            file: FileRef::Existing(file.id),
            project_id,
            path: file.path.clone(),
            language: file.language.clone(),
            start_line: lo,
            end_line: hi,
            code: slice_lines(new_lines, lo, hi),
            prior_description: None,
            origin: JobOrigin::ModifiedFile,
        });
        return;
    };

    let interior_insert = diff.added.range(new_lo..=new_hi).next().is_some();
    let snippet = slice_lines(new_lines, new_lo, new_hi);
    // Byte-exact on purpose: whitespace-only edits inside the span must
    // re-derive, matching the raw slice comparison of the original.
    if interior_insert || snippet != conn.code_snippet {
        outcome.deletes.push(conn.id);
        outcome.jobs.push(SnippetJob {
            file: FileRef::Existing(file.id),
            project_id,
            path: file.path.clone(),
            language: file.language.clone(),
            start_line: new_lo,
            end_line: new_hi,
            code: snippet,
            prior_description: Some(conn.description.clone()),
            origin: JobOrigin::ModifiedFile,
        });
        return;
    }

    surviving_spans.push((new_lo, new_hi));
    if new_lo != c_lo || new_hi != c_hi {
        outcome.shifts.push(ShiftUpdate {
            connection_id: conn.id,
            start_line: new_lo,
            end_line: new_hi,
            code_snippet: snippet,
        });
    }
}

/// Emit jobs for maximal clusters of purely-added lines that are not
/// already covered by a re-analysis job and not within `adjacency` of a
/// surviving connection.
fn emit_added_run_jobs(
    project_id: ProjectId,
    file: &SourceFile,
    diff: &FileDiff,
    new_lines: &[&str],
    adjacency: u32,
    surviving_spans: &[(u32, u32)],
    outcome: &mut FileOutcome,
) {
    let covered = |line: u32| -> bool {
        outcome
            .jobs
            .iter()
            .any(|job| job.start_line <= line && line <= job.end_line)
            || surviving_spans.iter().any(|&(lo, hi)| {
                lo.saturating_sub(adjacency) <= line && line <= hi + adjacency
            })
    };

    let loose: Vec<u32> = diff.added.iter().copied().filter(|&l| !covered(l)).collect();
    if loose.is_empty() {
        return;
    }

    // Cluster: runs separated by a gap of at most `adjacency` lines merge.
    let mut clusters: Vec<(u32, u32)> = Vec::new();
    for line in loose {
        match clusters.last_mut() {
            Some(last) if line - last.1 <= adjacency + 1 => last.1 = line,
            _ => clusters.push((line, line)),
        }
    }

    for (lo, hi) in clusters {
        outcome.jobs.push(SnippetJob {
            file: FileRef::Existing(file.id),
            project_id,
            path: file.path.clone(),
            language: file.language.clone(),
            start_line: lo,
            end_line: hi,
            code: slice_lines(new_lines, lo, hi),
            prior_description: None,
            origin: JobOrigin::ModifiedFile,
        });
    }
}

/// An added file contributes one job covering its entire content.
///
/// The file row does not exist yet; `file` is the pending-insert index the
/// coordinator allocated for it.
pub fn added_file_job(
    project_id: ProjectId,
    file: FileRef,
    path: &str,
    new_content: &str,
) -> Option<SnippetJob> {
    let lines = split_lines(new_content);
    if lines.is_empty() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let end_line = lines.len() as u32;
    Some(SnippetJob {
        file,
        project_id,
        path: path.to_string(),
        language: language_for_path(path).to_string(),
        start_line: 1,
        end_line,
        code: lines.join("\n"),
        prior_description: None,
        origin: JobOrigin::AddedFile,
    })
}

/// A deleted file contributes no job; every connection anchored in it is
/// deleted (mappings cascade at commit time).
pub fn deleted_file_outcome(connections: &[Connection]) -> FileOutcome {
    FileOutcome {
        deletes: connections.iter().map(|c| c.id).collect(),
        ..Default::default()
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileId;
    use chrono::Utc;

    const ADJACENCY: u32 = 3;

    fn file() -> SourceFile {
        SourceFile {
            id: FileId(1),
            project_id: ProjectId(1),
            path: "src/handler.rs".to_string(),
            language: "rust".to_string(),
            content_hash: 0,
        }
    }

    fn conn(id: i64, lo: u32, hi: u32, snippet: &str, description: &str) -> Connection {
        Connection {
            id: ConnectionId(id),
            file_id: FileId(1),
            direction: crate::types::Direction::Outgoing,
            start_line: lo,
            end_line: hi,
            code_snippet: snippet.to_string(),
            description: description.to_string(),
            technology_name: "HTTP/GET".to_string(),
            created_at: Utc::now(),
        }
    }

    fn run(
        connections: &[Connection],
        old: &str,
        new: &str,
    ) -> FileOutcome {
        reconcile_modified_file(ProjectId(1), &file(), connections, old, new, ADJACENCY).unwrap()
    }

    #[test]
    fn clean_shift_updates_lines_only() {
        // S1: insert a line above the connection.
        let old = "a\nb\nCONN\nd\n";
        let new = "a\na2\nb\nCONN\nd\n";
        let outcome = run(&[conn(1, 3, 3, "CONN", "X")], old, new);

        assert_eq!(
            outcome.shifts,
            vec![ShiftUpdate {
                connection_id: ConnectionId(1),
                start_line: 4,
                end_line: 4,
                code_snippet: "CONN".to_string(),
            }]
        );
        assert!(outcome.deletes.is_empty());
        assert!(outcome.jobs.is_empty(), "no splitter work for a clean shift");
    }

    #[test]
    fn unmoved_connection_produces_no_writes() {
        // The appended line is still within adjacency of the span, so it
        // neither shifts the connection nor spawns a job.
        let old = "CONN\nx\ny\n";
        let new = "CONN\nx\ny\nz\n";
        let outcome = run(&[conn(1, 1, 1, "CONN", "X")], old, new);
        assert!(outcome.shifts.is_empty());
        assert!(outcome.deletes.is_empty());
        assert!(outcome.jobs.is_empty());
    }

    #[test]
    fn contained_replacement_is_case_3() {
        // S2: connection spans 10..20, old line 15 replaced by three lines.
        let old_lines: Vec<String> = (1..=25).map(|i| format!("line{i}")).collect();
        let mut new_lines: Vec<String> = Vec::new();
        for i in 1..=25 {
            if i == 15 {
                new_lines.extend(["X1".to_string(), "X2".to_string(), "X3".to_string()]);
            } else {
                new_lines.push(format!("line{i}"));
            }
        }
        let old = old_lines.join("\n");
        let new = new_lines.join("\n");
        let snippet = old_lines[9..20].join("\n");

        let outcome = run(&[conn(7, 10, 20, &snippet, "validates user")], &old, &new);

        assert_eq!(outcome.deletes, vec![ConnectionId(7)]);
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert_eq!((job.start_line, job.end_line), (10, 22));
        assert_eq!(job.prior_description.as_deref(), Some("validates user"));
        assert!(outcome.shifts.is_empty());
    }

    #[test]
    fn covering_replacement_is_case_1() {
        // Replacement spans lines 1..4, connection sits inside at 2..3.
        let old = "a\nCONN1\nCONN2\nd\ne\n";
        let new = "X\nY\ne\n";
        let outcome = run(&[conn(1, 2, 3, "CONN1\nCONN2", "conn")], old, new);

        assert_eq!(outcome.deletes, vec![ConnectionId(1)]);
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert_eq!((job.start_line, job.end_line), (1, 2));
        assert_eq!(job.prior_description, None, "full coverage carries no prior context");
        assert_eq!(job.code, "X\nY");
    }

    #[test]
    fn overlapping_replacement_is_case_2() {
        // Replacement 4..6 overlaps connection 2..4 and extends below it.
        let old = "a\nC1\nC2\nC3\ntail1\ntail2\n";
        let new = "a\nC1\nC2\nNEW1\nNEW2\ntail2\n";
        let outcome = run(&[conn(3, 2, 4, "C1\nC2\nC3", "conn")], old, new);

        assert_eq!(outcome.deletes, vec![ConnectionId(3)]);
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        // Range reaches back to the connection's surviving start.
        assert_eq!(job.start_line, 2);
        assert!(job.end_line >= 5);
        assert_eq!(job.prior_description, None);
    }

    #[test]
    fn interior_deletion_promotes_to_reanalysis() {
        // No replaced range, but an interior line of the connection vanishes:
        // the refreshed snippet differs byte-for-byte, so case 4 promotes.
        let old = "a\nC1\nC2\nC3\nz\n";
        let new = "a\nC1\nC3\nz\n";
        let outcome = run(&[conn(2, 2, 4, "C1\nC2\nC3", "queue consumer")], old, new);

        assert_eq!(outcome.deletes, vec![ConnectionId(2)]);
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert_eq!((job.start_line, job.end_line), (2, 3));
        assert_eq!(job.code, "C1\nC3");
        assert_eq!(job.prior_description.as_deref(), Some("queue consumer"));
    }

    #[test]
    fn interior_insert_promotes_to_reanalysis() {
        // Added line strictly inside the mapped span forces re-derivation.
        let old = "a\nC1\nC2\nz\n";
        let new = "a\nC1\nEXTRA\nC2\nz\n";
        let outcome = run(&[conn(2, 2, 3, "C1\nC2", "publishes event")], old, new);

        assert_eq!(outcome.deletes, vec![ConnectionId(2)]);
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert_eq!((job.start_line, job.end_line), (2, 4));
        assert_eq!(job.prior_description.as_deref(), Some("publishes event"));
    }

    #[test]
    fn one_line_connection_deleted_without_replacement() {
        let old = "a\nCONN\nb\n";
        let new = "a\nb\n";
        let outcome = run(&[conn(5, 2, 2, "CONN", "conn")], old, new);

        assert_eq!(outcome.deletes, vec![ConnectionId(5)]);
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert_eq!(job.start_line, job.end_line);
        assert!(job.prior_description.is_none());
    }

    #[test]
    fn no_surviving_line_means_no_job() {
        let old = "CONN\n";
        let new = "";
        let outcome = run(&[conn(5, 1, 1, "CONN", "conn")], old, new);
        assert_eq!(outcome.deletes, vec![ConnectionId(5)]);
        assert!(outcome.jobs.is_empty());
    }

    #[test]
    fn whole_file_connection_rewrite_is_reanalyzed() {
        let old = "A\nB\nC\n";
        let new = "X\nY\n";
        let outcome = run(&[conn(1, 1, 3, "A\nB\nC", "conn")], old, new);
        assert_eq!(outcome.deletes, vec![ConnectionId(1)]);
        assert_eq!(outcome.jobs.len(), 1);
        assert_eq!(
            (outcome.jobs[0].start_line, outcome.jobs[0].end_line),
            (1, 2)
        );
    }

    #[test]
    fn adjacent_added_line_extends_replacement_job() {
        // Boundary behavior: a replacement at the connection's last line,
        // with an added line just past the new range, pulls the job upward.
        let old = "a\nb\nCONN\ntail\n";
        let new = "a\nb\nNEWCONN\nNEWLINE\ntail\n";
        let outcome = run(&[conn(4, 3, 3, "CONN", "conn")], old, new);

        assert_eq!(outcome.deletes, vec![ConnectionId(4)]);
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert_eq!(job.start_line, 3);
        assert_eq!(job.end_line, 4, "added line at distance 1 joins the job");
        assert_eq!(job.code, "NEWCONN\nNEWLINE");
    }

    #[test]
    fn distant_added_run_becomes_standalone_job() {
        let old = "CONN\na\nb\nc\nd\ne\n";
        let new = "CONN\na\nb\nc\nd\ne\nnew1\nnew2\n";
        // Added lines 7-8; connection span [1,1]; distance > adjacency.
        let outcome = run(&[conn(1, 1, 1, "CONN", "conn")], old, new);

        assert!(outcome.deletes.is_empty());
        assert!(outcome.shifts.is_empty());
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert_eq!((job.start_line, job.end_line), (7, 8));
        assert_eq!(job.code, "new1\nnew2");
        assert_eq!(job.origin, JobOrigin::ModifiedFile);
    }

    #[test]
    fn added_run_near_surviving_connection_is_skipped() {
        // The added line sits within ADJACENCY of the shifted connection:
        // it is part of that unit and needs no standalone analysis.
        let old = "a\nb\nCONN\nd\n";
        let new = "a\na2\nb\nCONN\nd\n";
        let outcome = run(&[conn(1, 3, 3, "CONN", "X")], old, new);
        assert!(outcome.jobs.is_empty());
    }

    #[test]
    fn added_runs_merge_across_small_gaps() {
        // Two single-line inserts separated by one surviving line: the gap
        // is within adjacency, so they form one job spanning both.
        let old = "a\nb\nc\n";
        let new = "a\nX1\nb\nX2\nc\n";
        let outcome = run(&[], old, new);
        assert_eq!(outcome.jobs.len(), 1, "runs at lines 2 and 4 merge");
        assert_eq!((outcome.jobs[0].start_line, outcome.jobs[0].end_line), (2, 4));
        assert_eq!(outcome.jobs[0].code, "X1\nb\nX2");
    }

    #[test]
    fn distant_added_runs_stay_separate_jobs() {
        let old = "a\nb\nc\nd\ne\nf\ng\nh\n";
        let new = "a\nX1\nb\nc\nd\ne\nf\ng\nh\nX2\n";
        let outcome = run(&[], old, new);
        assert_eq!(outcome.jobs.len(), 2, "gap of 7 lines exceeds adjacency");
        assert_eq!((outcome.jobs[0].start_line, outcome.jobs[0].end_line), (2, 2));
        assert_eq!((outcome.jobs[1].start_line, outcome.jobs[1].end_line), (10, 10));
    }

    #[test]
    fn revert_produces_no_work() {
        // L3 at the file level: identical old and new content.
        let content = "a\nCONN\nb\n";
        let outcome = run(&[conn(1, 2, 2, "CONN", "X")], content, content);
        assert!(outcome.shifts.is_empty());
        assert!(outcome.deletes.is_empty());
        assert!(outcome.jobs.is_empty());
    }

    #[test]
    fn invalid_connection_range_is_fatal() {
        let result = reconcile_modified_file(
            ProjectId(1),
            &file(),
            &[conn(1, 5, 9, "x", "x")],
            "a\nb\n",
            "a\nb\nc\n",
            ADJACENCY,
        );
        assert!(result.is_err());
    }

    #[test]
    fn multiple_replacements_merge_job_ranges() {
        // Two replacements inside one connection: both contribute ranges
        // that merge into a single union job.
        let old = "h1\nC1\nC2\nC3\nC4\nC5\nt1\n";
        let new = "h1\nC1\nX\nC3\nY\nC5\nt1\n";
        let snippet = "C1\nC2\nC3\nC4\nC5";
        let outcome = run(&[conn(9, 2, 6, snippet, "rpc handler")], old, new);

        assert_eq!(outcome.deletes, vec![ConnectionId(9)]);
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert_eq!((job.start_line, job.end_line), (2, 6));
        assert_eq!(
            job.prior_description.as_deref(),
            Some("rpc handler"),
            "first matching rule is a contained replacement"
        );
    }

    #[test]
    fn added_file_job_covers_everything() {
        let job = added_file_job(ProjectId(2), FileRef::New(0), "svc/queue.go", "package q\n\nfunc main() {}\n")
            .unwrap();
        assert_eq!(job.origin, JobOrigin::AddedFile);
        assert_eq!((job.start_line, job.end_line), (1, 3));
        assert_eq!(job.language, "go");
        assert!(added_file_job(ProjectId(2), FileRef::New(0), "empty.go", "").is_none());
    }

    #[test]
    fn deleted_file_deletes_all_connections() {
        let outcome = deleted_file_outcome(&[conn(1, 1, 1, "a", "a"), conn(2, 2, 2, "b", "b")]);
        assert_eq!(outcome.deletes, vec![ConnectionId(1), ConnectionId(2)]);
        assert!(outcome.jobs.is_empty());
    }
}
