//! Checkpoint reading — turns the pending queue into a coalesced change set.
//!
//! External watchers append rows; this module folds them, in insertion
//! order, into at most one net [`Change`] per file. Every consumed row ID is
//! returned so the coordinator can delete exactly those rows on success,
//! including rows whose net effect coalesced away.

use tracing::debug;

use crate::error::CheckpointError;
use crate::types::{Change, ChangeKind, ChangeSet, CheckpointRow, CheckpointRowId};

/// Build the change set for a run from the pending checkpoint rows.
///
/// Rows must be in insertion order (ascending ID). Fails with
/// `InputCorruption` if any row's contents are inconsistent with its kind;
/// in that case nothing is consumed.
pub fn load_change_set(
    rows: &[CheckpointRow],
) -> Result<(ChangeSet, Vec<CheckpointRowId>), CheckpointError> {
    let mut set = ChangeSet::default();
    let mut row_ids = Vec::with_capacity(rows.len());

    for row in rows {
        validate_row(row)?;
        row_ids.push(row.id);

        let key = (row.project_id, row.file_path.clone());
        let prior = set.changes.remove(&key);
        if let Some(next) = coalesce(prior, row) {
            set.changes.insert(key, next);
        }
    }

    debug!(
        rows = rows.len(),
        net_changes = set.len(),
        "Coalesced checkpoint rows"
    );
    Ok((set, row_ids))
}

/// Check that a row carries the contents its kind requires.
fn validate_row(row: &CheckpointRow) -> Result<(), CheckpointError> {
    let missing = match row.change_kind {
        ChangeKind::Added if row.new_content.is_none() => Some("added row without new_content"),
        ChangeKind::Modified if row.old_content.is_none() => {
            Some("modified row without old_content")
        }
        ChangeKind::Modified if row.new_content.is_none() => {
            Some("modified row without new_content")
        }
        ChangeKind::Deleted if row.old_content.is_none() => Some("deleted row without old_content"),
        _ => None,
    };

    match missing {
        Some(reason) => Err(CheckpointError::InputCorruption {
            row_id: row.id.0,
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Fold one row into the net change for its file.
///
/// The earliest `old` content and the latest `new` content survive. A file
/// added and then deleted nets out to `None`; a file deleted and then
/// re-added (or re-modified) nets out to `Modified`.
fn coalesce(prior: Option<Change>, row: &CheckpointRow) -> Option<Change> {
    let old = || row.old_content.clone().unwrap_or_default();
    let new = || row.new_content.clone().unwrap_or_default();

    match (prior, row.change_kind) {
        (None, ChangeKind::Added) => Some(Change::Added { new: new() }),
        (None, ChangeKind::Modified) => Some(Change::Modified {
            old: old(),
            new: new(),
        }),
        (None, ChangeKind::Deleted) => Some(Change::Deleted { old: old() }),

        // Still unseen by the store: later edits keep it a plain addition.
        (Some(Change::Added { .. }), ChangeKind::Added | ChangeKind::Modified) => {
            Some(Change::Added { new: new() })
        }
        (Some(Change::Added { .. }), ChangeKind::Deleted) => None,

        (Some(Change::Modified { old, .. }), ChangeKind::Added | ChangeKind::Modified) => {
            Some(Change::Modified { old, new: new() })
        }
        (Some(Change::Modified { old, .. }), ChangeKind::Deleted) => {
            Some(Change::Deleted { old })
        }

        (Some(Change::Deleted { old }), ChangeKind::Added | ChangeKind::Modified) => {
            Some(Change::Modified { old, new: new() })
        }
        (Some(Change::Deleted { old }), ChangeKind::Deleted) => Some(Change::Deleted { old }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectId;
    use chrono::Utc;

    fn row(
        id: i64,
        path: &str,
        kind: ChangeKind,
        old: Option<&str>,
        new: Option<&str>,
    ) -> CheckpointRow {
        CheckpointRow {
            id: CheckpointRowId(id),
            project_id: ProjectId(1),
            file_path: path.to_string(),
            change_kind: kind,
            old_content: old.map(str::to_string),
            new_content: new.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn single_rows_pass_through() {
        let rows = vec![
            row(1, "a.rs", ChangeKind::Added, None, Some("new a")),
            row(2, "b.rs", ChangeKind::Modified, Some("old b"), Some("new b")),
            row(3, "c.rs", ChangeKind::Deleted, Some("old c"), None),
        ];
        let (set, ids) = load_change_set(&rows).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(ids.len(), 3);
        assert_eq!(
            set.changes[&(ProjectId(1), "a.rs".to_string())],
            Change::Added {
                new: "new a".to_string()
            }
        );
        assert_eq!(
            set.changes[&(ProjectId(1), "c.rs".to_string())],
            Change::Deleted {
                old: "old c".to_string()
            }
        );
    }

    #[test]
    fn modified_twice_keeps_earliest_old_latest_new() {
        let rows = vec![
            row(1, "a.rs", ChangeKind::Modified, Some("v0"), Some("v1")),
            row(2, "a.rs", ChangeKind::Modified, Some("v1"), Some("v2")),
        ];
        let (set, ids) = load_change_set(&rows).unwrap();
        assert_eq!(
            set.changes[&(ProjectId(1), "a.rs".to_string())],
            Change::Modified {
                old: "v0".to_string(),
                new: "v2".to_string()
            }
        );
        assert_eq!(ids, vec![CheckpointRowId(1), CheckpointRowId(2)]);
    }

    #[test]
    fn added_then_deleted_is_a_noop_but_rows_are_consumed() {
        let rows = vec![
            row(1, "tmp.rs", ChangeKind::Added, None, Some("x")),
            row(2, "tmp.rs", ChangeKind::Deleted, Some("x"), None),
        ];
        let (set, ids) = load_change_set(&rows).unwrap();
        assert!(set.is_empty());
        assert_eq!(ids.len(), 2, "no-op rows still enter the delete set");
    }

    #[test]
    fn deleted_then_added_becomes_modified() {
        let rows = vec![
            row(1, "a.rs", ChangeKind::Deleted, Some("v0"), None),
            row(2, "a.rs", ChangeKind::Added, None, Some("v1")),
        ];
        let (set, _) = load_change_set(&rows).unwrap();
        assert_eq!(
            set.changes[&(ProjectId(1), "a.rs".to_string())],
            Change::Modified {
                old: "v0".to_string(),
                new: "v1".to_string()
            }
        );
    }

    #[test]
    fn added_then_modified_stays_added() {
        let rows = vec![
            row(1, "a.rs", ChangeKind::Added, None, Some("v1")),
            row(2, "a.rs", ChangeKind::Modified, Some("v1"), Some("v2")),
        ];
        let (set, _) = load_change_set(&rows).unwrap();
        assert_eq!(
            set.changes[&(ProjectId(1), "a.rs".to_string())],
            Change::Added {
                new: "v2".to_string()
            }
        );
    }

    #[test]
    fn modified_then_deleted_keeps_original_old() {
        let rows = vec![
            row(1, "a.rs", ChangeKind::Modified, Some("v0"), Some("v1")),
            row(2, "a.rs", ChangeKind::Deleted, Some("v1"), None),
        ];
        let (set, _) = load_change_set(&rows).unwrap();
        assert_eq!(
            set.changes[&(ProjectId(1), "a.rs".to_string())],
            Change::Deleted {
                old: "v0".to_string()
            }
        );
    }

    #[test]
    fn added_deleted_added_is_plain_added() {
        let rows = vec![
            row(1, "a.rs", ChangeKind::Added, None, Some("v1")),
            row(2, "a.rs", ChangeKind::Deleted, Some("v1"), None),
            row(3, "a.rs", ChangeKind::Added, None, Some("v2")),
        ];
        let (set, ids) = load_change_set(&rows).unwrap();
        assert_eq!(
            set.changes[&(ProjectId(1), "a.rs".to_string())],
            Change::Added {
                new: "v2".to_string()
            }
        );
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn corrupt_rows_are_rejected_with_their_id() {
        let rows = vec![row(9, "a.rs", ChangeKind::Modified, None, Some("v1"))];
        let err = load_change_set(&rows).unwrap_err();
        let CheckpointError::InputCorruption { row_id, reason } = err;
        assert_eq!(row_id, 9);
        assert!(reason.contains("old_content"));

        let rows = vec![row(4, "a.rs", ChangeKind::Added, None, None)];
        assert!(load_change_set(&rows).is_err());

        let rows = vec![row(5, "a.rs", ChangeKind::Deleted, None, None)];
        assert!(load_change_set(&rows).is_err());
    }

    #[test]
    fn files_in_different_projects_do_not_coalesce() {
        let mut other = row(2, "a.rs", ChangeKind::Deleted, Some("x"), None);
        other.project_id = ProjectId(2);
        let rows = vec![row(1, "a.rs", ChangeKind::Added, None, Some("x")), other];
        let (set, _) = load_change_set(&rows).unwrap();
        assert_eq!(set.len(), 2);
    }
}
