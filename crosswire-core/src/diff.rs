//! Line diffing — the mapping between old and new line numbers of a
//! modified file.
//!
//! A Myers longest-common-subsequence matcher produces `equal` / `delete` /
//! `insert` / `replace` operations, which are folded into a [`FileDiff`]:
//! a line map from old to new numbers (or to nothing for destroyed lines),
//! the sets of purely added and removed lines, and the list of replaced
//! ranges the reconciler classifies against. Replace new-sides are
//! deliberately NOT recorded as added lines; the overlap classifier
//! consumes them.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::DiffError;

/// A paired old/new line interval emitted when a block of lines is
/// substituted. All bounds are 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacedRange {
    pub old_lo: u32,
    pub old_hi: u32,
    pub new_lo: u32,
    pub new_hi: u32,
}

/// Line-level diff of one modified file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileDiff {
    /// Old line (1-based) to its image in the new file; `None` for lines
    /// destroyed by a delete or replace. Total over `1..=old_len`.
    pub line_map: HashMap<u32, Option<u32>>,
    /// New lines introduced by pure inserts.
    pub added: BTreeSet<u32>,
    /// Old lines destroyed by deletes or replaces.
    pub removed: BTreeSet<u32>,
    /// Substituted blocks, ascending by `old_lo`.
    pub replaced_ranges: Vec<ReplacedRange>,
    pub old_len: u32,
    pub new_len: u32,
}

impl FileDiff {
    /// The image of an old line, if it survived.
    pub fn map(&self, old_line: u32) -> Option<u32> {
        self.line_map.get(&old_line).copied().flatten()
    }

    /// The image of the surviving line nearest to `old_line`, searching
    /// outward (x, x-1, x+1, x-2, ...) over destroyed lines.
    pub fn nearest_surviving(&self, old_line: u32) -> Option<u32> {
        let mut delta = 0u32;
        loop {
            let below = old_line.checked_sub(delta).filter(|l| *l >= 1);
            let above = old_line.checked_add(delta).filter(|l| *l <= self.old_len);
            if below.is_none() && above.is_none() {
                return None;
            }
            if let Some(line) = below {
                if let Some(image) = self.map(line) {
                    return Some(image);
                }
            }
            if delta > 0 {
                if let Some(line) = above {
                    if let Some(image) = self.map(line) {
                        return Some(image);
                    }
                }
            }
            delta += 1;
        }
    }

    pub fn is_identity(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.replaced_ranges.is_empty()
    }

    /// Check the internal invariants: the line map is injective on its
    /// surviving image, removed lines map to nothing, and added lines are
    /// neither images nor covered by a replace new-side.
    pub fn validate(&self, path: &str) -> Result<(), DiffError> {
        let violation = |detail: String| DiffError::InvariantViolation {
            path: path.to_string(),
            detail,
        };

        let mut seen: HashSet<u32> = HashSet::new();
        for (&old, &image) in &self.line_map {
            if let Some(new) = image {
                if !seen.insert(new) {
                    return Err(violation(format!("line map not injective at new line {new}")));
                }
                if self.added.contains(&new) {
                    return Err(violation(format!("added line {new} is also a mapped image")));
                }
            } else if !self.removed.contains(&old)
                && !self
                    .replaced_ranges
                    .iter()
                    .any(|r| r.old_lo <= old && old <= r.old_hi)
            {
                return Err(violation(format!("old line {old} lost without being removed")));
            }
        }

        for &old in &self.removed {
            if self.map(old).is_some() {
                return Err(violation(format!("removed line {old} still has an image")));
            }
        }

        for &new in &self.added {
            if self
                .replaced_ranges
                .iter()
                .any(|r| r.new_lo <= new && new <= r.new_hi)
            {
                return Err(violation(format!(
                    "added line {new} overlaps a replaced range new-side"
                )));
            }
        }

        Ok(())
    }
}

/// Split content into lines. Newline is a separator; a trailing newline
/// does not create an empty trailing line.
pub fn split_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }
    let trimmed = content.strip_suffix('\n').unwrap_or(content);
    trimmed.split('\n').collect()
}

// ── Edit script operations ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpTag {
    Equal,
    Delete,
    Insert,
    Replace,
}

/// One operation over 0-based half-open ranges `[i1, i2)` / `[j1, j2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Opcode {
    tag: OpTag,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
}

/// Compute the line diff between old and new content.
pub fn diff_lines(old: &str, new: &str) -> FileDiff {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let ops = opcodes(&old_lines, &new_lines);

    #[allow(clippy::cast_possible_truncation)]
    let mut diff = FileDiff {
        old_len: old_lines.len() as u32,
        new_len: new_lines.len() as u32,
        ..Default::default()
    };

    #[allow(clippy::cast_possible_truncation)]
    for op in ops {
        let (i1, i2, j1, j2) = (op.i1 as u32, op.i2 as u32, op.j1 as u32, op.j2 as u32);
        match op.tag {
            OpTag::Equal => {
                for k in 0..(i2 - i1) {
                    diff.line_map.insert(i1 + k + 1, Some(j1 + k + 1));
                }
            }
            OpTag::Delete => {
                for old_line in (i1 + 1)..=i2 {
                    diff.line_map.insert(old_line, None);
                    diff.removed.insert(old_line);
                }
            }
            OpTag::Insert => {
                for new_line in (j1 + 1)..=j2 {
                    diff.added.insert(new_line);
                }
            }
            OpTag::Replace => {
                for old_line in (i1 + 1)..=i2 {
                    diff.line_map.insert(old_line, None);
                    diff.removed.insert(old_line);
                }
                diff.replaced_ranges.push(ReplacedRange {
                    old_lo: i1 + 1,
                    old_hi: i2,
                    new_lo: j1 + 1,
                    new_hi: j2,
                });
            }
        }
    }

    diff
}

/// Derive opcodes from the matched pairs of a Myers LCS run.
fn opcodes(a: &[&str], b: &[&str]) -> Vec<Opcode> {
    let matches = myers_matches(a, b);
    let mut ops = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);

    // Walk matched pairs grouped into maximal diagonal blocks.
    let mut idx = 0;
    while idx <= matches.len() {
        let (block_i, block_j, block_len) = if idx == matches.len() {
            (a.len(), b.len(), 0)
        } else {
            let (mi, mj) = matches[idx];
            let mut len = 1;
            while idx + len < matches.len() && matches[idx + len] == (mi + len, mj + len) {
                len += 1;
            }
            (mi, mj, len)
        };

        // Gap before the block
        if i < block_i && j < block_j {
            ops.push(Opcode {
                tag: OpTag::Replace,
                i1: i,
                i2: block_i,
                j1: j,
                j2: block_j,
            });
        } else if i < block_i {
            ops.push(Opcode {
                tag: OpTag::Delete,
                i1: i,
                i2: block_i,
                j1: j,
                j2: j,
            });
        } else if j < block_j {
            ops.push(Opcode {
                tag: OpTag::Insert,
                i1: i,
                i2: i,
                j1: j,
                j2: block_j,
            });
        }

        if block_len > 0 {
            ops.push(Opcode {
                tag: OpTag::Equal,
                i1: block_i,
                i2: block_i + block_len,
                j1: block_j,
                j2: block_j + block_len,
            });
        }

        i = block_i + block_len;
        j = block_j + block_len;
        idx += if block_len == 0 { 1 } else { block_len };
    }

    ops
}

/// Myers greedy O((n+m)·d) diff; returns the matched index pairs of the
/// LCS, ascending.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn myers_matches(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let n = a.len() as i64;
    let m = b.len() as i64;
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let max = n + m;
    let offset = max;
    let width = (2 * max + 1) as usize;
    let mut v = vec![0i64; width];
    let mut trace: Vec<Vec<i64>> = Vec::new();
    let mut found_d = 0;

    'outer: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                found_d = d;
                break 'outer;
            }
            k += 2;
        }
    }

    // Backtrack through the trace, collecting diagonal (match) steps.
    let mut matches = Vec::new();
    let mut x = n;
    let mut y = m;
    for d in (1..=found_d).rev() {
        let v = &trace[d as usize];
        let k = x - y;
        let idx = (k + offset) as usize;
        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        // The non-diagonal move lands here; everything after is a snake.
        let (move_x, move_y) = if prev_k == k + 1 {
            (prev_x, prev_y + 1)
        } else {
            (prev_x + 1, prev_y)
        };
        while x > move_x && y > move_y {
            matches.push(((x - 1) as usize, (y - 1) as usize));
            x -= 1;
            y -= 1;
        }
        x = prev_x;
        y = prev_y;
    }
    // Depth 0: the leading snake from the origin.
    while x > 0 && y > 0 {
        matches.push(((x - 1) as usize, (y - 1) as usize));
        x -= 1;
        y -= 1;
    }

    matches.reverse();
    matches
}

// ── Tests ──────────────────────────────────────────────────────────
