//! Deterministic line-level diffing
//!
//! Longest-common-subsequence alignment over lines, O(m·n) time and space.
//! The change list is emitted in document order and replaying it against the
//! original text reconstructs the modified text exactly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Addition,
    Deletion,
    Modification,
    Unchanged,
}

/// One aligned line-level change. Indices are 0-based positions in the
/// original and modified line sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffChange {
    pub kind: ChangeKind,
    pub original_line: Option<usize>,
    pub modified_line: Option<usize>,
    pub original: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub modifications: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub original: String,
    pub modified: String,
    /// Changes in document order. Unchanged lines are counted in `stats`
    /// but not listed here.
    pub changes: Vec<DiffChange>,
    pub stats: DiffStats,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Split text into lines for alignment. A trailing newline becomes a final
/// empty line so that joining with '\n' round-trips every input exactly.
fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Compute the line-level diff between two text blobs.
///
/// Identical inputs always produce an identical result. Where several
/// minimal alignments exist, the tie-break prefers treating the step as an
/// insertion (`lcs[i][j-1] >= lcs[i-1][j]`), so output is reproducible
/// across runs and platforms.
pub fn generate_diff(original: &str, modified: &str) -> DiffResult {
    let old: Vec<&str> = split_lines(original);
    let new: Vec<&str> = split_lines(modified);
    let m = old.len();
    let n = new.len();

    // LCS length table over line prefixes.
    let mut lcs = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            lcs[i][j] = if old[i - 1] == new[j - 1] {
                lcs[i - 1][j - 1] + 1
            } else {
                lcs[i][j - 1].max(lcs[i - 1][j])
            };
        }
    }

    // Backtrack from the bottom-right corner, then reverse into document
    // order. Raw ops carry only additions, deletions, and unchanged marks;
    // modifications are collapsed afterwards.
    let mut raw: Vec<DiffChange> = Vec::new();
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            raw.push(DiffChange {
                kind: ChangeKind::Unchanged,
                original_line: Some(i - 1),
                modified_line: Some(j - 1),
                original: Some(old[i - 1].to_string()),
                modified: Some(new[j - 1].to_string()),
            });
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || lcs[i][j - 1] >= lcs[i - 1][j]) {
            raw.push(DiffChange {
                kind: ChangeKind::Addition,
                original_line: None,
                modified_line: Some(j - 1),
                original: None,
                modified: Some(new[j - 1].to_string()),
            });
            j -= 1;
        } else {
            raw.push(DiffChange {
                kind: ChangeKind::Deletion,
                original_line: Some(i - 1),
                modified_line: None,
                original: Some(old[i - 1].to_string()),
                modified: None,
            });
            i -= 1;
        }
    }
    raw.reverse();

    let mut stats = DiffStats::default();
    let mut changes: Vec<DiffChange> = Vec::new();
    // True only while the last emitted change is a deletion with nothing
    // (not even an unchanged line) between it and the current position.
    let mut deletion_adjacent = false;

    for change in raw {
        match change.kind {
            ChangeKind::Unchanged => {
                stats.unchanged += 1;
                deletion_adjacent = false;
            }
            ChangeKind::Addition => {
                // A deletion directly before an addition pairs up as a
                // modification of that line.
                if deletion_adjacent {
                    if let Some(last) = changes.last_mut() {
                        last.kind = ChangeKind::Modification;
                        last.modified_line = change.modified_line;
                        last.modified = change.modified;
                        stats.deletions -= 1;
                        stats.modifications += 1;
                        deletion_adjacent = false;
                        continue;
                    }
                }
                stats.additions += 1;
                changes.push(change);
                deletion_adjacent = false;
            }
            ChangeKind::Deletion => {
                stats.deletions += 1;
                changes.push(change);
                deletion_adjacent = true;
            }
            ChangeKind::Modification => unreachable!("backtrack emits no modifications"),
        }
    }

    DiffResult {
        original: original.to_string(),
        modified: modified.to_string(),
        changes,
        stats,
    }
}

/// Replay a change sequence against the original text.
///
/// This is the inverse of `generate_diff`: for any pair of inputs,
/// `apply_changes(original, &generate_diff(original, modified).changes)`
/// yields `modified` exactly.
pub fn apply_changes(original: &str, changes: &[DiffChange]) -> String {
    let old = split_lines(original);
    let mut out: Vec<String> = Vec::new();
    let mut cursor = 0usize;

    for change in changes {
        match change.kind {
            ChangeKind::Addition => {
                // Copy untouched lines up to the insertion point, identified
                // by the output position the added line should occupy.
                if let Some(target) = change.modified_line {
                    while out.len() < target && cursor < old.len() {
                        out.push(old[cursor].to_string());
                        cursor += 1;
                    }
                }
                if let Some(text) = &change.modified {
                    out.push(text.clone());
                }
            }
            ChangeKind::Deletion => {
                if let Some(at) = change.original_line {
                    while cursor < at && cursor < old.len() {
                        out.push(old[cursor].to_string());
                        cursor += 1;
                    }
                    cursor += 1; // skip the deleted line
                }
            }
            ChangeKind::Modification => {
                if let Some(at) = change.original_line {
                    while cursor < at && cursor < old.len() {
                        out.push(old[cursor].to_string());
                        cursor += 1;
                    }
                    cursor += 1; // replaced line
                }
                if let Some(text) = &change.modified {
                    out.push(text.clone());
                }
            }
            ChangeKind::Unchanged => {}
        }
    }

    while cursor < old.len() {
        out.push(old[cursor].to_string());
        cursor += 1;
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_round_trip(original: &str, modified: &str) {
        let diff = generate_diff(original, modified);
        assert_eq!(
            apply_changes(original, &diff.changes),
            modified,
            "replay failed for {:?} -> {:?}",
            original,
            modified
        );
    }

    #[test]
    fn test_identical_inputs_have_no_changes() {
        let diff = generate_diff("a\nb\nc", "a\nb\nc");
        assert!(diff.changes.is_empty());
        assert_eq!(diff.stats.additions, 0);
        assert_eq!(diff.stats.deletions, 0);
        assert_eq!(diff.stats.modifications, 0);
        assert_eq!(diff.stats.unchanged, 3);
    }

    #[test]
    fn test_single_addition() {
        let diff = generate_diff("a\nb", "a\nb\nc");
        assert_eq!(diff.changes.len(), 1);
        let c = &diff.changes[0];
        assert_eq!(c.kind, ChangeKind::Addition);
        assert_eq!(c.modified.as_deref(), Some("c"));
        assert_eq!(c.modified_line, Some(2));
        assert_eq!(diff.stats.additions, 1);
    }

    #[test]
    fn test_single_deletion() {
        let diff = generate_diff("a\nb\nc", "a\nc");
        assert_eq!(diff.changes.len(), 1);
        let c = &diff.changes[0];
        assert_eq!(c.kind, ChangeKind::Deletion);
        assert_eq!(c.original.as_deref(), Some("b"));
        assert_eq!(c.original_line, Some(1));
        assert_eq!(diff.stats.deletions, 1);
    }

    #[test]
    fn test_single_modification_pairs_lines() {
        let diff = generate_diff("a\nb\nc", "a\nX\nc");
        assert_eq!(diff.changes.len(), 1);
        let c = &diff.changes[0];
        assert_eq!(c.kind, ChangeKind::Modification);
        assert_eq!(c.original.as_deref(), Some("b"));
        assert_eq!(c.modified.as_deref(), Some("X"));
        assert_eq!(diff.stats.modifications, 1);
        assert_eq!(diff.stats.additions, 0);
        assert_eq!(diff.stats.deletions, 0);
    }

    #[test]
    fn test_stats_match_change_kinds() {
        let diff = generate_diff("a\nb\nc\nd", "a\nX\nc\nd\ne");
        let adds = diff
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Addition)
            .count();
        let dels = diff
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Deletion)
            .count();
        let mods = diff
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Modification)
            .count();
        assert_eq!(diff.stats.additions, adds);
        assert_eq!(diff.stats.deletions, dels);
        assert_eq!(diff.stats.modifications, mods);
    }

    #[test]
    fn test_determinism() {
        let a = "fn main() {\n    println!(\"hi\")\n}";
        let b = "fn main() {\n    println!(\"hi\");\n}";
        let first = generate_diff(a, b);
        let second = generate_diff(a, b);
        assert_eq!(first, second);
    }

    #[test]
    fn test_round_trip_various_pairs() {
        assert_round_trip("a\nb\nc", "a\nb\nc");
        assert_round_trip("a\nb", "a\nb\nc");
        assert_round_trip("a\nb\nc", "a\nc");
        assert_round_trip("a\nb\nc", "a\nX\nc");
        assert_round_trip("", "hello");
        assert_round_trip("hello", "");
        assert_round_trip("a\nb\nc\n", "a\nc\n");
        assert_round_trip("one\ntwo\nthree", "zero\none\nthree\nfour");
        assert_round_trip("x\ny\nz", "p\nq\nr");
        assert_round_trip("a\na\na", "a\nb\na\na");
    }

    #[test]
    fn test_complete_replacement_collapses_adjacent_pair() {
        let diff = generate_diff("x\ny", "p\nq");
        // No common lines: backtrack yields del x, del y, add p, add q. The
        // adjacent del y / add p pair collapses into one modification.
        assert_eq!(diff.stats.deletions, 1);
        assert_eq!(diff.stats.modifications, 1);
        assert_eq!(diff.stats.additions, 1);
        assert_round_trip("x\ny", "p\nq");
    }

    #[test]
    fn test_separated_deletion_and_addition_stay_separate() {
        // "two" is deleted and "four" added, with "three" unchanged between
        // them; they must not pair into a modification.
        let diff = generate_diff("one\ntwo\nthree", "zero\none\nthree\nfour");
        assert_eq!(diff.stats.modifications, 0);
        assert_eq!(diff.stats.deletions, 1);
        assert_eq!(diff.stats.additions, 2);
        assert_round_trip("one\ntwo\nthree", "zero\none\nthree\nfour");
    }

    #[test]
    fn test_trailing_newline_is_preserved() {
        assert_round_trip("a\nb\n", "a\nb\nc\n");
        assert_round_trip("a\nb", "a\nb\n");
    }
}
