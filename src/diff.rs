//! Line-level sequence diffing.
//!
//! A classic LCS (longest common subsequence) diff over lines, reduced to
//! the one product the conflict detector needs: the contiguous regions of
//! the *base* text that a modified version changed, together with the
//! replacement lines on the modified side. Region coordinates are 1-based
//! base line numbers, which makes overlap checks between two independently
//! modified versions a simple interval intersection.

/// A contiguous span of base lines changed by one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedRegion {
    /// First affected base line (1-based).
    pub start: usize,
    /// Last affected base line (inclusive). For a pure insertion this equals
    /// `start`: the insertion "touches" the base line it lands before.
    pub end: usize,
    /// The lines this side has at the span (empty for a pure deletion).
    pub replacement: Vec<String>,
}

/// Edit operation produced by LCS backtracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EditOp {
    /// Line `old_idx` equals line `new_idx`.
    Equal(usize, usize),
    /// Line `new_idx` was inserted.
    Insert(usize),
    /// Line `old_idx` was deleted.
    Delete(usize),
}

/// Compute the changed regions of `base` relative to `modified`, with
/// adjacent and touching regions merged into contiguous spans.
#[must_use]
pub fn changed_regions(base: &str, modified: &str) -> Vec<ChangedRegion> {
    let base_lines: Vec<&str> = base.lines().collect();
    let mod_lines: Vec<&str> = modified.lines().collect();
    let ops = lcs_ops(&base_lines, &mod_lines);

    let mut regions: Vec<ChangedRegion> = Vec::new();
    let mut open: Option<ChangedRegion> = None;
    let mut base_line = 1usize; // next base line to account for

    for op in ops {
        match op {
            EditOp::Equal(_, _) => {
                if let Some(region) = open.take() {
                    regions.push(region);
                }
                base_line += 1;
            }
            EditOp::Delete(_) => {
                match &mut open {
                    Some(region) => region.end = base_line,
                    None => {
                        open = Some(ChangedRegion {
                            start: base_line,
                            end: base_line,
                            replacement: Vec::new(),
                        });
                    }
                }
                base_line += 1;
            }
            EditOp::Insert(new_idx) => {
                let line = mod_lines[new_idx].to_owned();
                match &mut open {
                    Some(region) => region.replacement.push(line),
                    None => {
                        open = Some(ChangedRegion {
                            start: base_line,
                            end: base_line,
                            replacement: vec![line],
                        });
                    }
                }
            }
        }
    }
    if let Some(region) = open {
        regions.push(region);
    }

    merge_touching(regions)
}

/// True when two regions numerically overlap.
#[must_use]
pub const fn regions_overlap(a: &ChangedRegion, b: &ChangedRegion) -> bool {
    a.start <= b.end && b.start <= a.end
}

fn merge_touching(regions: Vec<ChangedRegion>) -> Vec<ChangedRegion> {
    let mut merged: Vec<ChangedRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(prev) if region.start <= prev.end + 1 => {
                prev.end = prev.end.max(region.end);
                prev.replacement.extend(region.replacement);
            }
            _ => merged.push(region),
        }
    }
    merged
}

/// LCS edit script between two line slices, in forward order.
fn lcs_ops(old: &[&str], new: &[&str]) -> Vec<EditOp> {
    let m = old.len();
    let n = new.len();

    // Standard DP table; fine for source-file-sized inputs.
    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if old[i - 1] == new[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(m.max(n));
    let mut i = m;
    let mut j = n;
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            ops.push(EditOp::Equal(i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            ops.push(EditOp::Insert(j - 1));
            j -= 1;
        } else {
            ops.push(EditOp::Delete(i - 1));
            i -= 1;
        }
    }
    ops.reverse();
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_has_no_regions() {
        assert!(changed_regions("a\nb\nc\n", "a\nb\nc\n").is_empty());
    }

    #[test]
    fn single_line_edit_yields_single_line_region() {
        let regions = changed_regions("line1\nline2\nline3\n", "line1\nCHANGED\nline3\n");
        assert_eq!(
            regions,
            vec![ChangedRegion {
                start: 2,
                end: 2,
                replacement: vec!["CHANGED".to_owned()],
            }]
        );
    }

    #[test]
    fn disjoint_edits_yield_disjoint_regions() {
        let regions = changed_regions("a\nb\nc\nd\ne\n", "A\nb\nc\nd\nE\n");
        assert_eq!(regions.len(), 2);
        assert_eq!((regions[0].start, regions[0].end), (1, 1));
        assert_eq!((regions[1].start, regions[1].end), (5, 5));
        assert!(!regions_overlap(&regions[0], &regions[1]));
    }

    #[test]
    fn pure_deletion_has_empty_replacement() {
        let regions = changed_regions("a\nb\nc\n", "a\nc\n");
        assert_eq!(
            regions,
            vec![ChangedRegion {
                start: 2,
                end: 2,
                replacement: vec![],
            }]
        );
    }

    #[test]
    fn pure_insertion_touches_the_line_it_lands_before() {
        let regions = changed_regions("a\nc\n", "a\nb\nc\n");
        assert_eq!(
            regions,
            vec![ChangedRegion {
                start: 2,
                end: 2,
                replacement: vec!["b".to_owned()],
            }]
        );
    }

    #[test]
    fn multi_line_replacement_spans_deleted_lines() {
        let regions = changed_regions("a\nb\nc\nd\n", "a\nX\nY\nd\n");
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].start, regions[0].end), (2, 3));
        assert_eq!(regions[0].replacement, vec!["X", "Y"]);
    }

    #[test]
    fn empty_base_is_one_region_of_insertions() {
        let regions = changed_regions("", "a\nb\n");
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].start, regions[0].end), (1, 1));
        assert_eq!(regions[0].replacement, vec!["a", "b"]);
    }

    #[test]
    fn touching_regions_are_merged() {
        // Lines 2 and 3 both rewritten with no untouched line between them.
        let regions = changed_regions("a\nb\nc\nd\n", "a\nB\nC\nd\n");
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].start, regions[0].end), (2, 3));
    }

    #[test]
    fn overlap_predicate_matches_interval_math() {
        let r = |start, end| ChangedRegion {
            start,
            end,
            replacement: vec![],
        };
        assert!(regions_overlap(&r(2, 4), &r(4, 6)));
        assert!(regions_overlap(&r(2, 4), &r(1, 9)));
        assert!(!regions_overlap(&r(2, 4), &r(5, 6)));
    }
}
