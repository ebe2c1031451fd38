//! In-process three-way line merge with diff3 semantics.
//!
//! Both sides are diffed against the common base. A run of base lines
//! changed by only one side takes that side's version; a run changed
//! identically by both sides collapses to one copy; a run changed
//! differently by both sides becomes a conflict region rendered with
//! markers that bracket all three variants:
//!
//! ```text
//! <<<<<<< ours
//! our lines
//! ||||||| base
//! original lines
//! =======
//! their lines
//! >>>>>>> theirs
//! ```

use similar::{capture_diff_slices, Algorithm, DiffOp, DiffTag};

use crate::merge::{MergeDriver, MergeError, MergeOutcome};

/// The default merge driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct Diff3Driver;

/// One side's edit: a base line range replaced by a side line range.
#[derive(Debug, Clone, Copy)]
struct Hunk {
    base_start: usize,
    base_end: usize,
    side_start: usize,
    side_end: usize,
}

/// A maximal run of base lines touched by at least one side.
#[derive(Debug)]
struct Region {
    lo: usize,
    hi: usize,
    ours: Vec<Hunk>,
    theirs: Vec<Hunk>,
}

impl MergeDriver for Diff3Driver {
    fn merge(&self, base: &str, ours: &str, theirs: &str) -> Result<MergeOutcome, MergeError> {
        let base_lines = split_lines(base);
        let ours_lines = split_lines(ours);
        let theirs_lines = split_lines(theirs);

        let ours_hunks = side_hunks(&capture_diff_slices(
            Algorithm::Myers,
            &base_lines,
            &ours_lines,
        ));
        let theirs_hunks = side_hunks(&capture_diff_slices(
            Algorithm::Myers,
            &base_lines,
            &theirs_lines,
        ));

        let mut text = String::new();
        let mut clean = true;
        let mut pos = 0;

        for region in build_regions(&ours_hunks, &theirs_hunks) {
            text.extend(base_lines[pos..region.lo].iter().copied());
            pos = region.hi;

            let ours_text = region.render(&region.ours, &base_lines, &ours_lines);
            let theirs_text = region.render(&region.theirs, &base_lines, &theirs_lines);

            if ours_text == theirs_text {
                // both sides made the same change
                text.push_str(&ours_text);
                continue;
            }

            let base_text: String = base_lines[region.lo..region.hi].concat();
            if ours_text == base_text {
                text.push_str(&theirs_text);
            } else if theirs_text == base_text {
                text.push_str(&ours_text);
            } else {
                clean = false;
                text.push_str("<<<<<<< ours\n");
                push_section(&mut text, &ours_text);
                text.push_str("||||||| base\n");
                push_section(&mut text, &base_text);
                text.push_str("=======\n");
                push_section(&mut text, &theirs_text);
                text.push_str(">>>>>>> theirs\n");
            }
        }
        text.extend(base_lines[pos..].iter().copied());

        Ok(MergeOutcome { text, clean })
    }
}

/// Split into lines keeping each line's terminator, so concatenation
/// reproduces the input byte for byte (including a missing final newline).
fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// The non-equal ops of one side's diff against the base, coalescing runs
/// that touch in the base.
fn side_hunks(ops: &[DiffOp]) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for op in ops {
        if op.tag() == DiffTag::Equal {
            continue;
        }
        let (base, side) = (op.old_range(), op.new_range());
        if let Some(last) = hunks.last_mut() {
            if base.start <= last.base_end {
                last.base_end = base.end;
                last.side_end = side.end;
                continue;
            }
        }
        hunks.push(Hunk {
            base_start: base.start,
            base_end: base.end,
            side_start: side.start,
            side_end: side.end,
        });
    }
    hunks
}

/// True when the hunk belongs to the region `lo..hi`. Edits sharing at
/// least one base line overlap; two insertions at the exact same point
/// also collide, even though both have empty base ranges.
fn joins(hunk: &Hunk, lo: usize, hi: usize) -> bool {
    (hunk.base_start < hi && hunk.base_end > lo) || (hunk.base_start == lo && hunk.base_end == hi)
}

/// Sweep both sides' hunks in base order, grouping every set of mutually
/// overlapping hunks into one region.
fn build_regions(ours: &[Hunk], theirs: &[Hunk]) -> Vec<Region> {
    let mut regions = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < ours.len() || j < theirs.len() {
        let ours_first = match (ours.get(i), theirs.get(j)) {
            (Some(a), Some(b)) => (a.base_start, a.base_end) <= (b.base_start, b.base_end),
            (Some(_), None) => true,
            _ => false,
        };

        let mut region = if ours_first {
            let h = ours[i];
            i += 1;
            Region {
                lo: h.base_start,
                hi: h.base_end,
                ours: vec![h],
                theirs: Vec::new(),
            }
        } else {
            let h = theirs[j];
            j += 1;
            Region {
                lo: h.base_start,
                hi: h.base_end,
                ours: Vec::new(),
                theirs: vec![h],
            }
        };

        // absorb until neither side's next hunk overlaps
        loop {
            if let Some(h) = ours.get(i) {
                if joins(h, region.lo, region.hi) {
                    region.hi = region.hi.max(h.base_end);
                    region.ours.push(*h);
                    i += 1;
                    continue;
                }
            }
            if let Some(h) = theirs.get(j) {
                if joins(h, region.lo, region.hi) {
                    region.hi = region.hi.max(h.base_end);
                    region.theirs.push(*h);
                    j += 1;
                    continue;
                }
            }
            break;
        }

        regions.push(region);
    }

    regions
}

impl Region {
    /// One side's version of the base range `lo..hi`: its hunks' side
    /// lines, with unchanged base lines filling the gaps between them.
    fn render(&self, hunks: &[Hunk], base: &[&str], side: &[&str]) -> String {
        let mut out = String::new();
        let mut pos = self.lo;
        for h in hunks {
            out.extend(base[pos..h.base_start].iter().copied());
            out.extend(side[h.side_start..h.side_end].iter().copied());
            pos = h.base_end;
        }
        out.extend(base[pos..self.hi].iter().copied());
        out
    }
}

/// Append a marker section, terminating it so the following marker stays
/// on its own line even when the section lacks a final newline.
fn push_section(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
}
