//! The diff engine: tree-to-tree structural diff and blob-to-blob line diff.
//!
//! Structural diffs enumerate changed paths between two tree snapshots and
//! ride on the object store's own tree diff. Blob diffs are computed
//! in-process with the `similar` crate (Myers) and returned as structured
//! hunks for the web layer to render.

use git2::{Delta, Diff, DiffOptions, ObjectType, Repository};
use similar::{ChangeTag, TextDiff};

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::{Change, ChangeStatus, ObjectId, TreeId};

/// the result of diffing two objects by id
#[derive(Debug)]
pub enum DiffOutput {
    /// both ids named trees: changed paths between the two snapshots
    Structural(Vec<Change>),
    /// both ids named blobs: a line-level content diff
    Text(BlobDiff),
}

/// compute the structural diff between two tree snapshots
pub fn diff_trees(repo: &Repository, old: TreeId, new: TreeId) -> StoreResult<Vec<Change>> {
    let old_tree = repo
        .find_tree(old.raw())
        .map_err(|_| StoreError::ObjectNotFound(old.to_string()))?;
    let new_tree = repo
        .find_tree(new.raw())
        .map_err(|_| StoreError::ObjectNotFound(new.to_string()))?;

    let mut opts = DiffOptions::new();
    let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;
    extract_changes(&diff)
}

fn extract_changes(diff: &Diff<'_>) -> StoreResult<Vec<Change>> {
    let mut changes = Vec::new();

    for delta in diff.deltas() {
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let status = match delta.status() {
            Delta::Added => ChangeStatus::Added,
            Delta::Deleted => ChangeStatus::Deleted,
            Delta::Modified => ChangeStatus::Modified,
            Delta::Renamed => ChangeStatus::Renamed,
            Delta::Copied => ChangeStatus::Copied,
            _ => ChangeStatus::Other,
        };

        changes.push(Change { path, status });
    }

    Ok(changes)
}

/// resolve two object ids and diff them
///
/// Both must name objects of the same kind: two trees produce a structural
/// diff, two blobs a text diff. Mixed kinds are an error.
pub fn diff_objects(repo: &Repository, a: ObjectId, b: ObjectId) -> StoreResult<DiffOutput> {
    let kind_of = |id: ObjectId| -> StoreResult<ObjectType> {
        repo.find_object(id.raw(), None)
            .map_err(|_| StoreError::ObjectNotFound(id.to_string()))?
            .kind()
            .ok_or_else(|| StoreError::Internal(format!("object {} has no kind", id)))
    };

    match (kind_of(a)?, kind_of(b)?) {
        (ObjectType::Tree, ObjectType::Tree) => Ok(DiffOutput::Structural(diff_trees(
            repo,
            TreeId::new(a.raw()),
            TreeId::new(b.raw()),
        )?)),
        (ObjectType::Blob, ObjectType::Blob) => {
            let old = repo.find_blob(a.raw())?;
            let new = repo.find_blob(b.raw())?;
            Ok(DiffOutput::Text(diff_blobs(old.content(), new.content())))
        }
        (left, right) => Err(StoreError::UnexpectedObjectType {
            path: format!("{}..{}", a, b),
            expected: "two blobs or two trees".to_string(),
            found: format!("{:?} and {:?}", left, right),
        }),
    }
}

/// the result of diffing two blobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDiff {
    pub hunks: Vec<DiffHunk>,
    /// true when either side was not valid UTF-8
    pub binary: bool,
}

impl BlobDiff {
    /// true if the two blobs are identical
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty() && !self.binary
    }
}

/// a contiguous region of changes, with context lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    /// 1-based start line in the old content
    pub old_start: usize,
    /// 1-based start line in the new content
    pub new_start: usize,
    pub lines: Vec<DiffLine>,
}

/// a single line in a diff hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

/// compute a line-by-line diff between two byte buffers
///
/// Binary content (either side not valid UTF-8) produces an empty hunk
/// list flagged as binary.
pub fn diff_blobs(old: &[u8], new: &[u8]) -> BlobDiff {
    let (old_str, new_str) = match (std::str::from_utf8(old), std::str::from_utf8(new)) {
        (Ok(o), Ok(n)) => (o, n),
        _ => {
            return BlobDiff {
                hunks: Vec::new(),
                binary: true,
            }
        }
    };

    if old_str == new_str {
        return BlobDiff {
            hunks: Vec::new(),
            binary: false,
        };
    }

    let text_diff = TextDiff::from_lines(old_str, new_str);
    let mut hunks = Vec::new();

    for group in text_diff.grouped_ops(3) {
        let mut lines = Vec::new();
        let mut old_start = 0;
        let mut new_start = 0;
        let mut first = true;

        for op in &group {
            if first {
                old_start = op.old_range().start + 1;
                new_start = op.new_range().start + 1;
                first = false;
            }
            for change in text_diff.iter_changes(op) {
                let value = change.value().trim_end_matches('\n').to_string();
                let line = match change.tag() {
                    ChangeTag::Equal => DiffLine::Context(value),
                    ChangeTag::Insert => DiffLine::Added(value),
                    ChangeTag::Delete => DiffLine::Removed(value),
                };
                lines.push(line);
            }
        }

        hunks.push(DiffHunk {
            old_start,
            new_start,
            lines,
        });
    }

    BlobDiff {
        hunks,
        binary: false,
    }
}
