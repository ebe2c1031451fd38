//! Commit creation and history traversal.
//!
//! Every successful edit becomes one commit. History is a singly-linked
//! ancestry chain: each commit has at most one parent and HEAD points at
//! the latest one. Merges never produce merge commits here; the merge
//! coordinator folds concurrent edits into a single new tree instead.

use chrono::{DateTime, TimeZone, Utc};
use git2::{DiffOptions, ObjectType, Repository, Revwalk, Sort};

use crate::storage::blob;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::tree::WorkingTree;
use crate::storage::types::{Author, BlobId, CommitId, ObjectId, TreeId};

/// information about a commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent: Option<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let time = commit.time();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent: commit.parent_ids().next().map(CommitId::new),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@localhost").to_string(),
            timestamp,
        }
    }

    /// true for the root commit of the chain
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
///
/// The builder never moves a ref; advancing HEAD is a separate
/// compare-and-swap step in [`refs`](crate::storage::refs).
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parent: Option<CommitId>,
    message: String,
    author: Author,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parent: None,
            message: String::new(),
            author: Author::anonymous(),
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// set the parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author (also used as committer)
    pub fn author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StoreResult<CommitId> {
        if self.message.trim().is_empty() {
            return Err(StoreError::EmptyCommitMessage);
        }

        let tree_id = self
            .tree_id
            .ok_or_else(|| StoreError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let sig = self.author.to_signature()?;

        let parent_commit = match self.parent {
            Some(id) => Some(self.repo.find_commit(id.raw())?),
            None => None,
        };
        let parents: Vec<&git2::Commit<'_>> = parent_commit.iter().collect();

        let oid = self
            .repo
            .commit(None, &sig, &sig, &self.message, &tree, &parents)?;

        Ok(CommitId::new(oid))
    }
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StoreResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StoreError::CommitNotFound(id.to_string()))?;

    Ok(CommitInfo::from_git2(&commit))
}

/// get the tree id of a commit
pub fn tree_id_at(repo: &Repository, commit_id: CommitId) -> StoreResult<TreeId> {
    let commit = repo
        .find_commit(commit_id.raw())
        .map_err(|_| StoreError::CommitNotFound(commit_id.to_string()))?;
    Ok(TreeId::new(commit.tree_id()))
}

/// iterate over commit history starting from a commit, most recent first
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    fn new(repo: &'repo Repository, start: CommitId) -> StoreResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StoreResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(CommitInfo::from_git2(&commit))),
                Err(e) => Some(Err(StoreError::Git(e))),
            },
            Err(e) => Some(Err(StoreError::Git(e))),
        }
    }
}

/// get history for a commit
pub fn history(repo: &Repository, start: CommitId) -> StoreResult<HistoryIterator<'_>> {
    HistoryIterator::new(repo, start)
}

/// walk the ancestry chain from `head`, most recent first
///
/// With a `path`, a commit is included only if the content reachable at
/// that path differs between the commit and its parent. The root commit
/// diffs against the empty tree, so it qualifies for every path it
/// introduced.
pub fn log(repo: &Repository, head: CommitId, path: Option<&str>) -> StoreResult<Vec<CommitInfo>> {
    let mut out = Vec::new();
    for item in history(repo, head)? {
        let info = item?;
        match path {
            None => out.push(info),
            Some(p) => {
                if commit_touches(repo, &info, p)? {
                    out.push(info);
                }
            }
        }
    }
    Ok(out)
}

/// true if the content reachable at `path` differs between this commit
/// and its parent
fn commit_touches(repo: &Repository, info: &CommitInfo, path: &str) -> StoreResult<bool> {
    let new_tree = repo.find_tree(info.tree_id.raw())?;
    let old_tree = match info.parent {
        Some(parent) => Some(repo.find_commit(parent.raw())?.tree()?),
        None => None,
    };

    let mut opts = DiffOptions::new();
    opts.pathspec(path);
    let diff = repo.diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut opts))?;
    Ok(diff.deltas().len() > 0)
}

/// a historical object resolved directly by id, independent of ancestry
#[derive(Debug)]
pub enum Object {
    Blob { id: BlobId, content: Vec<u8> },
    Tree(WorkingTree),
}

impl Object {
    /// true if the object is a tree
    pub fn is_tree(&self) -> bool {
        matches!(self, Object::Tree(_))
    }
}

/// resolve any blob or tree by its object id
///
/// This is the basis for viewing and diffing arbitrary past revisions
/// without replaying history. A blob resolved this way has no known
/// parent entry, so no file mode.
pub fn get_from_id(repo: &Repository, id: ObjectId) -> StoreResult<Object> {
    let obj = repo
        .find_object(id.raw(), None)
        .map_err(|_| StoreError::ObjectNotFound(id.to_string()))?;

    match obj.kind() {
        Some(ObjectType::Blob) => {
            let blob_id = BlobId::new(id.raw());
            Ok(Object::Blob {
                id: blob_id,
                content: blob::read(repo, blob_id)?,
            })
        }
        Some(ObjectType::Tree) => Ok(Object::Tree(WorkingTree::load(
            repo,
            TreeId::new(id.raw()),
        )?)),
        kind => Err(StoreError::UnexpectedObjectType {
            path: id.to_string(),
            expected: "blob or tree".to_string(),
            found: format!("{:?}", kind),
        }),
    }
}
