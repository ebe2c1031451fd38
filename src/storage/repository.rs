//! Core Git repository wrapper.
//!
//! This is the central component of the storage layer. It wraps
//! `git2::Repository` with thread-safe access and exposes the operations
//! the web layer calls into: path reads, per-request edit sessions,
//! history, object access by id, diffing and search.
//!
//! Each request opens its own [`WikiSession`] snapshot from the HEAD of
//! the moment; there is no shared mutable in-memory tree across requests.
//! The only shared mutable state is the object store and the HEAD ref,
//! both behind the repository lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Repository;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::storage::blob;
use crate::storage::commit::{self, CommitBuilder, CommitInfo, Object};
use crate::storage::diff::{self, DiffOutput};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::refs::RefManager;
use crate::storage::tree::{Entry, WorkingTree};
use crate::storage::types::{Author, BlobId, CommitId, FileMode, ObjectId, TreeId, WikiPath};

/// The main Git repository wrapper.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct WikiRepository {
    inner: Arc<WikiRepositoryInner>,
}

// a Mutex rather than an RwLock: libgit2 does not permit concurrent
// readers of one Repository handle, and Repository is Send but not Sync
struct WikiRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
}

impl WikiRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let repo =
            Repository::open(path).map_err(|_| StoreError::NotInitialized(path.to_path_buf()))?;

        Ok(Self {
            inner: Arc::new(WikiRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
            }),
        })
    }

    /// Initialize a new repository with an initial empty-tree commit.
    pub fn init(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;

        let storage = Self {
            inner: Arc::new(WikiRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
            }),
        };

        storage.with_repo_mut(|repo| {
            let tree = WorkingTree::empty(repo)?;
            let commit_id = CommitBuilder::new(repo)
                .tree(tree.id())
                .author(Author::anonymous())
                .message("Initialize wiki")
                .commit()?;
            RefManager::init_main(repo, commit_id)?;
            info!(commit = %commit_id.short(), "initialized wiki repository");
            Ok(())
        })?;

        Ok(storage)
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Execute a function with access to the repository.
    pub(crate) fn with_repo<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Repository) -> StoreResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    /// Execute a function with exclusive access to the repository,
    /// held across a check-then-commit sequence.
    pub(crate) fn with_repo_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Repository) -> StoreResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    // ==================== Snapshots ====================

    /// Get the current HEAD commit.
    pub fn head(&self) -> StoreResult<CommitId> {
        self.with_repo(RefManager::head_commit)
    }

    /// Get the tree id of HEAD's commit.
    ///
    /// This is the base version an edit form captures for later conflict
    /// detection.
    pub fn current_tree_id(&self) -> StoreResult<TreeId> {
        self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            commit::tree_id_at(repo, head)
        })
    }

    /// Open a fresh working-tree session pinned to the current HEAD.
    pub fn session(&self) -> StoreResult<WikiSession> {
        let (base, tree) = self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            let tree = WorkingTree::load(repo, commit::tree_id_at(repo, head)?)?;
            Ok((head, tree))
        })?;
        debug!(head = %base.short(), "opened session");

        Ok(WikiSession {
            repo: self.clone(),
            base,
            tree,
        })
    }

    // ==================== Head-pinned reads ====================

    /// Resolve a path against the current HEAD.
    pub fn get(&self, path: &str) -> StoreResult<PathObject> {
        self.session()?.get(path)
    }

    /// Check whether a path resolves against the current HEAD.
    pub fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.session()?.exists(path))
    }

    /// Check whether a fresh document could be created at `path`.
    pub fn can_create(&self, path: &str) -> StoreResult<bool> {
        Ok(self.session()?.can_create(path))
    }

    // ==================== History ====================

    /// Walk the ancestry chain from HEAD, most recent first.
    ///
    /// With a path, only commits that changed the content reachable at
    /// that path are included.
    pub fn log(&self, path: Option<&str>) -> StoreResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            commit::log(repo, head, path)
        })
    }

    /// Get information about a single commit.
    pub fn commit_info(&self, id: CommitId) -> StoreResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// Resolve any historical blob or tree directly by id.
    pub fn get_from_id(&self, id: ObjectId) -> StoreResult<Object> {
        self.with_repo(|repo| commit::get_from_id(repo, id))
    }

    /// Diff two objects by id (two trees or two blobs).
    pub fn diff(&self, a: ObjectId, b: ObjectId) -> StoreResult<DiffOutput> {
        self.with_repo(|repo| diff::diff_objects(repo, a, b))
    }

    // ==================== Search ====================

    /// Linear scan over every blob reachable from HEAD.
    ///
    /// A document matches when its path or its decoded text content
    /// contains the case-folded keyword. Non-UTF-8 blobs match on path
    /// only. No ranking and no index; fine at single-wiki volumes.
    pub fn search(&self, keyword: &str) -> StoreResult<Vec<String>> {
        let needle = keyword.to_lowercase();
        self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            let tree = WorkingTree::load(repo, commit::tree_id_at(repo, head)?)?;

            let mut hits = Vec::new();
            for (path, blob_ref) in tree.blobs() {
                if path.to_lowercase().contains(&needle) {
                    hits.push(path);
                    continue;
                }
                let bytes = blob::read(repo, blob_ref.id)?;
                if let Ok(text) = std::str::from_utf8(&bytes) {
                    if text.to_lowercase().contains(&needle) {
                        hits.push(path);
                    }
                }
            }
            Ok(hits)
        })
    }
}

/// A resolved path, with owned content ready for the web layer.
#[derive(Debug)]
pub enum PathObject {
    /// a document: raw bytes plus the mode recorded by its parent tree
    Document {
        id: BlobId,
        mode: FileMode,
        content: Vec<u8>,
    },
    /// a directory listing
    Directory { id: TreeId, entries: Vec<DirEntry> },
}

/// one entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_tree: bool,
}

/// A per-request edit session: a working-tree snapshot pinned to the HEAD
/// it was loaded from.
///
/// Reads accept the empty path (the root directory); mutations require a
/// validated [`WikiPath`]. `commit` consumes the session: a working tree
/// either becomes the tree of a new commit or is discarded.
pub struct WikiSession {
    repo: WikiRepository,
    base: CommitId,
    tree: WorkingTree,
}

impl WikiSession {
    /// the HEAD commit this session snapshotted from
    pub fn base_commit(&self) -> CommitId {
        self.base
    }

    /// the session's working tree
    pub fn tree(&self) -> &WorkingTree {
        &self.tree
    }

    /// Resolve a path to an owned object; the empty path is the root
    /// directory.
    pub fn get(&self, path: &str) -> StoreResult<PathObject> {
        if !path.is_empty() {
            WikiPath::new(path)?;
        }
        let entry = self.tree.get(path)?;
        match entry {
            Entry::Blob(b) => {
                let content = self.repo.with_repo(|repo| blob::read(repo, b.id))?;
                Ok(PathObject::Document {
                    id: b.id,
                    mode: b.mode,
                    content,
                })
            }
            Entry::Tree(t) => Ok(PathObject::Directory {
                id: t.id(),
                entries: t
                    .children()
                    .map(|(name, node)| DirEntry {
                        name: name.to_string(),
                        is_tree: node.is_tree(),
                    })
                    .collect(),
            }),
        }
    }

    /// Read a document's content.
    pub fn read(&self, path: &WikiPath) -> StoreResult<Vec<u8>> {
        match self.tree.get(path.as_str())? {
            Entry::Blob(b) => self.repo.with_repo(|repo| blob::read(repo, b.id)),
            Entry::Tree(_) => Err(StoreError::UnexpectedObjectType {
                path: path.to_string(),
                expected: "blob".to_string(),
                found: "tree".to_string(),
            }),
        }
    }

    /// True if the path resolves; malformed paths simply don't exist.
    pub fn exists(&self, path: &str) -> bool {
        if !path.is_empty() && WikiPath::new(path).is_err() {
            return false;
        }
        self.tree.exists(path)
    }

    /// True if a fresh document could be created at `path`.
    pub fn can_create(&self, path: &str) -> bool {
        if WikiPath::new(path).is_err() {
            return false;
        }
        self.tree.can_create_blob(path)
    }

    /// Write a document into the session's working tree.
    pub fn add(&mut self, path: &WikiPath, content: &[u8]) -> StoreResult<BlobId> {
        let tree = &mut self.tree;
        self.repo
            .with_repo(|repo| tree.add(repo, path.as_str(), content))
    }

    /// Remove a document from the session's working tree.
    pub fn remove(&mut self, path: &WikiPath) -> StoreResult<()> {
        let tree = &mut self.tree;
        self.repo
            .with_repo(|repo| tree.remove(repo, path.as_str()))
    }

    /// Commit the session's tree as a new child of the snapshotted HEAD
    /// and advance HEAD, but only if HEAD has not moved since the
    /// snapshot was taken.
    pub fn commit(self, author: &Author, message: &str) -> StoreResult<CommitId> {
        // rejected before anything is written
        if message.trim().is_empty() {
            return Err(StoreError::EmptyCommitMessage);
        }

        let base = self.base;
        let tree_id = self.tree.id();

        self.repo.with_repo_mut(|repo| {
            let commit_id = CommitBuilder::new(repo)
                .tree(tree_id)
                .parent(base)
                .author(author.clone())
                .message(message)
                .commit()?;
            // the check and the ref move are atomic under the repo lock;
            // a losing commit object stays unreachable in the store
            RefManager::advance_head(repo, base, commit_id)?;
            info!(
                commit = %commit_id.short(),
                author = %author.name,
                "committed"
            );
            Ok(commit_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::diff::DiffLine;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WikiRepository) {
        let dir = TempDir::new().unwrap();
        let repo = WikiRepository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn path(p: &str) -> WikiPath {
        WikiPath::new(p).unwrap()
    }

    fn author() -> Author {
        Author::new("test", "test@test.invalid")
    }

    #[test]
    fn test_init_and_open() {
        let dir = TempDir::new().unwrap();

        let repo = WikiRepository::init(dir.path()).unwrap();
        let head1 = repo.head().unwrap();

        drop(repo);
        let repo = WikiRepository::open(dir.path()).unwrap();
        assert_eq!(repo.head().unwrap(), head1);
    }

    #[test]
    fn test_open_or_init() {
        let dir = TempDir::new().unwrap();

        let repo1 = WikiRepository::open_or_init(dir.path()).unwrap();
        let head1 = repo1.head().unwrap();

        drop(repo1);
        let repo2 = WikiRepository::open_or_init(dir.path()).unwrap();
        assert_eq!(repo2.head().unwrap(), head1);
    }

    #[test]
    fn test_add_commit_read_cycle() {
        let (_dir, repo) = setup();

        let mut session = repo.session().unwrap();
        session.add(&path("page.md"), b"# Title\n").unwrap();
        let commit_id = session.commit(&author(), "add page").unwrap();

        assert_eq!(repo.head().unwrap(), commit_id);
        match repo.get("page.md").unwrap() {
            PathObject::Document { content, mode, .. } => {
                assert_eq!(content, b"# Title\n");
                assert_eq!(mode, FileMode::Normal);
            }
            PathObject::Directory { .. } => panic!("expected document"),
        }
    }

    #[test]
    fn test_root_listing() {
        let (_dir, repo) = setup();

        let mut session = repo.session().unwrap();
        session.add(&path("dir/inner.md"), b"x").unwrap();
        session.add(&path("top.md"), b"y").unwrap();
        session.commit(&author(), "seed").unwrap();

        match repo.get("").unwrap() {
            PathObject::Directory { entries, .. } => {
                assert_eq!(
                    entries,
                    vec![
                        DirEntry {
                            name: "dir".to_string(),
                            is_tree: true
                        },
                        DirEntry {
                            name: "top.md".to_string(),
                            is_tree: false
                        },
                    ]
                );
            }
            PathObject::Document { .. } => panic!("expected directory"),
        }
    }

    #[test]
    fn test_exists_and_can_create() {
        let (_dir, repo) = setup();

        let mut session = repo.session().unwrap();
        session.add(&path("dir/page.md"), b"x").unwrap();
        session.commit(&author(), "seed").unwrap();

        assert!(repo.exists("dir/page.md").unwrap());
        assert!(repo.exists("").unwrap());
        assert!(!repo.exists("missing").unwrap());
        assert!(!repo.exists("//bad//").unwrap());

        assert!(repo.can_create("dir/new.md").unwrap());
        assert!(!repo.can_create("dir/page.md").unwrap());
        assert!(!repo.can_create("dir").unwrap());
    }

    #[test]
    fn test_empty_commit_message_rejected() {
        let (_dir, repo) = setup();

        let mut session = repo.session().unwrap();
        session.add(&path("page.md"), b"x").unwrap();
        let head_before = repo.head().unwrap();

        let result = session.commit(&author(), "  \n");
        assert!(matches!(result, Err(StoreError::EmptyCommitMessage)));
        assert_eq!(repo.head().unwrap(), head_before);
    }

    #[test]
    fn test_concurrent_commit_detected() {
        let (_dir, repo) = setup();

        // two sessions snapshot the same HEAD
        let mut first = repo.session().unwrap();
        let mut second = repo.session().unwrap();

        first.add(&path("a.md"), b"a").unwrap();
        first.commit(&author(), "first wins").unwrap();

        second.add(&path("b.md"), b"b").unwrap();
        let result = second.commit(&author(), "second loses");
        assert!(matches!(
            result,
            Err(StoreError::ConcurrentModification { .. })
        ));

        // the loser's tree must not have clobbered the winner's
        assert!(repo.exists("a.md").unwrap());
        assert!(!repo.exists("b.md").unwrap());
    }

    #[test]
    fn test_log_full_and_filtered() {
        let (_dir, repo) = setup();

        let mut s = repo.session().unwrap();
        s.add(&path("a.md"), b"a").unwrap();
        let c1 = s.commit(&author(), "add a").unwrap();

        let mut s = repo.session().unwrap();
        s.add(&path("b.md"), b"b").unwrap();
        let c2 = s.commit(&author(), "add b").unwrap();

        let all = repo.log(None).unwrap();
        // init + two edits, most recent first
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, c2);
        assert_eq!(all[1].id, c1);

        let only_a = repo.log(Some("a.md")).unwrap();
        let ids: Vec<_> = only_a.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c1]);
    }

    #[test]
    fn test_current_tree_id_tracks_head() {
        let (_dir, repo) = setup();
        let t0 = repo.current_tree_id().unwrap();

        let mut s = repo.session().unwrap();
        s.add(&path("page.md"), b"x").unwrap();
        s.commit(&author(), "edit").unwrap();

        let t1 = repo.current_tree_id().unwrap();
        assert_ne!(t0, t1);
    }

    #[test]
    fn test_get_from_id_round_trip() {
        let (_dir, repo) = setup();

        let mut s = repo.session().unwrap();
        let blob_id = s.add(&path("page.md"), b"historic").unwrap();
        s.commit(&author(), "edit").unwrap();

        match repo.get_from_id(blob_id.into()).unwrap() {
            Object::Blob { content, .. } => assert_eq!(content, b"historic"),
            Object::Tree(_) => panic!("expected blob"),
        }
    }

    #[test]
    fn test_diff_blobs_by_id() {
        let (_dir, repo) = setup();

        let mut s = repo.session().unwrap();
        let v1 = s.add(&path("page.md"), b"one\ntwo\n").unwrap();
        s.commit(&author(), "v1").unwrap();

        let mut s = repo.session().unwrap();
        let v2 = s.add(&path("page.md"), b"one\ntwo changed\n").unwrap();
        s.commit(&author(), "v2").unwrap();

        match repo.diff(v1.into(), v2.into()).unwrap() {
            DiffOutput::Text(d) => {
                let lines: Vec<_> = d.hunks.iter().flat_map(|h| h.lines.iter()).collect();
                assert!(lines.contains(&&DiffLine::Added("two changed".to_string())));
            }
            DiffOutput::Structural(_) => panic!("expected text diff"),
        }
    }

    #[test]
    fn test_search_matches_path_and_content() {
        let (_dir, repo) = setup();

        let mut s = repo.session().unwrap();
        s.add(&path("recipes/Curry.md"), b"Spicy dinner idea\n").unwrap();
        s.add(&path("notes/todo.md"), b"buy CURRY powder\n").unwrap();
        s.add(&path("other.md"), b"unrelated\n").unwrap();
        s.commit(&author(), "seed").unwrap();

        let hits = repo.search("curry").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&"recipes/Curry.md".to_string()));
        assert!(hits.contains(&"notes/todo.md".to_string()));

        assert!(repo.search("nothing like this").unwrap().is_empty());
    }

    #[test]
    fn test_repository_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WikiRepository>();

        let (_dir, repo) = setup();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let repo = repo.clone();
                std::thread::spawn(move || {
                    let mut session = repo.session().unwrap();
                    session
                        .add(&path(&format!("thread-{i}.md")), b"x")
                        .unwrap();
                    // losing the HEAD race is fine here
                    let _ = session.commit(&author(), "parallel edit");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // the first writer to reach the CAS always wins
        assert!(repo.log(None).unwrap().len() >= 2);
    }

    #[test]
    fn test_remove_commits_pruned_tree() {
        let (_dir, repo) = setup();

        let mut s = repo.session().unwrap();
        s.add(&path("dir/only.md"), b"x").unwrap();
        s.add(&path("keep.md"), b"y").unwrap();
        s.commit(&author(), "seed").unwrap();

        let mut s = repo.session().unwrap();
        s.remove(&path("dir/only.md")).unwrap();
        s.commit(&author(), "remove").unwrap();

        assert!(!repo.exists("dir").unwrap());
        assert!(repo.exists("keep.md").unwrap());
    }
}
