//! Optimistic-concurrency submit path.
//!
//! An edit form carries the blob id of the version it was rendered from.
//! On submit the coordinator compares that base id against the blob
//! currently at the path: unchanged means a fast-path commit, changed
//! means a concurrent write won the race and the two edits are
//! reconciled with a three-way merge. Only overlapping edits come back
//! to the caller as a conflict; the rest commit transparently.
//!
//! Conflicts are detected by comparing object ids, never timestamps, so
//! unrelated edits elsewhere in the tree can never produce a false
//! positive.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::merge::{MergeDriver, MergeError};
use crate::storage::{blob, Author, BlobId, CommitId, Entry, StoreError, WikiPath, WikiRepository};

/// HEAD moving underneath a submission is recoverable by re-reading and
/// re-merging, but not forever.
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// One submitted edit, exactly as the edit form posted it.
#[derive(Debug, Clone)]
pub struct EditSubmission {
    pub path: WikiPath,
    pub content: String,
    /// blob id the editor started from; `None` when creating a new page
    pub base: Option<BlobId>,
    pub message: String,
    pub author: Author,
}

/// Where a submission ended up.
#[derive(Debug)]
pub enum SubmitOutcome {
    Committed {
        commit: CommitId,
        /// true when a three-way merge ran before committing
        merged: bool,
    },
    /// Both sides edited overlapping lines. The caller re-renders the
    /// edit form with the marked-up text, the preserved message, and the
    /// base id reset to the version that won the race.
    Conflicted {
        text: String,
        base: BlobId,
        message: String,
    },
}

pub struct MergeCoordinator {
    repo: WikiRepository,
    driver: Arc<dyn MergeDriver>,
}

impl MergeCoordinator {
    pub fn new(repo: WikiRepository, driver: Arc<dyn MergeDriver>) -> Self {
        Self { repo, driver }
    }

    /// Submit an edit, committing it if possible.
    ///
    /// Retries from a fresh snapshot when HEAD moves between the
    /// snapshot and the commit, up to [`MAX_ATTEMPTS`] times.
    pub fn submit(&self, submission: EditSubmission) -> Result<SubmitOutcome, SubmitError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_submit(&submission) {
                Err(SubmitError::Store(e)) if e.is_retriable() && attempt < MAX_ATTEMPTS => {
                    debug!(
                        path = %submission.path,
                        attempt,
                        "head moved during submit, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    fn try_submit(&self, submission: &EditSubmission) -> Result<SubmitOutcome, SubmitError> {
        let mut session = self.repo.session()?;

        let head_blob = match session.tree().get(submission.path.as_str()) {
            Ok(Entry::Blob(b)) => Some(b.id),
            Ok(Entry::Tree(_)) => {
                return Err(StoreError::UnexpectedObjectType {
                    path: submission.path.to_string(),
                    expected: "blob".to_string(),
                    found: "tree".to_string(),
                }
                .into())
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        match head_blob {
            // nothing at the path: creation, whether the editor thought
            // so or the page was deleted while the form was open
            None => {
                session.add(&submission.path, submission.content.as_bytes())?;
                let commit = session.commit(&submission.author, &submission.message)?;
                Ok(SubmitOutcome::Committed {
                    commit,
                    merged: false,
                })
            }

            // no concurrent change, commit as-is
            Some(head) if submission.base == Some(head) => {
                session.add(&submission.path, submission.content.as_bytes())?;
                let commit = session.commit(&submission.author, &submission.message)?;
                Ok(SubmitOutcome::Committed {
                    commit,
                    merged: false,
                })
            }

            // a concurrent write landed between edit-open and submit
            Some(head) => {
                let theirs = self.blob_text(head)?;
                let base = match submission.base {
                    Some(id) => self.blob_text(id)?,
                    None => String::new(),
                };

                let outcome = self
                    .driver
                    .merge(&base, &submission.content, &theirs)?;

                if outcome.clean {
                    session.add(&submission.path, outcome.text.as_bytes())?;
                    let commit = session.commit(&submission.author, &submission.message)?;
                    debug!(path = %submission.path, "concurrent edits merged cleanly");
                    Ok(SubmitOutcome::Committed {
                        commit,
                        merged: true,
                    })
                } else {
                    warn!(path = %submission.path, "merge conflict, returning to editor");
                    Ok(SubmitOutcome::Conflicted {
                        text: outcome.text,
                        base: head,
                        message: submission.message.clone(),
                    })
                }
            }
        }
    }

    fn blob_text(&self, id: BlobId) -> Result<String, SubmitError> {
        Ok(self.repo.with_repo(|repo| blob::read_text(repo, id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{Diff3Driver, MergeOutcome};
    use crate::storage::PathObject;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn setup() -> (TempDir, WikiRepository, MergeCoordinator) {
        let dir = TempDir::new().unwrap();
        let repo = WikiRepository::init(dir.path()).unwrap();
        let coordinator = MergeCoordinator::new(repo.clone(), Arc::new(Diff3Driver));
        (dir, repo, coordinator)
    }

    fn author() -> Author {
        Author::new("test", "test@test.invalid")
    }

    fn path(p: &str) -> WikiPath {
        WikiPath::new(p).unwrap()
    }

    fn seed(repo: &WikiRepository, p: &str, content: &str) -> BlobId {
        let mut session = repo.session().unwrap();
        let id = session.add(&path(p), content.as_bytes()).unwrap();
        session.commit(&author(), "seed").unwrap();
        id
    }

    fn page_text(repo: &WikiRepository, p: &str) -> String {
        match repo.get(p).unwrap() {
            PathObject::Document { content, .. } => String::from_utf8(content).unwrap(),
            PathObject::Directory { .. } => panic!("expected document"),
        }
    }

    fn submission(p: &str, content: &str, base: Option<BlobId>) -> EditSubmission {
        EditSubmission {
            path: path(p),
            content: content.to_string(),
            base,
            message: "edit".to_string(),
            author: author(),
        }
    }

    /// proves a code path was never reached
    struct PanicDriver;
    impl MergeDriver for PanicDriver {
        fn merge(&self, _: &str, _: &str, _: &str) -> Result<MergeOutcome, MergeError> {
            panic!("merge driver invoked on a fast path");
        }
    }

    #[test]
    fn test_create_never_merges() {
        let (_dir, repo, _) = setup();
        let coordinator = MergeCoordinator::new(repo.clone(), Arc::new(PanicDriver));

        let outcome = coordinator
            .submit(submission("new.md", "hello\n", None))
            .unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Committed { merged: false, .. }
        ));
        assert_eq!(page_text(&repo, "new.md"), "hello\n");
    }

    #[test]
    fn test_fast_path_never_merges() {
        let (_dir, repo, _) = setup();
        let base = seed(&repo, "page.md", "v1\n");
        let coordinator = MergeCoordinator::new(repo.clone(), Arc::new(PanicDriver));

        let outcome = coordinator
            .submit(submission("page.md", "v2\n", Some(base)))
            .unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Committed { merged: false, .. }
        ));
        assert_eq!(page_text(&repo, "page.md"), "v2\n");
    }

    #[test]
    fn test_disjoint_concurrent_edits_merge_and_commit() {
        let (_dir, repo, coordinator) = setup();
        let base = seed(&repo, "page.md", "L1\nL2\nL3\n");

        // a concurrent writer wins the race
        seed(&repo, "page.md", "L1\nL2\nL3x\n");

        let outcome = coordinator
            .submit(submission("page.md", "L1x\nL2\nL3\n", Some(base)))
            .unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Committed { merged: true, .. }
        ));
        assert_eq!(page_text(&repo, "page.md"), "L1x\nL2\nL3x\n");
    }

    #[test]
    fn test_overlapping_edits_conflict_and_reset_base() {
        let (_dir, repo, coordinator) = setup();
        let stale = seed(&repo, "page.md", "L1\nL2\nL3\n");

        let winner = seed(&repo, "page.md", "L1\nL2-theirs\nL3\n");

        let outcome = coordinator
            .submit(EditSubmission {
                path: path("page.md"),
                content: "L1\nL2-ours\nL3\n".to_string(),
                base: Some(stale),
                message: "my attempt".to_string(),
                author: author(),
            })
            .unwrap();

        match outcome {
            SubmitOutcome::Conflicted {
                text,
                base,
                message,
            } => {
                assert!(text.contains("<<<<<<< ours\nL2-ours\n"));
                assert!(text.contains("||||||| base\nL2\n"));
                assert!(text.contains("=======\nL2-theirs\n"));
                // next submission compares against the version that won
                assert_eq!(base, winner);
                assert_ne!(base, stale);
                assert_eq!(message, "my attempt");
            }
            SubmitOutcome::Committed { .. } => panic!("expected conflict"),
        }

        // nothing was committed
        assert_eq!(page_text(&repo, "page.md"), "L1\nL2-theirs\nL3\n");
    }

    #[test]
    fn test_page_deleted_while_editing_becomes_create() {
        let (_dir, repo, coordinator) = setup();
        let base = seed(&repo, "page.md", "old\n");

        let mut session = repo.session().unwrap();
        session.remove(&path("page.md")).unwrap();
        session.commit(&author(), "delete").unwrap();

        let outcome = coordinator
            .submit(submission("page.md", "revived\n", Some(base)))
            .unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Committed { merged: false, .. }
        ));
        assert_eq!(page_text(&repo, "page.md"), "revived\n");
    }

    #[test]
    fn test_simultaneous_creation_merges_against_empty_base() {
        let (_dir, repo, coordinator) = setup();

        // someone else created the page first
        seed(&repo, "page.md", "theirs\n");

        let outcome = coordinator
            .submit(submission("page.md", "ours\n", None))
            .unwrap();
        match outcome {
            SubmitOutcome::Conflicted { text, .. } => {
                assert!(text.contains("ours\n"));
                assert!(text.contains("theirs\n"));
            }
            SubmitOutcome::Committed { .. } => panic!("expected conflict"),
        }
    }

    #[test]
    fn test_identical_simultaneous_creation_commits() {
        let (_dir, repo, coordinator) = setup();
        seed(&repo, "page.md", "same\n");

        let outcome = coordinator
            .submit(submission("page.md", "same\n", None))
            .unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Committed { merged: true, .. }
        ));
    }

    #[test]
    fn test_submitting_onto_directory_is_rejected() {
        let (_dir, repo, coordinator) = setup();
        seed(&repo, "dir/inner.md", "x\n");

        let result = coordinator.submit(submission("dir", "content\n", None));
        assert!(matches!(
            result,
            Err(SubmitError::Store(StoreError::UnexpectedObjectType { .. }))
        ));
    }

    #[test]
    fn test_empty_message_propagates() {
        let (_dir, repo, coordinator) = setup();
        let base = seed(&repo, "page.md", "v1\n");

        let result = coordinator.submit(EditSubmission {
            path: path("page.md"),
            content: "v2\n".to_string(),
            base: Some(base),
            message: "   ".to_string(),
            author: author(),
        });
        assert!(matches!(
            result,
            Err(SubmitError::Store(StoreError::EmptyCommitMessage))
        ));
    }

    /// merges cleanly but moves HEAD behind the coordinator's back on
    /// every call, so every commit attempt loses its race
    struct SneakyDriver {
        repo: WikiRepository,
        calls: AtomicUsize,
    }
    impl MergeDriver for SneakyDriver {
        fn merge(&self, base: &str, ours: &str, theirs: &str) -> Result<MergeOutcome, MergeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut session = self.repo.session().unwrap();
            let n = self.calls.load(Ordering::SeqCst);
            session
                .add(&WikiPath::new("unrelated.md").unwrap(), n.to_string().as_bytes())
                .unwrap();
            session
                .commit(&Author::anonymous(), "interloper")
                .unwrap();
            Diff3Driver.merge(base, ours, theirs)
        }
    }

    #[test]
    fn test_cas_losses_retry_up_to_the_bound() {
        let (_dir, repo, _) = setup();
        let stale = seed(&repo, "page.md", "L1\nL2\nL3\n");
        seed(&repo, "page.md", "L1\nL2\nL3x\n");

        let driver = Arc::new(SneakyDriver {
            repo: repo.clone(),
            calls: AtomicUsize::new(0),
        });
        let coordinator = MergeCoordinator::new(repo.clone(), driver.clone());

        let result = coordinator.submit(submission("page.md", "L1x\nL2\nL3\n", Some(stale)));
        assert!(matches!(
            result,
            Err(SubmitError::Store(StoreError::ConcurrentModification { .. }))
        ));
        assert_eq!(driver.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
