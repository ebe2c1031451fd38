//! HEAD reference management.
//!
//! The wiki keeps a single linear branch. HEAD is the only mutable piece
//! of state in the whole store, and it only ever moves through a
//! compare-and-swap: an advance succeeds only if HEAD still points at the
//! commit the writer snapshotted from. Without this guard two concurrent
//! commits could race and one would silently lose updates to unrelated
//! paths.

use git2::Repository;

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::CommitId;

/// the branch all wiki commits land on
pub(crate) const MAIN_REF: &str = "refs/heads/main";

/// Manages the HEAD reference.
pub struct RefManager;

impl RefManager {
    /// Get the current HEAD commit.
    pub fn head_commit(repo: &Repository) -> StoreResult<CommitId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                StoreError::EmptyRepository
            } else {
                StoreError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// Advance HEAD to `target`, but only if it still points at `expected`.
    ///
    /// Compare-and-swap semantics: callers hold the repository lock, so
    /// the check and the move are atomic with respect to other sessions
    /// in this process.
    pub fn advance_head(
        repo: &Repository,
        expected: CommitId,
        target: CommitId,
    ) -> StoreResult<()> {
        let current = Self::head_commit(repo)?;
        if current != expected {
            return Err(StoreError::ConcurrentModification {
                expected: expected.short(),
                found: current.short(),
            });
        }

        let mut head = repo.head()?;
        head.set_target(
            target.raw(),
            &format!("commit: advance to {}", target.short()),
        )?;

        Ok(())
    }

    /// Point HEAD at the main branch and create it at `initial_commit`.
    ///
    /// Called once right after the initial commit of a fresh repository.
    pub fn init_main(repo: &Repository, initial_commit: CommitId) -> StoreResult<()> {
        if repo.find_reference(MAIN_REF).is_err() {
            let commit = repo.find_commit(initial_commit.raw())?;
            repo.branch("main", &commit, false)?;
        }
        repo.set_head(MAIN_REF)?;
        Ok(())
    }
}
