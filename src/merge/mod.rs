//! concurrent-edit resolution
//!
//! No locks are held while a user has an edit form open. When two edits
//! race, the loser's submission is reconciled against the winner's with a
//! line-based three-way merge, and only genuinely overlapping changes come
//! back to the user as conflicts.
//!
//! The merge itself is an injectable capability behind [`MergeDriver`]:
//! the default is the in-process [`Diff3Driver`], and deployments that
//! want RCS merge(1) or a custom tool can swap in
//! [`ExternalMergeDriver`].

mod coordinator;
mod diff3;
mod external;

use std::time::Duration;

use thiserror::Error;

pub use coordinator::{EditSubmission, MergeCoordinator, SubmitError, SubmitOutcome};
pub use diff3::Diff3Driver;
pub use external::ExternalMergeDriver;

/// Result of a three-way merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// merged text; contains conflict markers when `clean` is false
    pub text: String,
    /// true when every region merged without overlap
    pub clean: bool,
}

/// Errors from a merge driver.
///
/// A conflict is not an error. Drivers report conflicts through
/// [`MergeOutcome::clean`]; these variants mean the merge itself could
/// not run.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merge tool exited abnormally: {0}")]
    Tool(String),

    #[error("merge tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error during merge: {0}")]
    Io(#[from] std::io::Error),

    #[error("merge tool produced invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// A three-way line merge of two divergent edits of a common ancestor.
///
/// Implementations must be deterministic and side-effect free on their
/// inputs; conflict markers in the output bracket the ours, base and
/// theirs variants of each conflicting region.
pub trait MergeDriver: Send + Sync {
    fn merge(&self, base: &str, ours: &str, theirs: &str) -> Result<MergeOutcome, MergeError>;
}
