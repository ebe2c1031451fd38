//! Storage layer error types
//!
//! All errors that can occur during storage operations are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages.

use std::path::PathBuf;

use thiserror::Error;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// a path segment did not resolve to anything
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// the path shape is unusable, or traversal hit a blob where a tree
    /// was expected
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// the target path is blocked by an existing conflicting entry
    #[error("cannot create '{path}': blocked by an existing entry")]
    CannotCreate { path: String },

    /// commit message was empty; rejected before any mutation
    #[error("commit message must not be empty")]
    EmptyCommitMessage,

    /// HEAD moved between snapshot and commit
    #[error("concurrent modification: HEAD moved from {expected} to {found}")]
    ConcurrentModification { expected: String, found: String },

    /// the object id does not parse as a hash
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// no blob or tree exists with the given id
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// the object has an unexpected type
    #[error("unexpected object type at {path}: expected {expected}, found {found}")]
    UnexpectedObjectType {
        path: String,
        expected: String,
        found: String,
    },

    /// the commit was not found
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// repo is empty (no commits)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// invalid UTF-8 in blob content
    #[error("invalid utf-8 in blob: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::PathNotFound(_)
                | StoreError::ObjectNotFound(_)
                | StoreError::CommitNotFound(_)
        )
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::CannotCreate { .. } | StoreError::ConcurrentModification { .. }
        )
    }

    /// check if this error is recoverable by retrying from the new HEAD
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::ConcurrentModification { .. })
    }
}

/// result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
