//! storage layer for the wiki
//!
//! this module provides a complete abstraction over git for wiki storage.
//! The upper layers (merge coordinator, web handlers) use this API and never
//! touch git2 directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WikiRepository                          │
//! │   (High-level API: pages, sessions, history, search)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │    blob     │       │    refs     │
//!  │ (hierarchy) │       │  (content)  │       │   (HEAD)    │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │                     │                     │
//!         └─────────────────────┼─────────────────────┘
//!                               │
//!                               ▼
//!                        ┌─────────────┐
//!                        │   commit    │
//!                        │  (history)  │
//!                        └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use gitwiki::storage::{Author, WikiPath, WikiRepository};
//!
//! // Initialize or open
//! let repo = WikiRepository::open_or_init("./wiki")?;
//!
//! // Edit through a session pinned to the current HEAD
//! let mut session = repo.session()?;
//! session.add(&WikiPath::new("recipes/curry.md")?, b"# Curry\n")?;
//! session.commit(&Author::new("alice", "alice@example.com"), "add curry")?;
//!
//! // Read back
//! let page = repo.get("recipes/curry.md")?;
//! ```

pub(crate) mod blob;
mod commit;
mod diff;
mod error;
mod refs;
mod repository;
mod tree;
mod types;

// Re-export public API
pub use commit::{CommitInfo, Object};
pub use diff::{BlobDiff, DiffHunk, DiffLine, DiffOutput};
pub use error::{StoreError, StoreResult};
pub use repository::{DirEntry, PathObject, WikiRepository, WikiSession};
pub use tree::{BlobRef, Entry, Node, TreeNode, WorkingTree};
pub use types::{
    Author, BlobId, Change, ChangeStatus, CommitId, FileMode, ObjectId, TreeId, WikiPath,
};
