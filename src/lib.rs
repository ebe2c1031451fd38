//! GitWiki - a Git-backed wiki storage engine
//!
//! This crate stores a wiki's pages as a Git object graph. Every page is
//! a blob, every directory a tree, every save a commit, and the full
//! edit history of the wiki is preserved in `.git/`. Concurrent edits
//! are reconciled with optimistic concurrency control and a three-way
//! line merge instead of locks.
//!
//! # Example
//!
//! ```no_run
//! use gitwiki::storage::{Author, WikiPath, WikiRepository};
//!
//! let repo = WikiRepository::open_or_init("./wiki").unwrap();
//! let mut session = repo.session().unwrap();
//! session
//!     .add(&WikiPath::new("recipes/curry.md").unwrap(), b"# Curry\n")
//!     .unwrap();
//! session
//!     .commit(&Author::new("alice", "alice@example.com"), "add curry")
//!     .unwrap();
//! ```

#![allow(dead_code)] // Many methods are for public API extensibility

pub mod config;
pub mod merge;
pub mod storage;
