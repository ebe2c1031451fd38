//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;

use git2::Oid;

use crate::storage::error::{StoreError, StoreResult};

/// Git commit identifier.
///
/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the storage module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse CommitId from a hex string
    pub fn from_hex(hex: &str) -> StoreResult<Self> {
        Ok(Self(parse_oid(hex)?))
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse BlobId from a hex string
    pub fn from_hex(hex: &str) -> StoreResult<Self> {
        Ok(Self(parse_oid(hex)?))
    }

    /// short form of the blob ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse TreeId from a hex string
    pub fn from_hex(hex: &str) -> StoreResult<Self> {
        Ok(Self(parse_oid(hex)?))
    }

    /// short form of the tree ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An untyped object id, used when the caller holds a hash without knowing
/// whether it names a blob or a tree (e.g. viewing an arbitrary past
/// revision). Resolution happens via `WikiRepository::get_from_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) Oid);

impl ObjectId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse ObjectId from a hex string
    pub fn from_hex(hex: &str) -> StoreResult<Self> {
        Ok(Self(parse_oid(hex)?))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BlobId> for ObjectId {
    fn from(id: BlobId) -> Self {
        Self(id.0)
    }
}

impl From<TreeId> for ObjectId {
    fn from(id: TreeId) -> Self {
        Self(id.0)
    }
}

fn parse_oid(hex: &str) -> StoreResult<Oid> {
    Oid::from_str(hex).map_err(|_| StoreError::InvalidObjectId(hex.to_string()))
}

/// File mode of a blob entry.
///
/// `Unknown` is used for blobs resolved purely by id: a bare git blob object
/// carries no mode, only a parent tree entry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileMode {
    #[default]
    Normal,
    Symlink,
    Unknown,
}

impl FileMode {
    /// decode a raw git filemode from a tree entry
    pub(crate) fn from_raw(raw: i32) -> Self {
        match raw {
            0o120000 => FileMode::Symlink,
            0o100644 | 0o100755 => FileMode::Normal,
            _ => FileMode::Unknown,
        }
    }

    /// raw git filemode used when writing a tree entry
    pub(crate) fn to_raw(self) -> i32 {
        match self {
            FileMode::Symlink => 0o120000,
            // Unknown falls back to a normal file when re-attached to a tree
            FileMode::Normal | FileMode::Unknown => 0o100644,
        }
    }
}

/// A validated wiki path.
///
/// Paths are slash-delimited and relative: no leading or trailing slash,
/// no empty segments, no `.`/`..` segments, no NUL bytes. The empty path
/// (meaning "the root tree") is deliberately not representable here;
/// operations that accept it take an `Option` or a raw `&str`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WikiPath(String);

impl WikiPath {
    /// create a new WikiPath, validating the input
    pub fn new(path: impl Into<String>) -> StoreResult<Self> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    fn validate(path: &str) -> StoreResult<()> {
        let invalid = |reason: &str| StoreError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if path.is_empty() {
            return Err(invalid("path is empty"));
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(invalid("leading or trailing slash"));
        }
        if path.contains('\0') {
            return Err(invalid("NUL byte"));
        }
        for segment in path.split('/') {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if segment == "." || segment == ".." {
                return Err(invalid("dot segment"));
            }
        }
        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }

    /// iterate over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for WikiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WikiPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// commit author identity
///
/// The web layer hands the core a bare user id; the e-mail is synthesized
/// from the configured domain.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// create a new author
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// build an author from a user id and a mail domain
    pub fn from_id(id: impl Into<String>, domain: &str) -> Self {
        let id = id.into();
        let email = format!("{}@{}", id, domain);
        Self { name: id, email }
    }

    /// fallback identity for unauthenticated edits
    pub fn anonymous() -> Self {
        Self::new("anonymous", "anonymous@localhost")
    }

    /// convert to git2::Signature, stamped with the current time
    pub(crate) fn to_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for Author {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// represents a change in a diff between two trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: String,
    pub status: ChangeStatus,
}

/// the type of change in a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    Other,
}
