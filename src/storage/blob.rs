//! Blob operations for document storage.
//!
//! A wiki document is a raw git blob. The core never interprets the bytes:
//! markdown rendering, MIME guessing and the like live in the web layer.
//! Blobs are written once and never mutated; identical content always
//! deduplicates to the same id.

use git2::Repository;

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::BlobId;

/// write raw content as a blob object
///
/// returns the blob ID (the content hash computed by the object store)
pub fn write(repo: &Repository, content: &[u8]) -> StoreResult<BlobId> {
    let oid = repo.blob(content)?;
    Ok(BlobId::new(oid))
}

/// read a blob's content from the repository
pub fn read(repo: &Repository, id: BlobId) -> StoreResult<Vec<u8>> {
    let blob = repo
        .find_blob(id.raw())
        .map_err(|_| StoreError::ObjectNotFound(id.to_string()))?;
    Ok(blob.content().to_vec())
}

/// read a blob's content as UTF-8 text
pub fn read_text(repo: &Repository, id: BlobId) -> StoreResult<String> {
    let bytes = read(repo, id)?;
    let text = std::str::from_utf8(&bytes)?;
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, repo) = setup_repo();

        let id = write(&repo, b"# Hello\n").unwrap();
        let content = read(&repo, id).unwrap();
        assert_eq!(content, b"# Hello\n");
    }

    #[test]
    fn test_identical_content_shares_id() {
        let (_dir, repo) = setup_repo();

        let a = write(&repo, b"same bytes").unwrap();
        let b = write(&repo, b"same bytes").unwrap();
        let c = write(&repo, b"other bytes").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_read_text_rejects_invalid_utf8() {
        let (_dir, repo) = setup_repo();

        let id = write(&repo, &[0xff, 0xfe, 0x00]).unwrap();
        let result = read_text(&repo, id);
        assert!(matches!(result, Err(StoreError::InvalidUtf8(_))));
    }

    #[test]
    fn test_read_missing_blob() {
        let (_dir, repo) = setup_repo();

        let id = BlobId::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
        let result = read(&repo, id);
        assert!(matches!(result, Err(StoreError::ObjectNotFound(_))));
    }
}
