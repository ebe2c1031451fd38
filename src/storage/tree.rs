//! The in-memory tree model.
//!
//! A `WorkingTree` is a mutable, path-indexed projection of one git tree
//! object and all of its descendants. It is loaded fresh from HEAD for each
//! request session, mutated through `add`/`remove`, and either becomes the
//! tree of a new commit or is discarded.
//!
//! Every node id is always the real content hash: mutations write the new
//! blob and tree objects through the object store immediately, and every
//! tree on the path from the mutated node up to the root recomputes its id
//! as part of the same call. There is never a dirty node with a stale id.
//!
//! The children-map-of-nodes structure is a tree of immutable,
//! content-addressed values. Children are owned values, never
//! back-references, so there are no aliasing hazards by construction.

use std::collections::BTreeMap;

use git2::{ObjectType, Repository};
use tracing::debug;

use crate::storage::blob;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::{BlobId, FileMode, TreeId};

/// a blob entry as seen from its parent tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub id: BlobId,
    pub mode: FileMode,
}

/// a child of a tree: either a document or a nested directory
#[derive(Debug, Clone)]
pub enum Node {
    Blob(BlobRef),
    Tree(TreeNode),
}

impl Node {
    /// true if this node is a directory
    pub fn is_tree(&self) -> bool {
        matches!(self, Node::Tree(_))
    }
}

/// result of a path lookup
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    Blob(&'a BlobRef),
    Tree(&'a TreeNode),
}

impl<'a> Entry<'a> {
    /// true if the entry is a directory
    pub fn is_tree(&self) -> bool {
        matches!(self, Entry::Tree(_))
    }

    /// the blob ref, if this entry is a document
    pub fn as_blob(&self) -> Option<&'a BlobRef> {
        match self {
            Entry::Blob(b) => Some(b),
            Entry::Tree(_) => None,
        }
    }

    /// the tree node, if this entry is a directory
    pub fn as_tree(&self) -> Option<&'a TreeNode> {
        match self {
            Entry::Tree(t) => Some(t),
            Entry::Blob(_) => None,
        }
    }
}

/// one directory node of the working tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    id: TreeId,
    children: BTreeMap<String, Node>,
}

impl TreeNode {
    /// the content hash of this node's serialized children map
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// the entries of this directory, ordered by name
    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// true if this directory has no entries
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn get(&self, path: &str) -> StoreResult<Entry<'_>> {
        if path.is_empty() {
            return Ok(Entry::Tree(self));
        }
        let (first, rest) = split_first(path);
        match self.children.get(first) {
            None => Err(StoreError::PathNotFound(path.to_string())),
            Some(Node::Blob(b)) => {
                if rest.is_empty() {
                    Ok(Entry::Blob(b))
                } else {
                    Err(StoreError::InvalidPath {
                        path: path.to_string(),
                        reason: "path descends into a file".to_string(),
                    })
                }
            }
            Some(Node::Tree(t)) => t.get(rest),
        }
    }

    fn exists(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        match path.split_once('/') {
            Some((first, rest)) => match self.children.get(first) {
                Some(Node::Tree(t)) => t.exists(rest),
                _ => false,
            },
            None => self.children.contains_key(path),
        }
    }

    fn can_create_blob(&self, path: &str) -> bool {
        match path.split_once('/') {
            Some((first, rest)) => match self.children.get(first) {
                // missing intermediates will be synthesized
                None => true,
                Some(Node::Tree(t)) => t.can_create_blob(rest),
                Some(Node::Blob(_)) => false,
            },
            None => !self.children.contains_key(path),
        }
    }

    fn add(&mut self, repo: &Repository, path: &str, content: &[u8]) -> StoreResult<BlobId> {
        let written = match path.split_once('/') {
            None => {
                if matches!(self.children.get(path), Some(Node::Tree(_))) {
                    return Err(StoreError::CannotCreate {
                        path: path.to_string(),
                    });
                }
                let id = blob::write(repo, content)?;
                self.children.insert(
                    path.to_string(),
                    Node::Blob(BlobRef {
                        id,
                        mode: FileMode::Normal,
                    }),
                );
                id
            }
            Some((first, rest)) => match self.children.get_mut(first) {
                Some(Node::Tree(t)) => t.add(repo, rest, content)?,
                Some(Node::Blob(_)) => {
                    return Err(StoreError::CannotCreate {
                        path: path.to_string(),
                    })
                }
                None => {
                    // the whole suffix is missing: build the chain of
                    // single-child trees bottom-up, then attach it at the
                    // first missing segment in one step
                    let id = blob::write(repo, content)?;
                    let mut node = Node::Blob(BlobRef {
                        id,
                        mode: FileMode::Normal,
                    });
                    for name in rest.split('/').rev() {
                        let mut children = BTreeMap::new();
                        children.insert(name.to_string(), node);
                        let tree_id = write_children(repo, &children)?;
                        node = Node::Tree(TreeNode {
                            id: tree_id,
                            children,
                        });
                    }
                    self.children.insert(first.to_string(), node);
                    id
                }
            },
        };
        // hash propagation: every tree up the mutated path recomputes
        self.id = write_children(repo, &self.children)?;
        Ok(written)
    }

    fn remove(&mut self, repo: &Repository, path: &str) -> StoreResult<()> {
        match path.split_once('/') {
            None => {
                self.children
                    .remove(path)
                    .ok_or_else(|| StoreError::PathNotFound(path.to_string()))?;
            }
            Some((first, rest)) => match self.children.get_mut(first) {
                None => return Err(StoreError::PathNotFound(path.to_string())),
                Some(Node::Blob(_)) => {
                    return Err(StoreError::InvalidPath {
                        path: path.to_string(),
                        reason: "path descends into a file".to_string(),
                    })
                }
                Some(Node::Tree(t)) => {
                    t.remove(repo, rest)?;
                    // empty trees are pruned, not persisted as empty nodes
                    if t.is_empty() {
                        self.children.remove(first);
                    }
                }
            },
        }
        self.id = write_children(repo, &self.children)?;
        Ok(())
    }

    fn collect_blobs(&self, prefix: &str, out: &mut Vec<(String, BlobRef)>) {
        for (name, node) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            match node {
                Node::Blob(b) => out.push((path, b.clone())),
                Node::Tree(t) => t.collect_blobs(&path, out),
            }
        }
    }
}

/// The root tree model a request session mutates before commit.
///
/// Paths are slash-delimited and relative; the empty path addresses the
/// root tree itself. Callers validate user input through
/// [`WikiPath`](crate::storage::WikiPath) before it reaches this layer.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: TreeNode,
}

impl WorkingTree {
    /// load a tree object and all of its descendants into memory
    pub fn load(repo: &Repository, id: TreeId) -> StoreResult<Self> {
        Ok(Self {
            root: load_node(repo, id)?,
        })
    }

    /// create an empty working tree (used for the initial commit)
    pub fn empty(repo: &Repository) -> StoreResult<Self> {
        let children = BTreeMap::new();
        let id = write_children(repo, &children)?;
        Ok(Self {
            root: TreeNode { id, children },
        })
    }

    /// the current root tree id
    pub fn id(&self) -> TreeId {
        self.root.id()
    }

    /// the root directory node
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// resolve a path to an entry; the empty path resolves to the root tree
    pub fn get(&self, path: &str) -> StoreResult<Entry<'_>> {
        self.root.get(path)
    }

    /// true if the path resolves; the empty path always does
    pub fn exists(&self, path: &str) -> bool {
        self.root.exists(path)
    }

    /// true if a fresh blob can be created at `path` without destroying
    /// data: the leaf must not exist yet and no existing non-terminal
    /// segment may be a blob
    pub fn can_create_blob(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        self.root.can_create_blob(path)
    }

    /// write `content` as a new blob at `path`, synthesizing missing
    /// intermediate trees; returns the id of the written blob
    pub fn add(&mut self, repo: &Repository, path: &str, content: &[u8]) -> StoreResult<BlobId> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "cannot write a blob at the root".to_string(),
            });
        }
        let id = self.root.add(repo, path, content)?;
        debug!(path, blob = %id, root = %self.root.id(), "tree add");
        Ok(id)
    }

    /// delete the entry at `path`, pruning intermediate trees that become
    /// empty; the root itself is never pruned, an emptied root simply
    /// recomputes to the empty-tree id
    pub fn remove(&mut self, repo: &Repository, path: &str) -> StoreResult<()> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "cannot remove the root".to_string(),
            });
        }
        self.root.remove(repo, path)?;
        debug!(path, root = %self.root.id(), "tree remove");
        Ok(())
    }

    /// every blob reachable from the root, as (path, blob) pairs ordered
    /// by path
    pub fn blobs(&self) -> Vec<(String, BlobRef)> {
        let mut out = Vec::new();
        self.root.collect_blobs("", &mut out);
        out
    }
}

fn split_first(path: &str) -> (&str, &str) {
    match path.split_once('/') {
        Some((first, rest)) => (first, rest),
        None => (path, ""),
    }
}

fn load_node(repo: &Repository, id: TreeId) -> StoreResult<TreeNode> {
    let tree = repo
        .find_tree(id.raw())
        .map_err(|_| StoreError::ObjectNotFound(id.to_string()))?;

    let mut children = BTreeMap::new();
    for entry in tree.iter() {
        let name = entry
            .name()
            .ok_or_else(|| StoreError::Internal("non-utf8 tree entry name".to_string()))?
            .to_string();
        match entry.kind() {
            Some(ObjectType::Blob) => {
                children.insert(
                    name,
                    Node::Blob(BlobRef {
                        id: BlobId::new(entry.id()),
                        mode: FileMode::from_raw(entry.filemode()),
                    }),
                );
            }
            Some(ObjectType::Tree) => {
                children.insert(name, Node::Tree(load_node(repo, TreeId::new(entry.id()))?));
            }
            kind => {
                return Err(StoreError::UnexpectedObjectType {
                    path: name,
                    expected: "blob or tree".to_string(),
                    found: format!("{:?}", kind),
                })
            }
        }
    }

    Ok(TreeNode { id, children })
}

/// serialize a children map as a tree object and return its content hash
fn write_children(repo: &Repository, children: &BTreeMap<String, Node>) -> StoreResult<TreeId> {
    let mut builder = repo.treebuilder(None)?;
    for (name, node) in children {
        match node {
            Node::Blob(b) => builder.insert(name, b.id.raw(), b.mode.to_raw())?,
            Node::Tree(t) => builder.insert(name, t.id.raw(), git2::FileMode::Tree.into())?,
        };
    }
    Ok(TreeId::new(builder.write()?))
}
