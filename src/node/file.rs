//! Filesystem-backed nodes and the per-build interning table.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::{Node, NodeError, NodeList, NodeRef};
use crate::hasher::{self, Signature};

/// A file in the build graph.
///
/// The content signature is memoised until [`Node::clear_memoized`] is
/// called; implicit dependencies and side effects accumulate without
/// duplicates.
#[derive(Debug)]
pub struct FileNode {
    path: Utf8PathBuf,
    signature: Mutex<Option<Signature>>,
    implicit: NodeList,
    side_effects: NodeList,
}

impl FileNode {
    fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            signature: Mutex::new(None),
            implicit: NodeList::default(),
            side_effects: NodeList::default(),
        }
    }

    /// Record `nodes` as by-products of building this file.
    pub fn add_side_effects(&self, nodes: &[NodeRef]) {
        self.side_effects.extend_unique(nodes);
    }

    /// File name without its final extension.
    #[must_use]
    pub fn file_stem(&self) -> &str {
        self.path.file_stem().unwrap_or_default()
    }

    fn lock_signature(&self) -> MutexGuard<'_, Option<Signature>> {
        match self.signature.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Node for FileNode {
    fn name(&self) -> &str {
        self.path.as_str()
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn text_contents(&self) -> Result<String, NodeError> {
        let bytes = fs::read(self.path.as_std_path()).map_err(|source| NodeError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn content_signature(&self) -> Result<Signature, NodeError> {
        let mut guard = self.lock_signature();
        if let Some(sig) = guard.as_ref() {
            return Ok(sig.clone());
        }
        let sig = hasher::file_signature(&self.path)
            .and_then(|found| {
                found.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not found"))
            })
            .map_err(|source| NodeError::Read {
                path: self.path.clone(),
                source,
            })?;
        *guard = Some(sig.clone());
        Ok(sig)
    }

    fn directory(&self) -> Utf8PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        }
    }

    fn path(&self) -> Option<&Utf8Path> {
        Some(&self.path)
    }

    fn implicit_deps(&self) -> Vec<NodeRef> {
        self.implicit.snapshot()
    }

    fn add_to_implicit(&self, deps: &[NodeRef]) {
        if self.implicit.extend_unique(deps) {
            debug!(node = %self.path, "implicit dependencies updated");
        }
    }

    fn side_effects(&self) -> Vec<NodeRef> {
        self.side_effects.snapshot()
    }

    fn clear_memoized(&self) {
        *self.lock_signature() = None;
    }
}

/// Interning table mapping normalised paths to [`FileNode`] handles.
///
/// Relative paths are resolved against the table's root directory so two
/// spellings of the same file (`a/./b.tex`, `a/b.tex`) share one node.
#[derive(Debug)]
pub struct FileSystem {
    root: Utf8PathBuf,
    nodes: Mutex<HashMap<Utf8PathBuf, Arc<FileNode>>>,
}

impl FileSystem {
    /// Create a table rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Directory that relative lookups are resolved against.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Return the interned node for `path`, creating it on first use.
    pub fn file(&self, path: impl AsRef<Utf8Path>) -> Arc<FileNode> {
        let key = self.normalise(path.as_ref());
        let mut guard = self.lock_nodes();
        Arc::clone(
            guard
                .entry(key.clone())
                .or_insert_with(|| Arc::new(FileNode::new(key))),
        )
    }

    /// Like [`Self::file`] but erased to a [`NodeRef`].
    pub fn node(&self, path: impl AsRef<Utf8Path>) -> NodeRef {
        self.file(path)
    }

    /// Probe `dir/name` on disk, returning the interned node when it exists.
    pub fn find_in(&self, dir: &Utf8Path, name: &str) -> Option<Arc<FileNode>> {
        let candidate = self.normalise(&dir.join(name));
        if candidate.is_file() {
            Some(self.file(candidate))
        } else {
            None
        }
    }

    /// Number of interned nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_nodes().len()
    }

    /// Whether no node has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `path` against the root and fold `.`/`..` components lexically.
    #[must_use]
    pub fn normalise(&self, path: &Utf8Path) -> Utf8PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let mut out = Utf8PathBuf::new();
        for component in joined.components() {
            match component {
                Utf8Component::CurDir => {}
                Utf8Component::ParentDir => {
                    if !out.pop() {
                        out.push("..");
                    }
                }
                other => out.push(other.as_str()),
            }
        }
        out
    }

    fn lock_nodes(&self) -> MutexGuard<'_, HashMap<Utf8PathBuf, Arc<FileNode>>> {
        match self.nodes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
