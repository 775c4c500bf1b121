//! Node abstraction consumed by the execution engine.
//!
//! The on-disk graph is an external collaborator; the engine only needs a
//! handful of capabilities from each node: existence, text contents, a content
//! signature, its directory, and a mutable list of implicit dependencies.
//! [`Node`] captures that contract and [`FileNode`] provides the
//! filesystem-backed implementation, interned per path by [`FileSystem`].
//! Virtual targets live in [`alias`].

pub mod alias;
mod error;
mod file;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use itertools::Itertools;

use crate::hasher::Signature;

pub use alias::{AliasNode, AliasRegistry};
pub use error::NodeError;
pub use file::{FileNode, FileSystem};

/// Shared handle to any node in the graph.
pub type NodeRef = Arc<dyn Node>;

/// Capabilities the engine requires from a graph node.
pub trait Node: fmt::Debug + Send + Sync {
    /// Stable identity of the node (a path for files, a name for aliases).
    fn name(&self) -> &str;

    /// Whether the node currently exists on its backing store.
    fn exists(&self) -> bool;

    /// Read the node's contents as text.
    ///
    /// Bytes that are not UTF-8 (a Latin-1 document, say) are replaced with
    /// `U+FFFD` so ASCII markup around them still matches.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when the contents cannot be read.
    fn text_contents(&self) -> Result<String, NodeError>;

    /// Digest of the node's substantive content.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when the content cannot be read.
    fn content_signature(&self) -> Result<Signature, NodeError>;

    /// Directory used to resolve references relative to this node.
    fn directory(&self) -> Utf8PathBuf;

    /// Filesystem path when the node is file-backed.
    fn path(&self) -> Option<&Utf8Path> {
        None
    }

    /// Implicit dependencies discovered so far, in insertion order.
    fn implicit_deps(&self) -> Vec<NodeRef>;

    /// Append dependencies not already present in the implicit list.
    fn add_to_implicit(&self, deps: &[NodeRef]);

    /// Nodes produced as a by-product whenever this node is built.
    fn side_effects(&self) -> Vec<NodeRef> {
        Vec::new()
    }

    /// Drop any memoised signature so the next query re-reads the store.
    fn clear_memoized(&self) {}
}

/// Whether two handles refer to the same node identity.
#[must_use]
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    Arc::ptr_eq(a, b) || a.name() == b.name()
}

/// Order-preserving de-duplication by node identity.
#[must_use]
pub fn unique_nodes<'a, I>(nodes: I) -> Vec<NodeRef>
where
    I: IntoIterator<Item = &'a NodeRef>,
{
    let mut seen: IndexMap<&str, NodeRef> = IndexMap::new();
    for node in nodes {
        seen.entry(node.name()).or_insert_with(|| Arc::clone(node));
    }
    seen.into_values().collect()
}

/// Display helper joining node names with spaces.
#[must_use]
pub fn display_nodes(nodes: &[NodeRef]) -> String {
    nodes.iter().map(|node| node.name()).join(" ")
}

/// Ordered, de-duplicated list of node handles guarded for shared mutation.
#[derive(Debug, Default)]
pub(crate) struct NodeList {
    nodes: Mutex<Vec<NodeRef>>,
}

impl NodeList {
    pub(crate) fn snapshot(&self) -> Vec<NodeRef> {
        self.lock().clone()
    }

    pub(crate) fn extend_unique(&self, deps: &[NodeRef]) -> bool {
        let mut guard = self.lock();
        let mut added = false;
        for dep in deps {
            if !guard.iter().any(|existing| same_node(existing, dep)) {
                guard.push(Arc::clone(dep));
                added = true;
            }
        }
        added
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NodeRef>> {
        match self.nodes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
