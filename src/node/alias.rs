//! Virtual alias targets.
//!
//! An [`AliasNode`] has no content of its own: its signature is the digest of
//! its children's signatures concatenated in order, so it changes exactly when
//! that ordered tuple changes. Aliases are interned by name in an
//! [`AliasRegistry`] that callers own and pass around explicitly.

use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use tracing::debug;

use super::{Node, NodeError, NodeList, NodeRef, same_node};
use crate::executor::NullExecutor;
use crate::hasher::Signature;

/// A named, content-less target grouping other nodes.
#[derive(Debug)]
pub struct AliasNode {
    name: String,
    children: Mutex<Vec<NodeRef>>,
    signature: Mutex<Option<Signature>>,
    implicit: NodeList,
}

impl AliasNode {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Mutex::new(Vec::new()),
            signature: Mutex::new(None),
            implicit: NodeList::default(),
        }
    }

    /// Append children not already present, keeping insertion order.
    ///
    /// Any memoised signature is discarded when the child list changes.
    pub fn add_children(&self, nodes: &[NodeRef]) {
        let mut children = lock(&self.children);
        let before = children.len();
        for node in nodes {
            if !children.iter().any(|child| same_node(child, node)) {
                children.push(Arc::clone(node));
            }
        }
        if children.len() != before {
            *lock(&self.signature) = None;
        }
    }

    /// Current children in order.
    #[must_use]
    pub fn children(&self) -> Vec<NodeRef> {
        lock(&self.children).clone()
    }

    /// Whether the current signature differs from `previous`.
    ///
    /// A missing previous record counts as a change.
    ///
    /// # Errors
    ///
    /// Propagates failures signing any child.
    pub fn is_changed(&self, previous: Option<&Signature>) -> Result<bool, NodeError> {
        let current = self.content_signature()?;
        Ok(previous.is_none_or(|prev| *prev != current))
    }

    /// The no-op executor used to "build" this alias.
    ///
    /// Running it always succeeds; its only purpose is to make the scheduler
    /// visit the children.
    #[must_use]
    pub fn build_executor(self: &Arc<Self>) -> NullExecutor {
        let handle: NodeRef = Arc::clone(self) as NodeRef;
        NullExecutor::new(vec![handle])
    }
}

impl Node for AliasNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> bool {
        true
    }

    fn text_contents(&self) -> Result<String, NodeError> {
        let mut contents = String::new();
        for child in lock(&self.children).iter() {
            let sig = child
                .content_signature()
                .map_err(|source| NodeError::AliasChild {
                    alias: self.name.clone(),
                    child: child.name().to_owned(),
                    source: Box::new(source),
                })?;
            contents.push_str(sig.as_str());
        }
        Ok(contents)
    }

    fn content_signature(&self) -> Result<Signature, NodeError> {
        if let Some(sig) = lock(&self.signature).as_ref() {
            return Ok(sig.clone());
        }
        let sig = Signature::of_bytes(self.text_contents()?.as_bytes());
        debug!(alias = %self.name, signature = %sig, "computed alias signature");
        *lock(&self.signature) = Some(sig.clone());
        Ok(sig)
    }

    fn directory(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(".")
    }

    fn implicit_deps(&self) -> Vec<NodeRef> {
        self.implicit.snapshot()
    }

    fn add_to_implicit(&self, deps: &[NodeRef]) {
        self.implicit.extend_unique(deps);
    }

    fn clear_memoized(&self) {
        *lock(&self.signature) = None;
    }
}

/// Name-interning table for aliases within one namespace.
///
/// Repeated lookups of a name return the same node. The table only grows;
/// [`Self::reset`] is the single way to forget aliases.
#[derive(Debug, Default)]
pub struct AliasRegistry {
    aliases: IndexMap<String, Arc<AliasNode>>,
}

impl AliasRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the alias called `name`, creating it on first reference.
    pub fn lookup_or_create(&mut self, name: &str) -> Arc<AliasNode> {
        Arc::clone(
            self.aliases
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(AliasNode::new(name.to_owned()))),
        )
    }

    /// Return the alias called `name` if it has been referenced.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<AliasNode>> {
        self.aliases.get(name).map(Arc::clone)
    }

    /// Number of interned aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether no alias has been referenced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Forget every alias.
    pub fn reset(&mut self) {
        self.aliases.clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
