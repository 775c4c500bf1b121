//! Target/source groupings owned by an executor.

use std::fmt;

use crate::node::{NodeRef, display_nodes, same_node};

/// A group of targets produced together from a group of sources.
///
/// `targets[0]` is the representative target used in diagnostics.
#[derive(Clone, Default)]
pub struct Batch {
    /// Targets produced by the batch.
    pub targets: Vec<NodeRef>,
    /// Sources consumed by the batch.
    pub sources: Vec<NodeRef>,
}

impl Batch {
    /// Pair `targets` with `sources`.
    #[must_use]
    pub const fn new(targets: Vec<NodeRef>, sources: Vec<NodeRef>) -> Self {
        Self { targets, sources }
    }

    /// The representative target, if any.
    #[must_use]
    pub fn primary_target(&self) -> Option<&NodeRef> {
        self.targets.first()
    }

    /// Append sources not already present, keeping order.
    pub(crate) fn add_sources(&mut self, nodes: &[NodeRef]) {
        for node in nodes {
            if !self.sources.iter().any(|existing| same_node(existing, node)) {
                self.sources.push(NodeRef::clone(node));
            }
        }
    }

    pub(crate) fn contains_target(&self, node: &NodeRef) -> bool {
        self.targets.iter().any(|target| same_node(target, node))
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("targets", &display_nodes(&self.targets))
            .field("sources", &display_nodes(&self.sources))
            .finish()
    }
}
