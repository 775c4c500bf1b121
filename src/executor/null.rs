//! The no-op executor and the null/real slot a node holds.

use std::mem;
use std::sync::Arc;

use crate::action::{Action, RunOptions};
use crate::env::Environment;
use crate::hasher::Signature;
use crate::node::NodeRef;
use crate::process::ProcessRunner;

use super::{Batch, Executor, ExecutorError, RunReport};

/// Executor for nodes that need no build step.
///
/// Every dependency and side-effect query returns an empty list and running
/// it always succeeds. It keeps its batches so it can later be upgraded to a
/// real [`Executor`] without losing them.
#[derive(Clone, Debug, Default)]
pub struct NullExecutor {
    pub(super) batches: Vec<Batch>,
    pub(super) env: Arc<Environment>,
}

impl NullExecutor {
    /// Null executor for `targets` with no sources.
    #[must_use]
    pub fn new(targets: Vec<NodeRef>) -> Self {
        Self {
            batches: vec![Batch::new(targets, Vec::new())],
            env: Arc::default(),
        }
    }

    /// Use `env` when this executor is upgraded.
    #[must_use]
    pub fn with_env(mut self, env: Arc<Environment>) -> Self {
        self.env = env;
        self
    }

    /// Batches accumulated so far.
    #[must_use]
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Append a target/source group.
    pub fn add_batch(&mut self, targets: Vec<NodeRef>, sources: Vec<NodeRef>) {
        self.batches.push(Batch::new(targets, sources));
    }

    /// Targets of every batch.
    #[must_use]
    pub fn all_targets(&self) -> Vec<NodeRef> {
        self.batches
            .iter()
            .flat_map(|batch| batch.targets.iter().cloned())
            .collect()
    }

    /// Always empty.
    #[must_use]
    pub fn all_sources(&self) -> Vec<NodeRef> {
        Vec::new()
    }

    /// Always empty.
    #[must_use]
    pub fn all_children(&self) -> Vec<NodeRef> {
        Vec::new()
    }

    /// Always empty.
    #[must_use]
    pub fn action_side_effects(&self) -> Vec<NodeRef> {
        Vec::new()
    }

    /// Signature of empty contents.
    #[must_use]
    pub fn content_signature(&self) -> Signature {
        Signature::of_bytes(b"")
    }

    /// Nothing to check.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches [`Executor::prepare`].
    pub const fn prepare(&self) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Succeed without doing anything.
    #[must_use]
    pub fn run(&self) -> RunReport {
        RunReport::default()
    }
}

/// The executor a node currently holds: a no-op or a real one.
///
/// Upgrading replaces the null variant with a real executor built from its
/// accumulated batches; the slot owner sees the swap, never a mutation of
/// the null value itself.
#[derive(Debug)]
pub enum ExecutorSlot {
    /// Node is up to date.
    Null(NullExecutor),
    /// Node needs building.
    Real(Box<Executor>),
}

impl Default for ExecutorSlot {
    fn default() -> Self {
        Self::Null(NullExecutor::default())
    }
}

impl From<Executor> for ExecutorSlot {
    fn from(executor: Executor) -> Self {
        Self::Real(Box::new(executor))
    }
}

impl From<NullExecutor> for ExecutorSlot {
    fn from(null: NullExecutor) -> Self {
        Self::Null(null)
    }
}

impl ExecutorSlot {
    /// Whether the slot holds the no-op variant.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// The real executor, when present.
    #[must_use]
    pub fn as_real(&self) -> Option<&Executor> {
        match self {
            Self::Real(executor) => Some(executor),
            Self::Null(_) => None,
        }
    }

    /// Mutable access to the real executor, when present.
    pub fn as_real_mut(&mut self) -> Option<&mut Executor> {
        match self {
            Self::Real(executor) => Some(executor),
            Self::Null(_) => None,
        }
    }

    /// Replace a null variant with a real executor running the no-op
    /// action, preserving its batches. Real executors are left alone.
    pub fn upgrade(&mut self) {
        if let Self::Null(null) = self {
            let real = Executor::from_null(mem::take(null));
            *self = Self::Real(Box::new(real));
        }
    }

    /// Add a pre-action, upgrading a null variant first.
    pub fn add_pre_action(&mut self, action: Action) {
        self.upgrade();
        if let Some(executor) = self.as_real_mut() {
            executor.add_pre_action(action);
        }
    }

    /// Add a post-action, upgrading a null variant first.
    pub fn add_post_action(&mut self, action: Action) {
        self.upgrade();
        if let Some(executor) = self.as_real_mut() {
            executor.add_post_action(action);
        }
    }

    /// Targets of every batch.
    #[must_use]
    pub fn all_targets(&self) -> Vec<NodeRef> {
        match self {
            Self::Null(null) => null.all_targets(),
            Self::Real(executor) => executor.all_targets(),
        }
    }

    /// Sources of every batch (empty for the null variant).
    #[must_use]
    pub fn all_sources(&self) -> Vec<NodeRef> {
        match self {
            Self::Null(null) => null.all_sources(),
            Self::Real(executor) => executor.all_sources(),
        }
    }

    /// Children the scheduler must consider.
    #[must_use]
    pub fn all_children(&self) -> Vec<NodeRef> {
        match self {
            Self::Null(null) => null.all_children(),
            Self::Real(executor) => executor.all_children(),
        }
    }

    /// Side effects of the targets.
    #[must_use]
    pub fn action_side_effects(&self) -> Vec<NodeRef> {
        match self {
            Self::Null(null) => null.action_side_effects(),
            Self::Real(executor) => executor.action_side_effects(),
        }
    }

    /// Check preconditions before running.
    ///
    /// # Errors
    ///
    /// See [`Executor::prepare`].
    pub fn prepare(&self) -> Result<(), ExecutorError> {
        match self {
            Self::Null(null) => null.prepare(),
            Self::Real(executor) => executor.prepare(),
        }
    }

    /// Signature of the action chain.
    ///
    /// # Errors
    ///
    /// See [`Executor::content_signature`].
    pub fn content_signature(&self) -> Result<Signature, ExecutorError> {
        match self {
            Self::Null(null) => Ok(null.content_signature()),
            Self::Real(executor) => executor.content_signature(),
        }
    }

    /// Run the action chain.
    ///
    /// # Errors
    ///
    /// See [`Executor::run`].
    pub fn run(
        &self,
        runner: &dyn ProcessRunner,
        options: RunOptions,
    ) -> Result<RunReport, ExecutorError> {
        match self {
            Self::Null(null) => Ok(null.run()),
            Self::Real(executor) => executor.run(runner, options),
        }
    }

    /// Drop memoised results.
    pub fn cleanup(&mut self) {
        if let Self::Real(executor) = self {
            executor.cleanup();
        }
    }
}
