//! Executors: the per-target build step.
//!
//! An [`Executor`] owns the batches of targets and sources it builds, the
//! ordered pre/main/post action chain, the base environment plus override
//! dictionaries, and memoised results (the effective build environment and
//! the action-chain signature). Memoised values live in explicit lazy cells
//! that [`Executor::cleanup`] resets together.
//!
//! Nodes that need no build step hold a [`NullExecutor`] inside an
//! [`ExecutorSlot`]; builders that share one executor across several target
//! groups look it up in a [`BatchExecutorRegistry`].

mod batch;
mod error;
mod null;
mod registry;

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use tracing::debug;

use crate::action::{Action, ActionContext, ActionError, ActionOutcome, RunOptions};
use crate::env::{Environment, OverrideDict};
use crate::hasher::Signature;
use crate::node::{FileSystem, NodeRef, same_node, unique_nodes};
use crate::process::ProcessRunner;
use crate::scanner::{Scanner, ScannerSelector};

pub use batch::Batch;
pub use error::{ExecutorError, RegistryError};
pub use null::{ExecutorSlot, NullExecutor};
pub use registry::{BatchExecutorRegistry, SharedExecutor, lock_slot};

/// Outcomes of every action that ran, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One outcome per executed action.
    pub outcomes: Vec<ActionOutcome>,
}

impl RunReport {
    /// Standard output of all actions, concatenated.
    #[must_use]
    pub fn stdout(&self) -> String {
        self.outcomes.iter().map(|o| o.stdout.as_str()).collect()
    }
}

/// How [`Executor::scan`] picks a scanner for each node.
#[derive(Clone, Copy, Debug)]
pub enum ScanWith<'a> {
    /// Use this scanner for every node.
    Explicit(&'a dyn Scanner),
    /// Ask the selector per node; unselected nodes are skipped.
    Default(&'a dyn ScannerSelector),
}

#[derive(Debug, Default)]
struct Memo {
    build_env: OnceCell<Arc<Environment>>,
    contents: OnceCell<String>,
    signature: OnceCell<Signature>,
    unignored: RefCell<HashMap<String, Vec<NodeRef>>>,
}

/// A real build step.
#[derive(Debug)]
pub struct Executor {
    batches: Vec<Batch>,
    pre_actions: Vec<Action>,
    action_list: Vec<Action>,
    post_actions: Vec<Action>,
    env: Arc<Environment>,
    overrides: Vec<OverrideDict>,
    memo: Memo,
}

impl Executor {
    /// Executor running `actions` against `env`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::NoAction`] when `actions` is empty.
    pub fn new(actions: Vec<Action>, env: Arc<Environment>) -> Result<Self, ExecutorError> {
        if actions.is_empty() {
            return Err(ExecutorError::NoAction);
        }
        Ok(Self {
            batches: Vec::new(),
            pre_actions: Vec::new(),
            action_list: actions,
            post_actions: Vec::new(),
            env,
            overrides: Vec::new(),
            memo: Memo::default(),
        })
    }

    pub(crate) fn from_null(null: NullExecutor) -> Self {
        Self {
            batches: null.batches,
            pre_actions: Vec::new(),
            action_list: vec![Action::noop()],
            post_actions: Vec::new(),
            env: null.env,
            overrides: Vec::new(),
            memo: Memo::default(),
        }
    }

    /// Attach a target/source group.
    #[must_use]
    pub fn with_batch(mut self, targets: Vec<NodeRef>, sources: Vec<NodeRef>) -> Self {
        self.add_batch(targets, sources);
        self
    }

    /// Layer override dictionaries over the base environment, later ones
    /// winning.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<OverrideDict>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Batches in insertion order.
    #[must_use]
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Pre-actions, main actions and post-actions in execution order.
    #[must_use]
    pub fn action_list(&self) -> Vec<&Action> {
        self.pre_actions
            .iter()
            .chain(&self.action_list)
            .chain(&self.post_actions)
            .collect()
    }

    /// Replace the main actions.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::NoAction`] when `actions` is empty.
    pub fn set_action_list(&mut self, actions: Vec<Action>) -> Result<(), ExecutorError> {
        if actions.is_empty() {
            return Err(ExecutorError::NoAction);
        }
        self.action_list = actions;
        Ok(())
    }

    /// Queue an action before the main chain.
    pub fn add_pre_action(&mut self, action: Action) {
        self.pre_actions.push(action);
    }

    /// Queue an action after the main chain.
    pub fn add_post_action(&mut self, action: Action) {
        self.post_actions.push(action);
    }

    /// Append sources to the single batch, skipping ones already present.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::MultipleBatches`] unless the executor holds
    /// exactly one batch.
    pub fn add_sources(&mut self, nodes: &[NodeRef]) -> Result<(), ExecutorError> {
        let count = self.batches.len();
        let [batch] = self.batches.as_mut_slice() else {
            return Err(ExecutorError::MultipleBatches { count });
        };
        batch.add_sources(nodes);
        Ok(())
    }

    /// Append an independent target/source group.
    pub fn add_batch(&mut self, targets: Vec<NodeRef>, sources: Vec<NodeRef>) {
        self.batches.push(Batch::new(targets, sources));
    }

    /// Targets of every batch, duplicates preserved.
    #[must_use]
    pub fn all_targets(&self) -> Vec<NodeRef> {
        self.batches
            .iter()
            .flat_map(|batch| batch.targets.iter().cloned())
            .collect()
    }

    /// Sources of every batch, duplicates preserved.
    #[must_use]
    pub fn all_sources(&self) -> Vec<NodeRef> {
        self.batches
            .iter()
            .flat_map(|batch| batch.sources.iter().cloned())
            .collect()
    }

    /// Representative target of the first batch.
    #[must_use]
    pub fn primary_target(&self) -> Option<&NodeRef> {
        self.batches.first().and_then(Batch::primary_target)
    }

    fn target_name(&self) -> String {
        self.primary_target()
            .map(|node| node.name().to_owned())
            .unwrap_or_default()
    }

    /// Check that every source exists before anything runs.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::MissingSource`] naming the first missing
    /// source and its batch's representative target.
    pub fn prepare(&self) -> Result<(), ExecutorError> {
        for batch in &self.batches {
            for source in &batch.sources {
                if !source.exists() {
                    return Err(ExecutorError::MissingSource {
                        source_node: source.name().to_owned(),
                        target: batch
                            .primary_target()
                            .map(|node| node.name().to_owned())
                            .unwrap_or_default(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Base environment with every override dictionary applied, memoised.
    #[must_use]
    pub fn build_env(&self) -> Arc<Environment> {
        Arc::clone(self.memo.build_env.get_or_init(|| {
            if self.overrides.is_empty() {
                Arc::clone(&self.env)
            } else {
                Arc::new(self.env.override_with(&self.overrides))
            }
        }))
    }

    /// Concatenated contents of the whole action chain, memoised.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Action`] when an action cannot render its
    /// contents.
    pub fn contents(&self) -> Result<String, ExecutorError> {
        if let Some(contents) = self.memo.contents.get() {
            return Ok(contents.clone());
        }
        let env = self.build_env();
        let targets = self.all_targets();
        let sources = self.all_sources();
        let mut contents = String::new();
        for action in self.action_list() {
            let part = action
                .contents(&targets, &sources, &env)
                .map_err(|source| ExecutorError::Action {
                    action: action.describe(&targets, &sources, &env),
                    target: self.target_name(),
                    source,
                })?;
            contents.push_str(&part);
        }
        Ok(self.memo.contents.get_or_init(|| contents).clone())
    }

    /// Signature of [`Self::contents`], memoised.
    ///
    /// # Errors
    ///
    /// See [`Self::contents`].
    pub fn content_signature(&self) -> Result<Signature, ExecutorError> {
        if let Some(sig) = self.memo.signature.get() {
            return Ok(sig.clone());
        }
        let sig = Signature::of_bytes(self.contents()?.as_bytes());
        debug!(target = %self.target_name(), signature = %sig, "computed executor signature");
        Ok(self.memo.signature.get_or_init(|| sig).clone())
    }

    /// Run pre-actions, main actions and post-actions in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing action and returns
    /// [`ExecutorError::ActionFailed`] for a non-zero exit,
    /// [`ExecutorError::Build`] for a structured build error, or
    /// [`ExecutorError::Action`] when the action could not run at all.
    pub fn run(
        &self,
        runner: &dyn ProcessRunner,
        options: RunOptions,
    ) -> Result<RunReport, ExecutorError> {
        let env = self.build_env();
        let targets = self.all_targets();
        let sources = self.all_sources();
        let ctx = ActionContext {
            targets: &targets,
            sources: &sources,
            env: &env,
            runner,
            options,
        };
        let mut report = RunReport::default();
        for action in self.action_list() {
            let outcome = action.execute(&ctx).map_err(|err| match err {
                ActionError::Build(source) => ExecutorError::Build {
                    target: self.target_name(),
                    executor: self.display(),
                    source,
                },
                other => ExecutorError::Action {
                    action: action.describe(&targets, &sources, &env),
                    target: self.target_name(),
                    source: other,
                },
            })?;
            if !outcome.success() {
                return Err(ExecutorError::ActionFailed {
                    action: action.describe(&targets, &sources, &env),
                    target: self.target_name(),
                    status: outcome.status,
                    stderr: outcome.stderr,
                });
            }
            report.outcomes.push(outcome);
        }
        Ok(report)
    }

    /// Scan `nodes` for implicit dependencies and attach the union to every
    /// target of this executor.
    ///
    /// Returns the de-duplicated dependencies found.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Scan`] when a scanner fails.
    pub fn scan(
        &self,
        with: ScanWith<'_>,
        nodes: &[NodeRef],
        fs: &FileSystem,
    ) -> Result<Vec<NodeRef>, ExecutorError> {
        let env = self.build_env();
        let mut deps: Vec<NodeRef> = Vec::new();
        for node in nodes {
            let scanner = match with {
                ScanWith::Explicit(scanner) => Some(scanner),
                ScanWith::Default(selector) => selector.scanner_for(node, &env),
            };
            let Some(scanner) = scanner else {
                continue;
            };
            let outcome = scanner
                .scan(node, &env, fs)
                .map_err(|source| ExecutorError::Scan {
                    node: node.name().to_owned(),
                    source,
                })?;
            deps.extend(outcome.deps);
        }
        let deps = unique_nodes(&deps);
        for target in self.all_targets() {
            target.add_to_implicit(&deps);
        }
        Ok(deps)
    }

    /// Scan every source.
    ///
    /// # Errors
    ///
    /// See [`Self::scan`].
    pub fn scan_sources(
        &self,
        with: ScanWith<'_>,
        fs: &FileSystem,
    ) -> Result<Vec<NodeRef>, ExecutorError> {
        self.scan(with, &self.all_sources(), fs)
    }

    /// Scan every target.
    ///
    /// # Errors
    ///
    /// See [`Self::scan`].
    pub fn scan_targets(
        &self,
        with: ScanWith<'_>,
        fs: &FileSystem,
    ) -> Result<Vec<NodeRef>, ExecutorError> {
        self.scan(with, &self.all_targets(), fs)
    }

    /// Forget every memoised result at once.
    pub fn cleanup(&mut self) {
        self.memo = Memo::default();
    }

    /// Unique sources plus every target's implicit dependencies.
    #[must_use]
    pub fn all_children(&self) -> Vec<NodeRef> {
        let mut children = self.all_sources();
        for target in self.all_targets() {
            children.extend(target.implicit_deps());
        }
        unique_nodes(&children)
    }

    /// Unique side effects of every target.
    #[must_use]
    pub fn action_side_effects(&self) -> Vec<NodeRef> {
        let effects: Vec<NodeRef> = self
            .all_targets()
            .iter()
            .flat_map(|target| target.side_effects())
            .collect();
        unique_nodes(&effects)
    }

    /// Sources of the batch building `node` (or of every batch when `node`
    /// is `None`) minus `ignore`, memoised per argument pair.
    #[must_use]
    pub fn unignored_sources(&self, node: Option<&NodeRef>, ignore: &[NodeRef]) -> Vec<NodeRef> {
        let key = memo_key(node, ignore);
        if let Some(cached) = self.memo.unignored.borrow().get(&key) {
            return cached.clone();
        }
        let sources = match node {
            Some(target) => self
                .batches
                .iter()
                .filter(|batch| batch.contains_target(target))
                .flat_map(|batch| batch.sources.iter().cloned())
                .collect(),
            None => self.all_sources(),
        };
        let kept: Vec<NodeRef> = sources
            .into_iter()
            .filter(|source| !ignore.iter().any(|skip| same_node(skip, source)))
            .collect();
        self.memo.unignored.borrow_mut().insert(key, kept.clone());
        kept
    }

    /// The rendered action chain, one action per line.
    #[must_use]
    pub fn display(&self) -> String {
        let env = self.build_env();
        let targets = self.all_targets();
        let sources = self.all_sources();
        self.action_list()
            .iter()
            .map(|action| action.describe(&targets, &sources, &env))
            .join("\n")
    }
}

fn memo_key(node: Option<&NodeRef>, ignore: &[NodeRef]) -> String {
    let mut key = node.map(|n| n.name().to_owned()).unwrap_or_default();
    for skip in ignore {
        key.push('\0');
        key.push_str(skip.name());
    }
    key
}

#[cfg(test)]
mod tests;
