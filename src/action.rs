//! The closed set of build actions.
//!
//! An [`Action`] is a shell command template, a named callback, or an ordered
//! composite of further actions. Every action can report its *contents* (the
//! text folded into an executor's signature) and can be executed against a
//! batch of targets and sources.

use std::fmt;
use std::io;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, info};

use crate::env::Environment;
use crate::node::{NodeRef, display_nodes};
use crate::process::ProcessRunner;
use crate::subst::{SubstContext, SubstError, substitute};

/// Callback body run by [`Action::Callback`].
pub type CallbackFn = dyn Fn(&ActionContext<'_>) -> Result<ActionOutcome, BuildError> + Send + Sync;

/// Contents function supplied for callbacks whose signature should depend on
/// more than their name.
pub type ContentsFn = dyn Fn(&[NodeRef], &[NodeRef], &Environment) -> String + Send + Sync;

/// A structured build failure raised by an action itself.
///
/// Executors propagate these with their own context attached rather than
/// flattening them into an exit status.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("{message}")]
#[diagnostic(code(settle::action::build))]
pub struct BuildError {
    /// Human-readable description.
    pub message: String,
    /// Node the failure concerns, when known.
    pub node: Option<String>,
}

impl BuildError {
    /// Failure with a message and no specific node.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            node: None,
        }
    }

    /// Attach the node the failure concerns.
    #[must_use]
    pub fn for_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

/// Failures that prevent an action from producing an outcome.
#[derive(Debug, Error, Diagnostic)]
pub enum ActionError {
    /// The command template could not be expanded.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Subst(#[from] SubstError),

    /// The shell could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    #[diagnostic(code(settle::action::spawn))]
    Spawn {
        /// Expanded command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The action reported a structured build error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] BuildError),
}

/// Options forwarded to every action in a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Log each command line at info level before running it.
    pub show: bool,
    /// Actually run commands; when false they are only shown.
    pub execute: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            show: true,
            execute: true,
        }
    }
}

/// Everything an action needs to execute.
#[derive(Clone, Copy)]
pub struct ActionContext<'a> {
    /// Targets of the batch.
    pub targets: &'a [NodeRef],
    /// Sources of the batch.
    pub sources: &'a [NodeRef],
    /// Effective environment.
    pub env: &'a Environment,
    /// Process-invocation primitive.
    pub runner: &'a dyn ProcessRunner,
    /// Run options.
    pub options: RunOptions,
}

impl fmt::Debug for ActionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("targets", &display_nodes(self.targets))
            .field("sources", &display_nodes(self.sources))
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Result of executing one action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Exit status; `None` means the process was killed.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ActionOutcome {
    /// A successful outcome with no output.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: Some(0),
            ..Self::default()
        }
    }

    /// Whether the action succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }
}

/// Shell command template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandAction {
    template: String,
}

impl CommandAction {
    /// Unexpanded template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }
}

/// Named in-process callback.
#[derive(Clone)]
pub struct CallbackAction {
    name: String,
    func: Arc<CallbackFn>,
    contents: Option<Arc<ContentsFn>>,
}

impl CallbackAction {
    /// Callback name, used for display and as default contents.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAction")
            .field("name", &self.name)
            .field("has_contents", &self.contents.is_some())
            .finish_non_exhaustive()
    }
}

/// A build action.
#[derive(Clone, Debug)]
pub enum Action {
    /// Run an expanded shell command.
    Command(CommandAction),
    /// Call an in-process function.
    Callback(CallbackAction),
    /// Run a sequence of actions, stopping at the first failure. An empty
    /// composite is a no-op that always succeeds.
    Composite(Vec<Action>),
}

impl Action {
    /// Shell command action from a template.
    #[must_use]
    pub fn command(template: impl Into<String>) -> Self {
        Self::Command(CommandAction {
            template: template.into(),
        })
    }

    /// Callback action.
    pub fn callback<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ActionContext<'_>) -> Result<ActionOutcome, BuildError> + Send + Sync + 'static,
    {
        Self::Callback(CallbackAction {
            name: name.into(),
            func: Arc::new(func),
            contents: None,
        })
    }

    /// Callback action with an explicit contents function.
    pub fn callback_with_contents<F, C>(name: impl Into<String>, func: F, contents: C) -> Self
    where
        F: Fn(&ActionContext<'_>) -> Result<ActionOutcome, BuildError> + Send + Sync + 'static,
        C: Fn(&[NodeRef], &[NodeRef], &Environment) -> String + Send + Sync + 'static,
    {
        Self::Callback(CallbackAction {
            name: name.into(),
            func: Arc::new(func),
            contents: Some(Arc::new(contents)),
        })
    }

    /// The no-op action.
    #[must_use]
    pub const fn noop() -> Self {
        Self::Composite(Vec::new())
    }

    /// Text folded into signatures for this action.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Subst`] when a command template cannot be
    /// expanded.
    pub fn contents(
        &self,
        targets: &[NodeRef],
        sources: &[NodeRef],
        env: &Environment,
    ) -> Result<String, ActionError> {
        match self {
            Self::Command(cmd) => {
                Ok(substitute(&cmd.template, SubstContext::new(env, targets, sources))?)
            }
            Self::Callback(cb) => Ok(cb
                .contents
                .as_ref()
                .map_or_else(|| cb.name.clone(), |f| f(targets, sources, env))),
            Self::Composite(actions) => {
                let mut parts = Vec::with_capacity(actions.len());
                for action in actions {
                    parts.push(action.contents(targets, sources, env)?);
                }
                Ok(parts.join("\n"))
            }
        }
    }

    /// Human-readable rendering for logs and diagnostics.
    ///
    /// Commands that fail to expand fall back to their raw template.
    #[must_use]
    pub fn describe(&self, targets: &[NodeRef], sources: &[NodeRef], env: &Environment) -> String {
        match self {
            Self::Command(cmd) => substitute(&cmd.template, SubstContext::new(env, targets, sources))
                .unwrap_or_else(|_| cmd.template.clone()),
            Self::Callback(cb) => format!(
                "{}([{}], [{}])",
                cb.name,
                display_nodes(targets),
                display_nodes(sources)
            ),
            Self::Composite(actions) => actions
                .iter()
                .map(|action| action.describe(targets, sources, env))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Run the action.
    ///
    /// A command that exits non-zero yields an unsuccessful outcome rather
    /// than an error; deciding what failure means is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] when a command cannot be expanded or spawned,
    /// or when a callback reports a [`BuildError`].
    pub fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome, ActionError> {
        match self {
            Self::Command(cmd) => {
                let line = substitute(
                    &cmd.template,
                    SubstContext::new(ctx.env, ctx.targets, ctx.sources),
                )?;
                if ctx.options.show {
                    info!(command = %line, "running");
                } else {
                    debug!(command = %line, "running");
                }
                if !ctx.options.execute {
                    return Ok(ActionOutcome::ok());
                }
                let output = ctx
                    .runner
                    .run(&line, ctx.env)
                    .map_err(|source| ActionError::Spawn {
                        command: line.clone(),
                        source,
                    })?;
                Ok(ActionOutcome {
                    status: output.status,
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
            Self::Callback(cb) => {
                debug!(callback = %cb.name, "calling");
                if !ctx.options.execute {
                    return Ok(ActionOutcome::ok());
                }
                Ok((cb.func)(ctx)?)
            }
            Self::Composite(actions) => {
                let mut combined = ActionOutcome::ok();
                for action in actions {
                    let outcome = action.execute(ctx)?;
                    combined.stdout.push_str(&outcome.stdout);
                    combined.stderr.push_str(&outcome.stderr);
                    if !outcome.success() {
                        combined.status = outcome.status;
                        break;
                    }
                }
                Ok(combined)
            }
        }
    }
}
