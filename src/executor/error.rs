//! Error types for executors and the batch executor registry.

use miette::Diagnostic;
use thiserror::Error;

use crate::action::{ActionError, BuildError};
use crate::scanner::ScanError;

/// Failures preparing, signing, scanning or running an executor.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    /// An executor was constructed without any action.
    #[error("an executor needs at least one action")]
    #[diagnostic(code(settle::executor::no_action))]
    NoAction,

    /// `add_sources` was called on an executor without exactly one batch.
    #[error("cannot add sources to an executor holding {count} batches")]
    #[diagnostic(
        code(settle::executor::multiple_batches),
        help("use add_batch to attach sources to a new target group")
    )]
    MultipleBatches {
        /// Number of batches held.
        count: usize,
    },

    /// A declared source does not exist.
    #[error("source `{source_node}` not found, needed by target `{target}`")]
    #[diagnostic(code(settle::executor::missing_source))]
    MissingSource {
        /// The missing source.
        source_node: String,
        /// Representative target of the batch.
        target: String,
    },

    /// An action exited unsuccessfully.
    #[error("{}: `{action}` failed for `{target}`", describe_status(.status))]
    #[diagnostic(code(settle::executor::action_failed))]
    ActionFailed {
        /// Rendered action.
        action: String,
        /// Representative target.
        target: String,
        /// Exit status, `None` when killed.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// An action raised a structured build error.
    #[error("building `{target}` failed")]
    #[diagnostic(code(settle::executor::build))]
    Build {
        /// Representative target.
        target: String,
        /// Rendered action chain of the executor.
        executor: String,
        /// The error raised by the action.
        #[source]
        source: BuildError,
    },

    /// An action could not produce contents or an outcome.
    #[error("action `{action}` for `{target}` could not run")]
    #[diagnostic(code(settle::executor::action))]
    Action {
        /// Rendered action.
        action: String,
        /// Representative target.
        target: String,
        /// Underlying failure.
        #[source]
        source: ActionError,
    },

    /// Dependency scanning failed.
    #[error("scanning `{node}` failed")]
    #[diagnostic(code(settle::executor::scan))]
    Scan {
        /// Node being scanned.
        node: String,
        /// Underlying failure.
        #[source]
        source: ScanError,
    },
}

fn describe_status(status: &Option<i32>) -> String {
    status.map_or_else(
        || "terminated by signal".to_owned(),
        |code| format!("exit status {code}"),
    )
}

/// Failures registering batch executors.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    /// An executor is already registered under the key.
    #[error("a batch executor is already registered for `{key}`")]
    #[diagnostic(code(settle::executor::duplicate_key))]
    DuplicateKey {
        /// Offending key.
        key: String,
    },
}
