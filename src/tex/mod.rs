//! TeX and LaTeX document builds.
//!
//! [`build_document`] checks the source exists, records its implicit
//! dependencies and side effects, and then either runs a plain TeX engine
//! once or hands a LaTeX document to the [`ConvergenceDriver`], which
//! repeats passes until the auxiliary files and the log settle.

mod auxiliary;
pub mod defaults;
mod driver;
mod emitter;
mod features;
mod flavor;
mod log;

use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use thiserror::Error;
use tracing::info;

use crate::action::RunOptions;
use crate::env::Environment;
use crate::executor::{ExecutorError, ScanWith};
use crate::node::{FileNode, FileSystem, NodeError, NodeRef};
use crate::process::ProcessRunner;

pub use auxiliary::{AuxKind, AuxLedger, CHECK_SUFFIXES};
pub use driver::{
    Convergence, ConvergenceDriver, ConvergenceReport, EXPORTED_PATH_VARS, PassState,
    PrimaryTool, SecondaryRun, export_search_paths, place_output,
};
pub use emitter::emit_side_effects;
pub use features::Features;
pub use flavor::{Flavor, detect as detect_flavor};
pub use log::{RerunReason, recorded_aux_files, recorded_outputs, rerun_reasons};

/// Failures while building a document.
#[derive(Debug, Error, Diagnostic)]
pub enum ConvergenceError {
    /// Preparing, scanning or running a single-shot step failed.
    #[error("build step failed: {0}")]
    #[diagnostic(code(settle::tex::step))]
    Executor(#[source] Box<ExecutorError>),

    /// The primary engine failed.
    #[error("LaTeX pass {pass} failed: {source}")]
    #[diagnostic(
        code(settle::tex::primary),
        help("check the .log file next to the target")
    )]
    Primary {
        /// Pass that failed, starting at one.
        pass: u32,
        /// The executor failure.
        #[source]
        source: Box<ExecutorError>,
    },

    /// A secondary tool whose output the document cannot do without failed.
    #[error("{kind} tool failed, check {log}: {source}")]
    #[diagnostic(code(settle::tex::secondary_tool))]
    SecondaryTool {
        /// Auxiliary kind whose tool failed.
        kind: AuxKind,
        /// The tool's log file.
        log: Utf8PathBuf,
        /// The executor failure.
        #[source]
        source: Box<ExecutorError>,
    },

    /// An auxiliary or output file could not be read or moved.
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(code(settle::tex::io))]
    Io {
        /// Offending path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A source file could not be read.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Node(#[from] NodeError),
}

impl From<ExecutorError> for ConvergenceError {
    fn from(err: ExecutorError) -> Self {
        Self::Executor(Box::new(err))
    }
}

/// A document to build.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    /// Requested output file.
    pub target: Arc<FileNode>,
    /// Root document.
    pub source: NodeRef,
    /// Engine family.
    pub tool: PrimaryTool,
    /// Options forwarded to every action.
    pub options: RunOptions,
}

/// Build one document from scratch to its final output.
///
/// # Errors
///
/// Returns [`ConvergenceError::Executor`] when the source is missing or
/// cannot be scanned, and the driver's errors for LaTeX documents.
pub fn build_document(
    request: &BuildRequest,
    env: &Arc<Environment>,
    fs: &FileSystem,
    runner: &dyn ProcessRunner,
) -> Result<ConvergenceReport, ConvergenceError> {
    let target = Arc::clone(&request.target) as NodeRef;
    let source = &request.source;

    let step = driver::single_command(request.tool.command_var(), env, &target, source)?;
    step.prepare()?;
    let scanner = request.tool.scanner();
    let deps = step.scan_sources(ScanWith::Explicit(&scanner), fs)?;
    info!(source = source.name(), deps = deps.len(), "scanned implicit dependencies");
    emit_side_effects(&request.target, source, env, fs)?;

    match detect_flavor(source, env, fs)? {
        Flavor::Latex => ConvergenceDriver::new(request.tool, Arc::clone(env), runner, fs)
            .with_options(request.options)
            .run(&target, source),
        Flavor::Tex => build_plain(request, env, runner),
    }
}

/// Plain TeX needs no convergence: run the engine once.
fn build_plain(
    request: &BuildRequest,
    env: &Arc<Environment>,
    runner: &dyn ProcessRunner,
) -> Result<ConvergenceReport, ConvergenceError> {
    let target = Arc::clone(&request.target) as NodeRef;
    let source = &request.source;
    let env = Arc::new(export_search_paths(env, source));
    let executor =
        driver::single_command(request.tool.plain_command_var(), &env, &target, source)?;
    executor
        .run(runner, request.options)
        .map_err(|source| ConvergenceError::Primary {
            pass: 1,
            source: Box::new(source),
        })?;
    let stem = Utf8Path::new(source.name()).file_stem().unwrap_or_default();
    let produced = target.directory().join(format!(
        "{stem}{}",
        request.tool.output_suffix(&env)
    ));
    let output = place_output(&produced, &target)?;
    target.clear_memoized();
    Ok(ConvergenceReport {
        state: PassState::Converged,
        passes: 1,
        secondary_runs: Vec::new(),
        last_reasons: Vec::new(),
        output,
    })
}
