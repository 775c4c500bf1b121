//! Multi-pass LaTeX builds run to a fixpoint.
//!
//! Each pass runs the primary tool, then any secondary tools whose inputs
//! appeared or changed, then decides whether another pass is needed from
//! auxiliary file signatures and the markers in the log. The number of
//! passes is bounded by the retry limit; hitting it is a warning and the
//! last output is kept.

use std::fmt;
use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use super::ConvergenceError;
use super::auxiliary::{AuxKind, AuxLedger, CHECK_SUFFIXES};
use super::defaults::DEFAULT_RETRIES;
use super::features::Features;
use super::log::{RerunReason, recorded_aux_files, rerun_reasons};
use crate::action::{Action, RunOptions};
use crate::env::Environment;
use crate::executor::{Executor, ExecutorError, RunReport};
use crate::node::{FileSystem, NodeRef};
use crate::process::ProcessRunner;
use crate::scanner::LatexScanner;

/// Search variables exported to the TeX tools' process environment.
pub const EXPORTED_PATH_VARS: &[&str] = &["TEXINPUTS", "BIBINPUTS", "BSTINPUTS"];

/// Which engine produces the document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimaryTool {
    /// `latex`, producing DVI.
    #[default]
    Latex,
    /// `pdflatex`, producing PDF.
    PdfLatex,
}

impl PrimaryTool {
    /// Command variable for LaTeX documents.
    #[must_use]
    pub const fn command_var(self) -> &'static str {
        match self {
            Self::Latex => "LATEXCOM",
            Self::PdfLatex => "PDFLATEXCOM",
        }
    }

    /// Command variable for plain TeX documents.
    #[must_use]
    pub const fn plain_command_var(self) -> &'static str {
        match self {
            Self::Latex => "TEXCOM",
            Self::PdfLatex => "PDFTEXCOM",
        }
    }

    /// Suffix of the file the engine writes.
    #[must_use]
    pub fn output_suffix(self, env: &Environment) -> String {
        let (var, fallback) = match self {
            Self::Latex => ("DVISUFFIX", ".dvi"),
            Self::PdfLatex => ("PDFSUFFIX", ".pdf"),
        };
        env.get_str(var)
            .filter(|suffix| !suffix.is_empty())
            .unwrap_or_else(|| fallback.to_owned())
    }

    /// Dependency scanner matching the engine's graphics formats.
    #[must_use]
    pub fn scanner(self) -> LatexScanner {
        match self {
            Self::Latex => LatexScanner::dvi(),
            Self::PdfLatex => LatexScanner::pdf(),
        }
    }
}

/// Where a convergence run stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    /// Another pass is due.
    Running,
    /// The last pass changed nothing that matters.
    Converged,
    /// The retry limit was reached while a rerun was still wanted.
    RetryBudgetExhausted,
    /// A pass failed.
    Failed,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Converged => "converged",
            Self::RetryBudgetExhausted => "retry budget exhausted",
            Self::Failed => "failed",
        })
    }
}

/// One secondary tool invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecondaryRun {
    /// Auxiliary kind processed.
    pub kind: AuxKind,
    /// Pass after which the tool ran, starting at one.
    pub pass: u32,
    /// Whether the tool succeeded.
    pub success: bool,
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Terminal state.
    pub state: PassState,
    /// Primary passes run.
    pub passes: u32,
    /// Secondary tools run, in order.
    pub secondary_runs: Vec<SecondaryRun>,
    /// Rerun markers found in the last log.
    pub last_reasons: Vec<RerunReason>,
    /// Final output path.
    pub output: Utf8PathBuf,
}

impl ConvergenceReport {
    /// How often the tool for `kind` ran.
    #[must_use]
    pub fn runs_of(&self, kind: AuxKind) -> usize {
        self.secondary_runs.iter().filter(|run| run.kind == kind).count()
    }
}

/// Derive an environment whose process `ENV` search paths start with the
/// source directory and the construction-variable directories.
#[must_use]
pub fn export_search_paths(env: &Environment, source: &NodeRef) -> Environment {
    let mut derived = env.clone();
    let source_dir = source.directory();
    for var in EXPORTED_PATH_VARS {
        let mut dirs = vec![source_dir.clone()];
        dirs.extend(env.search_path(var).from_vars);
        derived.prepend_process_path(var, &dirs);
    }
    derived
}

/// Runs LaTeX builds to a fixpoint.
pub struct ConvergenceDriver<'a> {
    env: Arc<Environment>,
    runner: &'a dyn ProcessRunner,
    fs: &'a FileSystem,
    primary: Action,
    output_suffix: String,
    retry_limit: u32,
    options: RunOptions,
}

impl fmt::Debug for ConvergenceDriver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvergenceDriver")
            .field("primary", &self.primary)
            .field("output_suffix", &self.output_suffix)
            .field("retry_limit", &self.retry_limit)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> ConvergenceDriver<'a> {
    /// Driver for `tool`, reading the retry limit from `LATEXRETRIES`.
    #[must_use]
    pub fn new(
        tool: PrimaryTool,
        env: Arc<Environment>,
        runner: &'a dyn ProcessRunner,
        fs: &'a FileSystem,
    ) -> Self {
        let retry_limit = env.get_u32("LATEXRETRIES").unwrap_or(DEFAULT_RETRIES);
        Self {
            primary: Action::command(format!("${}", tool.command_var())),
            output_suffix: tool.output_suffix(&env),
            env,
            runner,
            fs,
            retry_limit: retry_limit.max(1),
            options: RunOptions::default(),
        }
    }

    /// Replace the primary action.
    #[must_use]
    pub fn with_primary_action(mut self, action: Action) -> Self {
        self.primary = action;
        self
    }

    /// Cap the number of passes; at least one pass always runs.
    #[must_use]
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit.max(1);
        self
    }

    /// Options forwarded to every action.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Maximum number of primary passes.
    #[must_use]
    pub const fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Prepare a run building `target` from `source` without starting it.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergenceError`] when the source cannot be read or the
    /// existing auxiliary files cannot be signed.
    pub fn start(
        &self,
        target: &NodeRef,
        source: &NodeRef,
    ) -> Result<Convergence<'_, 'a>, ConvergenceError> {
        let env = Arc::new(export_search_paths(&self.env, source));
        let stem = Utf8Path::new(source.name()).file_stem().unwrap_or_default();
        let target_dir = target.directory();
        let ledger = AuxLedger::snapshot(target_dir.join(stem))?;
        let features = Features::detect(&source.text_contents()?);

        let mut required = Vec::new();
        for (kind, wanted) in [
            (AuxKind::Index, features.index),
            (AuxKind::Nomenclature, features.nomenclature),
            (AuxKind::Glossary, features.glossary || features.glossaries),
            (AuxKind::Acronyms, features.acronyms()),
        ] {
            if wanted && kind.trigger_suffix().is_some_and(|suffix| !ledger.exists(suffix)) {
                required.push(kind);
            }
        }
        debug!(source = source.name(), ?required, "secondary tools required on the first pass");

        let primary = Executor::new(vec![self.primary.clone()], Arc::clone(&env))?
            .with_batch(vec![Arc::clone(target)], vec![Arc::clone(source)]);
        info!(
            target = target.name(),
            retries = self.retry_limit,
            "starting LaTeX build"
        );
        Ok(Convergence {
            driver: self,
            target: Arc::clone(target),
            target_dir,
            env,
            primary,
            ledger,
            required,
            state: PassState::Running,
            passes: 0,
            secondary_runs: Vec::new(),
            last_reasons: Vec::new(),
        })
    }

    /// Build `target` from `source`, running passes until the document
    /// converges or the retry limit is reached.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergenceError::Primary`] when a primary pass fails,
    /// [`ConvergenceError::SecondaryTool`] when a mandatory secondary tool
    /// fails, and [`ConvergenceError::Io`] for file system failures.
    pub fn run(
        &self,
        target: &NodeRef,
        source: &NodeRef,
    ) -> Result<ConvergenceReport, ConvergenceError> {
        let mut run = self.start(target, source)?;
        while run.step()? == PassState::Running {}
        run.finish()
    }
}

/// A convergence run in progress.
pub struct Convergence<'d, 'a> {
    driver: &'d ConvergenceDriver<'a>,
    target: NodeRef,
    target_dir: Utf8PathBuf,
    env: Arc<Environment>,
    primary: Executor,
    ledger: AuxLedger,
    required: Vec<AuxKind>,
    state: PassState,
    passes: u32,
    secondary_runs: Vec<SecondaryRun>,
    last_reasons: Vec<RerunReason>,
}

impl fmt::Debug for Convergence<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Convergence")
            .field("target", &self.target.name())
            .field("state", &self.state)
            .field("passes", &self.passes)
            .finish_non_exhaustive()
    }
}

impl Convergence<'_, '_> {
    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PassState {
        self.state
    }

    /// Primary passes run so far.
    #[must_use]
    pub const fn passes(&self) -> u32 {
        self.passes
    }

    /// Effective environment handed to every tool.
    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run one pass when the run is still going and return the new state.
    ///
    /// # Errors
    ///
    /// A failing primary pass or mandatory secondary tool moves the run to
    /// [`PassState::Failed`] and returns the failure.
    pub fn step(&mut self) -> Result<PassState, ConvergenceError> {
        if self.state != PassState::Running {
            return Ok(self.state);
        }
        let pass = self.passes + 1;
        info!(target = self.target.name(), pass, "running primary pass");
        let report = match self.primary.run(self.driver.runner, self.driver.options) {
            Ok(report) => report,
            Err(source) => {
                self.state = PassState::Failed;
                return Err(ConvergenceError::Primary {
                    pass,
                    source: Box::new(source),
                });
            }
        };
        self.passes = pass;
        let result = self.evaluate(&report);
        if result.is_err() {
            self.state = PassState::Failed;
        }
        result
    }

    fn evaluate(&mut self, report: &RunReport) -> Result<PassState, ConvergenceError> {
        let log = self.read_log(report)?;
        let mut must_rerun = false;

        if self.passes == 1 && self.bibliography_requested()? {
            debug!("bibliography data referenced, running bibliography tool");
            self.run_secondary(AuxKind::Bibliography)?;
            must_rerun |= self.ledger.check(AuxKind::Bibliography.output_suffix())?;
        }

        for kind in [
            AuxKind::Index,
            AuxKind::Nomenclature,
            AuxKind::Glossary,
            AuxKind::Acronyms,
        ] {
            let Some(trigger) = kind.trigger_suffix() else {
                continue;
            };
            let changed = self.ledger.check(trigger)?;
            let first_time = self.passes == 1 && self.required.contains(&kind);
            if (changed || first_time) && self.run_secondary(kind)? {
                must_rerun |= self.ledger.check(kind.output_suffix())?;
            }
        }

        for suffix in CHECK_SUFFIXES.iter().copied() {
            must_rerun |= self.ledger.check(suffix)?;
        }

        self.last_reasons = rerun_reasons(&log);
        for reason in &self.last_reasons {
            debug!(%reason, "log asks for another pass");
        }
        must_rerun |= !self.last_reasons.is_empty();

        self.state = if !must_rerun {
            info!(passes = self.passes, "document converged");
            PassState::Converged
        } else if self.passes >= self.driver.retry_limit {
            warn!(
                target = self.target.name(),
                retries = self.driver.retry_limit,
                "reached the maximum number of LaTeX passes"
            );
            PassState::RetryBudgetExhausted
        } else {
            PassState::Running
        };
        Ok(self.state)
    }

    /// Move the output into place and summarise the run.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergenceError::Io`] when the output cannot be moved.
    pub fn finish(self) -> Result<ConvergenceReport, ConvergenceError> {
        let produced = self.ledger.path(&self.driver.output_suffix);
        let output = place_output(&produced, &self.target)?;
        self.target.clear_memoized();
        Ok(ConvergenceReport {
            state: self.state,
            passes: self.passes,
            secondary_runs: self.secondary_runs,
            last_reasons: self.last_reasons,
            output,
        })
    }

    fn read_log(&self, report: &RunReport) -> Result<String, ConvergenceError> {
        let path = self.ledger.path(".log");
        match fs::read(&path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(report.stdout()),
            Err(source) => Err(ConvergenceError::Io { path, source }),
        }
    }

    /// Whether an `.aux` file read by the last pass references bibliography
    /// data. The recorder file lists them; without one the main `.aux` is
    /// consulted.
    fn bibliography_requested(&self) -> Result<bool, ConvergenceError> {
        let fls = self.ledger.path(".fls");
        let aux_files: Vec<Utf8PathBuf> = match read_optional(&fls)? {
            Some(text) => recorded_aux_files(&text)
                .into_iter()
                .map(|name| {
                    let path = Utf8PathBuf::from(name);
                    if path.is_absolute() {
                        path
                    } else {
                        self.target_dir.join(path)
                    }
                })
                .collect(),
            None => vec![self.ledger.path(".aux")],
        };
        for aux in aux_files {
            if read_optional(&aux)?.is_some_and(|text| text.contains("bibdata")) {
                debug!(aux = %aux, "found bibliography data");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run the tool for `kind` once. Returns whether it succeeded; a
    /// failing mandatory tool is an error.
    fn run_secondary(&mut self, kind: AuxKind) -> Result<bool, ConvergenceError> {
        let path = match kind.trigger_suffix() {
            Some(suffix) => self.ledger.path(suffix),
            None => self.ledger.base().to_path_buf(),
        };
        let node = self.driver.fs.node(&path);
        let template = format!("${}", kind.command_var());
        let result = Executor::new(vec![Action::command(template)], Arc::clone(&self.env))
            .and_then(|executor| {
                executor
                    .with_batch(vec![Arc::clone(&node)], vec![node])
                    .run(self.driver.runner, self.driver.options)
            });
        self.secondary_runs.push(SecondaryRun {
            kind,
            pass: self.passes,
            success: result.is_ok(),
        });
        let log = self.ledger.path(kind.log_suffix());
        match result {
            Ok(_) => Ok(true),
            Err(source) if kind.mandatory() => Err(ConvergenceError::SecondaryTool {
                kind,
                log,
                source: Box::new(source),
            }),
            Err(err) => {
                warn!(tool = %kind, log = %log, error = %err, "secondary tool failed, check its log");
                Ok(false)
            }
        }
    }
}

fn read_optional(path: &Utf8Path) -> Result<Option<String>, ConvergenceError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConvergenceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Move `produced` to `target` when the names differ and `produced` exists.
///
/// Falls back to copy and remove when a plain rename fails, such as across
/// file systems. Returns the final output path.
///
/// # Errors
///
/// Returns [`ConvergenceError::Io`] when neither strategy succeeds.
pub fn place_output(produced: &Utf8Path, target: &NodeRef) -> Result<Utf8PathBuf, ConvergenceError> {
    let requested = Utf8PathBuf::from(target.name());
    if produced == requested || !produced.is_file() {
        return Ok(requested);
    }
    info!(from = %produced, to = %requested, "moving output into place");
    if let Err(err) = fs::rename(produced, &requested) {
        debug!(error = %err, "rename failed, copying instead");
        fs::copy(produced, &requested).map_err(|source| ConvergenceError::Io {
            path: requested.clone(),
            source,
        })?;
        fs::remove_file(produced).map_err(|source| ConvergenceError::Io {
            path: produced.to_path_buf(),
            source,
        })?;
    }
    Ok(requested)
}

/// Executor running the command template stored in `var` once.
pub(super) fn single_command(
    var: &str,
    env: &Arc<Environment>,
    target: &NodeRef,
    source: &NodeRef,
) -> Result<Executor, ExecutorError> {
    Ok(Executor::new(vec![Action::command(format!("${var}"))], Arc::clone(env))?
        .with_batch(vec![Arc::clone(target)], vec![Arc::clone(source)]))
}
