//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! resolves paths against the working directory, layers the settings file
//! and `-D` defines over the tool defaults, and runs the chosen command.

mod error;

pub use error::RunnerError;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::action::RunOptions;
use crate::cli::{AliasArgs, BuildArgs, Cli, Commands, ScanArgs};
use crate::config::{self, Settings};
use crate::env::{Environment, OverrideDict};
use crate::node::{AliasRegistry, FileSystem, Node, NodeRef};
use crate::process::ShellRunner;
use crate::scanner::{LatexScanner, Scanner, Unresolved};
use crate::tex::{self, BuildRequest, PassState, PrimaryTool};

/// Execute the parsed [`Cli`] command.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded or the command fails.
pub fn run(cli: &Cli) -> Result<()> {
    let dir = working_dir(cli)?;
    match &cli.command {
        Commands::Scan(args) => handle_scan(cli, args, &dir),
        Commands::Build(args) => handle_build(cli, args, &dir),
        Commands::Alias(args) => handle_alias(args, &dir),
    }
}

fn handle_scan(cli: &Cli, args: &ScanArgs, dir: &Utf8Path) -> Result<()> {
    let env = load_environment(cli, dir)?;
    let fs = FileSystem::new(dir);
    let source = fs.node(resolve_path(dir, &args.source)?);
    let scanner = if args.pdf {
        LatexScanner::pdf()
    } else {
        LatexScanner::dvi()
    };
    let outcome = scanner
        .scan(&source, &env, &fs)
        .with_context(|| format!("scanning {}", source.name()))?;
    let deps: Vec<String> = outcome
        .deps
        .iter()
        .map(|dep| relative_to(dir, dep.name()))
        .collect();

    if args.json {
        let listing = ScanListing {
            source: relative_to(dir, source.name()),
            deps,
            unresolved: &outcome.unresolved,
        };
        let json = serde_json::to_string_pretty(&listing).context("serialising scan results")?;
        write_stdout(&json)
    } else {
        write_stdout(&deps.join("\n"))
    }
}

#[derive(Serialize)]
struct ScanListing<'a> {
    source: String,
    deps: Vec<String>,
    unresolved: &'a [Unresolved],
}

fn handle_build(cli: &Cli, args: &BuildArgs, dir: &Utf8Path) -> Result<()> {
    let tool = if args.pdf {
        PrimaryTool::PdfLatex
    } else {
        PrimaryTool::Latex
    };
    let env = Arc::new(load_environment(cli, dir)?);
    let source_path = resolve_path(dir, &args.source)?;
    let target_path = match &args.output {
        Some(path) => resolve_path(dir, path)?,
        None => source_path.with_extension(tool.output_suffix(&env).trim_start_matches('.')),
    };
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {parent}"))?;
    }

    let files = FileSystem::new(dir);
    let request = BuildRequest {
        target: files.file(&target_path),
        source: files.node(&source_path),
        tool,
        options: RunOptions::default(),
    };
    let runner = ShellRunner::in_dir(dir);
    let report = tex::build_document(&request, &env, &files, &runner)
        .with_context(|| format!("building {source_path}"))?;
    if report.state == PassState::RetryBudgetExhausted {
        warn!(
            reasons = ?report.last_reasons,
            "output may still contain unresolved references"
        );
    }
    info!(output = %report.output, passes = report.passes, state = %report.state, "build finished");
    write_stdout(&format!(
        "{} ({} {}, {})",
        relative_to(dir, report.output.as_str()),
        report.passes,
        if report.passes == 1 { "pass" } else { "passes" },
        report.state
    ))
}

fn handle_alias(args: &AliasArgs, dir: &Utf8Path) -> Result<()> {
    let files = FileSystem::new(dir);
    let mut registry = AliasRegistry::new();
    let alias = registry.lookup_or_create(&args.name);
    let children = args
        .children
        .iter()
        .map(|child| resolve_path(dir, child).map(|path| files.node(path)))
        .collect::<Result<Vec<NodeRef>>>()?;
    alias.add_children(&children);
    let signature = alias
        .content_signature()
        .with_context(|| format!("signing alias {}", args.name))?;
    write_stdout(&format!("{} {signature}", alias.name()))
}

/// Tool defaults, then the calling environment, the settings file and the
/// `-D` defines, later layers winning.
fn load_environment(cli: &Cli, dir: &Utf8Path) -> Result<Environment> {
    let settings = load_settings(cli, dir)?;
    Ok(Environment::with_tex_defaults()
        .inherit_process_env()
        .override_with(&[settings, cli.define_overrides()]))
}

fn load_settings(cli: &Cli, dir: &Utf8Path) -> Result<OverrideDict> {
    let path = if let Some(explicit) = &cli.config {
        let path = resolve_path(dir, explicit)?;
        if !path.is_file() {
            return Err(RunnerError::ConfigNotFound {
                path: path.into_std_path_buf(),
            }
            .into());
        }
        path
    } else {
        let path = dir.join(config::DEFAULT_FILE);
        if !path.is_file() {
            debug!(path = %path, "no settings file");
            return Ok(OverrideDict::new());
        }
        path
    };
    let settings =
        Settings::from_path(&path).with_context(|| format!("loading settings from {path}"))?;
    Ok(settings.into_override())
}

/// The directory commands run in: the current one, moved by `-C`.
fn working_dir(cli: &Cli) -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("reading the current directory")?;
    let dir = match &cli.directory {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };
    to_utf8(dir)
}

/// Resolve a command-line path against the working directory.
fn resolve_path(dir: &Utf8Path, path: &Path) -> Result<Utf8PathBuf> {
    let path = to_utf8(path.to_path_buf())?;
    Ok(if path.is_absolute() {
        path
    } else {
        dir.join(path)
    })
}

fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path).map_err(|path| RunnerError::NonUtf8Path { path }.into())
}

/// Display `name` relative to `dir` when it lies below it.
fn relative_to(dir: &Utf8Path, name: &str) -> String {
    Utf8Path::new(name)
        .strip_prefix(dir)
        .map_or_else(|_| name.to_owned(), |rel| rel.as_str().to_owned())
}

fn write_stdout(text: &str) -> Result<()> {
    let mut out = io::stdout().lock();
    if !text.is_empty() {
        writeln!(out, "{text}").context("writing to stdout")?;
    }
    out.flush().context("flushing stdout")
}

#[cfg(test)]
mod tests;
