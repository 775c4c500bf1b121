//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::env::{OverrideDict, Value};

mod parsing;

use parsing::parse_define;

/// Build LaTeX documents to a fixpoint and inspect their dependencies.
#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if started in this directory.
    ///
    /// Relative source, target and settings paths resolve against it.
    #[arg(short = 'C', long, value_name = "DIR", global = true)]
    pub directory: Option<PathBuf>,

    /// Settings file; defaults to `settle.yml` when that exists.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Override a construction variable; `ENV.NAME=VALUE` sets a process
    /// environment entry. Later defines win.
    #[arg(
        short = 'D',
        long = "define",
        value_name = "KEY=VALUE",
        value_parser = parse_define,
        global = true
    )]
    pub defines: Vec<(String, Value)>,

    /// Enable verbose diagnostic logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The `-D` defines as one override dictionary.
    #[must_use]
    pub fn define_overrides(&self) -> OverrideDict {
        self.defines.iter().cloned().collect()
    }
}

/// Arguments accepted by the `scan` command.
#[derive(Debug, Args, PartialEq, Eq, Clone)]
pub struct ScanArgs {
    /// Root document to scan.
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Use the PDF variant, which tries PDF-friendly graphics extensions.
    #[arg(long)]
    pub pdf: bool,

    /// Print dependencies and unresolved references as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments accepted by the `build` command.
#[derive(Debug, Args, PartialEq, Eq, Clone)]
pub struct BuildArgs {
    /// Root document to build.
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Output file; defaults to the source stem with `.dvi` or `.pdf`.
    #[arg(short, long, value_name = "TARGET")]
    pub output: Option<PathBuf>,

    /// Run `pdflatex` instead of `latex`.
    #[arg(long)]
    pub pdf: bool,
}

/// Arguments accepted by the `alias` command.
#[derive(Debug, Args, PartialEq, Eq, Clone)]
pub struct AliasArgs {
    /// Alias name.
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Children in order; the order is part of the signature.
    #[arg(value_name = "CHILD", required = true)]
    pub children: Vec<PathBuf>,
}

/// Available top-level commands.
#[derive(Debug, Subcommand, PartialEq, Eq, Clone)]
pub enum Commands {
    /// Print the resolved implicit dependencies of a document.
    Scan(ScanArgs),

    /// Build a document, rerunning LaTeX until its outputs settle.
    Build(BuildArgs),

    /// Print the content signature of an alias over the given children.
    Alias(AliasArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[rstest]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[rstest]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "settle", "build", "doc.tex", "-o", "out/doc.pdf", "--pdf", "-C", "work", "-v",
        ])
        .expect("parse");
        assert_eq!(cli.directory, Some(PathBuf::from("work")));
        assert!(cli.verbose);
        assert_eq!(
            cli.command,
            Commands::Build(BuildArgs {
                source: PathBuf::from("doc.tex"),
                output: Some(PathBuf::from("out/doc.pdf")),
                pdf: true,
            })
        );
    }

    #[rstest]
    fn later_defines_win() {
        let cli = Cli::try_parse_from([
            "settle", "-D", "LATEX=a", "-D", "ENV.TZ=UTC", "-D", "LATEX=b", "scan", "doc.tex",
        ])
        .expect("parse");
        let dict = cli.define_overrides();
        assert_eq!(dict.get("LATEX"), Some(&Value::from("b")));
        assert_eq!(dict.get("ENV.TZ"), Some(&Value::from("UTC")));
        assert_eq!(dict.len(), 2);
    }

    #[rstest]
    #[case(&["settle", "-D", "NOEQUALS", "scan", "doc.tex"])]
    #[case(&["settle", "alias", "all"])]
    #[case(&["settle"])]
    fn invalid_invocations_are_rejected(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }
}
