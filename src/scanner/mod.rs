//! Implicit dependency discovery for LaTeX documents.
//!
//! [`LatexScanner`] reads a document, extracts `\include`, `\input`,
//! `\includegraphics`, `\lstinputlisting`, `\bibliography`,
//! `\bibliographystyle` and `\usepackage` references, resolves each through
//! the keyword's search path and recurses into included TeX files. The
//! result is ordered by the normalised reference text so it does not depend
//! on directory listing order.
//!
//! Unresolved references are warnings: they are logged and reported in
//! [`ScanOutcome::unresolved`], except `\usepackage` names, which usually
//! live in the TeX distribution and are ignored quietly. A genuine include
//! cycle between files is an error.

mod cache;
mod directive;
mod includes;
mod walk;

use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::env::Environment;
use crate::node::{FileSystem, NodeError, NodeRef};

pub use cache::{CACHE_CAPACITY, IncludeCache};
pub use directive::{Directive, Keyword, candidate_names, extract};
pub use includes::{IncludedFile, walk_includes};

/// Graphics extensions tried by `latex`.
pub const TEX_GRAPHICS: &[&str] = &[".eps", ".ps"];

/// Graphics extensions tried by `pdflatex`.
pub const LATEX_GRAPHICS: &[&str] = &[".pdf", ".png", ".jpg", ".gif", ".tif"];

/// Suffixes scanned when `LATEXSUFFIXES` is not set.
pub const DEFAULT_LATEX_SUFFIXES: &[&str] = &[".tex", ".ltx", ".latex"];

/// Failures while scanning.
#[derive(Debug, Error, Diagnostic)]
pub enum ScanError {
    /// A file could not be read.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Node(#[from] NodeError),

    /// Two or more files include each other.
    #[error("reference cycle: {}", .cycle.join(" -> "))]
    #[diagnostic(
        code(settle::scanner::reference_cycle),
        help("remove one of the \\include or \\input directives forming the loop")
    )]
    ReferenceCycle {
        /// Files on the cycle, starting and ending at the smallest name.
        cycle: Vec<String>,
    },
}

/// A reference no search directory could satisfy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Unresolved {
    /// Directive keyword.
    pub keyword: Keyword,
    /// Reference as written.
    pub reference: String,
    /// File containing the directive.
    pub included_from: String,
}

/// Result of scanning one node.
#[derive(Clone, Debug, Default)]
pub struct ScanOutcome {
    /// Resolved dependencies in deterministic order, without duplicates.
    pub deps: Vec<NodeRef>,
    /// References that could not be resolved.
    pub unresolved: Vec<Unresolved>,
}

/// Dependency scanner for one kind of source.
pub trait Scanner: fmt::Debug + Send + Sync {
    /// Scanner name for diagnostics.
    fn name(&self) -> &str;

    /// Whether this scanner applies to `node`.
    fn select(&self, node: &NodeRef, env: &Environment) -> bool;

    /// Discover `node`'s implicit dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when a file cannot be read or a reference
    /// cycle is found.
    fn scan(
        &self,
        node: &NodeRef,
        env: &Environment,
        fs: &FileSystem,
    ) -> Result<ScanOutcome, ScanError>;
}

/// Picks the scanner for a node, if any applies.
pub trait ScannerSelector: fmt::Debug {
    /// Scanner to use for `node`.
    fn scanner_for(&self, node: &NodeRef, env: &Environment) -> Option<&dyn Scanner>;
}

/// Scanner for LaTeX sources.
///
/// The DVI and PDF variants differ only in the graphics extensions they try
/// for `\includegraphics` references without an extension.
#[derive(Clone, Debug)]
pub struct LatexScanner {
    name: &'static str,
    graphics: &'static [&'static str],
    cache: IncludeCache,
}

impl LatexScanner {
    /// Scanner for documents built with `latex`.
    #[must_use]
    pub fn dvi() -> Self {
        Self {
            name: "LaTeXScanner",
            graphics: TEX_GRAPHICS,
            cache: IncludeCache::default(),
        }
    }

    /// Scanner for documents built with `pdflatex`.
    #[must_use]
    pub fn pdf() -> Self {
        Self {
            name: "PDFLaTeXScanner",
            graphics: LATEX_GRAPHICS,
            cache: IncludeCache::default(),
        }
    }

    /// Share `cache` instead of the scanner's own.
    #[must_use]
    pub fn with_cache(mut self, cache: IncludeCache) -> Self {
        self.cache = cache;
        self
    }

    /// The directive cache in use.
    #[must_use]
    pub fn cache(&self) -> &IncludeCache {
        &self.cache
    }

    /// Graphics extensions this variant infers.
    #[must_use]
    pub fn graphics_extensions(&self) -> &[&str] {
        self.graphics
    }

    /// Directives of `node`, served from the cache when its content is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Node`] when the file cannot be read.
    pub fn directives(&self, node: &NodeRef) -> Result<Arc<Vec<Directive>>, ScanError> {
        let signature = node.content_signature()?;
        if let Some(hit) = self.cache.get(node.name(), &signature) {
            debug!(node = node.name(), "directive cache hit");
            return Ok(hit);
        }
        let directives = Arc::new(extract(&node.text_contents()?));
        self.cache
            .store(node.name(), signature, Arc::clone(&directives));
        Ok(directives)
    }
}

impl Scanner for LatexScanner {
    fn name(&self) -> &str {
        self.name
    }

    fn select(&self, node: &NodeRef, env: &Environment) -> bool {
        let Some(ext) = Utf8Path::new(node.name()).extension() else {
            return false;
        };
        let suffix = format!(".{ext}");
        env.get("LATEXSUFFIXES").map_or_else(
            || DEFAULT_LATEX_SUFFIXES.contains(&suffix.as_str()),
            |value| value.as_words().contains(&suffix),
        )
    }

    fn scan(
        &self,
        node: &NodeRef,
        env: &Environment,
        fs: &FileSystem,
    ) -> Result<ScanOutcome, ScanError> {
        if !node.exists() {
            return Ok(ScanOutcome::default());
        }
        walk::Walk::new(self, env, fs, node).run()
    }
}

/// Selects the first scanner whose [`Scanner::select`] accepts a node.
#[derive(Debug, Default)]
pub struct SuffixSelector {
    scanners: Vec<Box<dyn Scanner>>,
}

impl SuffixSelector {
    /// Selector over `scanners`, consulted in order.
    #[must_use]
    pub fn new(scanners: Vec<Box<dyn Scanner>>) -> Self {
        Self { scanners }
    }

    /// Selector for LaTeX documents built with `latex` or `pdflatex`.
    #[must_use]
    pub fn latex(pdf: bool) -> Self {
        let scanner = if pdf {
            LatexScanner::pdf()
        } else {
            LatexScanner::dvi()
        };
        Self::new(vec![Box::new(scanner)])
    }
}

impl ScannerSelector for SuffixSelector {
    fn scanner_for(&self, node: &NodeRef, env: &Environment) -> Option<&dyn Scanner> {
        self.scanners
            .iter()
            .find(|scanner| scanner.select(node, env))
            .map(|scanner| &**scanner)
    }
}

#[cfg(test)]
mod tests;
