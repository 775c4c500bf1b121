//! Auxiliary file kinds and their per-pass signature ledger.

use std::collections::HashMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::ConvergenceError;
use crate::hasher::{Signature, file_signature};

/// Suffixes whose change alone forces another pass.
pub const CHECK_SUFFIXES: &[&str] = &[".toc", ".lof", ".lot", ".out", ".nav", ".snm"];

/// Auxiliary files processed by a secondary tool between passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuxKind {
    /// Bibliography resolution (`bibtex`).
    Bibliography,
    /// Index generation (`makeindex`).
    Index,
    /// Nomenclature list.
    Nomenclature,
    /// Glossary.
    Glossary,
    /// Acronym list.
    Acronyms,
}

impl AuxKind {
    /// Every kind in processing order.
    pub const ALL: [Self; 5] = [
        Self::Bibliography,
        Self::Index,
        Self::Nomenclature,
        Self::Glossary,
        Self::Acronyms,
    ];

    /// Suffix of the file LaTeX writes for the tool to read. Bibliography
    /// data is found through `.aux` files instead.
    #[must_use]
    pub const fn trigger_suffix(self) -> Option<&'static str> {
        match self {
            Self::Bibliography => None,
            Self::Index => Some(".idx"),
            Self::Nomenclature => Some(".nlo"),
            Self::Glossary => Some(".glo"),
            Self::Acronyms => Some(".acn"),
        }
    }

    /// Suffix of the file the tool writes for the next pass.
    #[must_use]
    pub const fn output_suffix(self) -> &'static str {
        match self {
            Self::Bibliography => ".bbl",
            Self::Index => ".ind",
            Self::Nomenclature => ".nls",
            Self::Glossary => ".gls",
            Self::Acronyms => ".acr",
        }
    }

    /// Suffix of the tool's own log, named in failure messages.
    #[must_use]
    pub const fn log_suffix(self) -> &'static str {
        match self {
            Self::Bibliography => ".blg",
            Self::Index => ".ilg",
            Self::Nomenclature => ".nlg",
            Self::Glossary => ".glg",
            Self::Acronyms => ".alg",
        }
    }

    /// Construction variable holding the tool's command template.
    #[must_use]
    pub const fn command_var(self) -> &'static str {
        match self {
            Self::Bibliography => "BIBTEXCOM",
            Self::Index => "MAKEINDEXCOM",
            Self::Nomenclature => "MAKENCLCOM",
            Self::Glossary => "MAKEGLOSSARYCOM",
            Self::Acronyms => "MAKEACRONYMSCOM",
        }
    }

    /// Whether a failing tool fails the whole build.
    #[must_use]
    pub const fn mandatory(self) -> bool {
        matches!(self, Self::Bibliography | Self::Acronyms)
    }

    /// Every suffix whose signature the ledger follows.
    #[must_use]
    pub fn tracked_suffixes() -> Vec<&'static str> {
        let mut out: Vec<&'static str> = CHECK_SUFFIXES.to_vec();
        for kind in Self::ALL {
            out.extend(kind.trigger_suffix());
            out.push(kind.output_suffix());
        }
        out
    }
}

impl fmt::Display for AuxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bibliography => "bibliography",
            Self::Index => "index",
            Self::Nomenclature => "nomenclature",
            Self::Glossary => "glossary",
            Self::Acronyms => "acronyms",
        })
    }
}

/// Signatures of `<base><suffix>` files as last observed.
///
/// A missing file has no signature; a file appearing, disappearing or
/// changing content all count as a change.
#[derive(Clone, Debug)]
pub struct AuxLedger {
    base: Utf8PathBuf,
    saved: HashMap<&'static str, Option<Signature>>,
}

impl AuxLedger {
    /// Record the current signature of every tracked suffix.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergenceError::Io`] when an existing file cannot be read.
    pub fn snapshot(base: impl Into<Utf8PathBuf>) -> Result<Self, ConvergenceError> {
        let mut ledger = Self {
            base: base.into(),
            saved: HashMap::new(),
        };
        for suffix in AuxKind::tracked_suffixes() {
            let signature = ledger.current(suffix)?;
            ledger.saved.insert(suffix, signature);
        }
        Ok(ledger)
    }

    /// Path of `<base><suffix>`.
    #[must_use]
    pub fn path(&self, suffix: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}{suffix}", self.base))
    }

    /// Base path shared by every auxiliary file.
    #[must_use]
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    /// Whether `<base><suffix>` exists.
    #[must_use]
    pub fn exists(&self, suffix: &str) -> bool {
        self.path(suffix).is_file()
    }

    /// Re-sign `<base><suffix>`, record the new value and report whether it
    /// differs from the previous record.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergenceError::Io`] when the file exists but cannot be
    /// read.
    pub fn check(&mut self, suffix: &'static str) -> Result<bool, ConvergenceError> {
        let now = self.current(suffix)?;
        let previous = self.saved.get(suffix).cloned().flatten();
        if previous == now {
            debug!(file = %self.path(suffix), "auxiliary file unchanged");
            return Ok(false);
        }
        debug!(
            file = %self.path(suffix),
            signature = now.as_ref().map_or("<absent>", Signature::as_str),
            "auxiliary file changed"
        );
        self.saved.insert(suffix, now);
        Ok(true)
    }

    fn current(&self, suffix: &str) -> Result<Option<Signature>, ConvergenceError> {
        let path = self.path(suffix);
        file_signature(&path).map_err(|source| ConvergenceError::Io { path, source })
    }
}
