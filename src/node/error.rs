//! Errors raised while reading node contents.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

/// Failures reading a node's backing store.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    #[diagnostic(code(settle::node::read))]
    Read {
        /// Path that was being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A child of a virtual node failed to produce its signature.
    #[error("alias `{alias}` could not sign child `{child}`")]
    #[diagnostic(code(settle::node::alias_child))]
    AliasChild {
        /// Name of the alias being signed.
        alias: String,
        /// Name of the failing child.
        child: String,
        /// The child's own failure.
        #[source]
        source: Box<NodeError>,
    },
}
