//! Settings file and command-line defines.
//!
//! A settings file is YAML with two optional mappings:
//!
//! ```yaml
//! vars:
//!   LATEX: lualatex
//!   TEXINPUTS: [styles, figures]
//!   LATEXRETRIES: 5
//! env:
//!   SOURCE_DATE_EPOCH: 0
//! ```
//!
//! Both become one override dictionary; `env` entries are keyed with
//! [`PROCESS_ENV_PREFIX`]. `-D KEY=VALUE` defines form a later dictionary.

// The miette derive on `YamlDiagnostic` trips `unused_assignments` on some
// compiler versions; `#[expect]` would fail on the others.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::Deserialize;
use serde_json::Value as RawValue;
use serde_saphyr::Location;
use thiserror::Error;
use tracing::debug;

use crate::env::{OverrideDict, PROCESS_ENV_PREFIX, Value};

/// Default settings file name looked up in the working directory.
pub const DEFAULT_FILE: &str = "settle.yml";

/// Failures loading settings or parsing defines.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}")]
    #[diagnostic(code(settle::config::read))]
    Read {
        /// Settings file path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid YAML of the expected shape.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(Box<YamlDiagnostic>),

    /// A value is neither a scalar nor a list of scalars.
    #[error("`{key}` must be a string, number, boolean or list of those")]
    #[diagnostic(code(settle::config::value))]
    InvalidValue {
        /// Offending key.
        key: String,
    },

    /// A define is not of the form `KEY=VALUE`.
    #[error("invalid define `{raw}`: expected KEY=VALUE")]
    #[diagnostic(code(settle::config::define))]
    InvalidDefine {
        /// The define as given.
        raw: String,
    },
}

/// A YAML parse failure located in its source text.
#[derive(Debug, Error, Diagnostic)]
#[error("invalid settings in {name} at line {line}, column {column}: {message}")]
#[diagnostic(code(settle::config::parse))]
pub struct YamlDiagnostic {
    /// Name shown for the source.
    pub name: String,
    /// Line of the error, starting at one.
    pub line: u64,
    /// Column of the error, starting at one.
    pub column: u64,
    /// Parser message.
    pub message: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: Option<SourceSpan>,
    #[help]
    help: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    vars: IndexMap<String, RawValue>,
    #[serde(default)]
    env: IndexMap<String, RawValue>,
}

/// Values loaded from a settings file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    /// Construction variables.
    pub vars: IndexMap<String, Value>,
    /// Process environment entries for tools.
    pub env: IndexMap<String, String>,
}

impl Settings {
    /// Parse settings from `yaml`, naming the source `name` in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or unknown keys and
    /// [`ConfigError::InvalidValue`] for nested mappings.
    pub fn from_str_named(yaml: &str, name: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawSettings =
            serde_saphyr::from_str(yaml).map_err(|err| parse_error(&err, yaml, name))?;
        let mut settings = Self::default();
        for (key, value) in raw.vars {
            let value = convert(&key, value)?;
            settings.vars.insert(key, value);
        }
        for (key, value) in raw.env {
            let value = convert(&key, value)?.to_subst_string();
            settings.env.insert(key, value);
        }
        Ok(settings)
    }

    /// Load settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// see [`Self::from_str_named`].
    pub fn from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path, "loaded settings file");
        Self::from_str_named(&yaml, path.as_str())
    }

    /// Flatten into one override dictionary.
    #[must_use]
    pub fn into_override(self) -> OverrideDict {
        let mut dict: OverrideDict = self.vars;
        for (key, value) in self.env {
            dict.insert(format!("{PROCESS_ENV_PREFIX}{key}"), Value::Str(value));
        }
        dict
    }
}

/// Split a `KEY=VALUE` define. The value may be empty or contain `=`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDefine`] when there is no `=` or the key is
/// empty.
pub fn parse_define(raw: &str) -> Result<(String, Value), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), Value::from(value)))
        }
        _ => Err(ConfigError::InvalidDefine {
            raw: raw.to_owned(),
        }),
    }
}

fn convert(key: &str, value: RawValue) -> Result<Value, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_owned(),
    };
    match value {
        RawValue::Array(items) => items
            .into_iter()
            .map(|item| scalar(item).ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        other => scalar(other).map(Value::Str).ok_or_else(invalid),
    }
}

fn scalar(value: RawValue) -> Option<String> {
    match value {
        RawValue::String(s) => Some(s),
        RawValue::Number(n) => Some(n.to_string()),
        RawValue::Bool(b) => Some(b.to_string()),
        RawValue::Null | RawValue::Array(_) | RawValue::Object(_) => None,
    }
}

fn parse_error(err: &serde_saphyr::Error, yaml: &str, name: &str) -> ConfigError {
    let location = err.location();
    let (line, column) = location.map_or((1, 1), |loc| (loc.line(), loc.column()));
    let help = location
        .filter(|loc| has_tab_indent(yaml, *loc))
        .map(|_| "use spaces for indentation; tabs are invalid in YAML".to_owned());
    ConfigError::Parse(Box::new(YamlDiagnostic {
        name: name.to_owned(),
        line,
        column,
        message: err.to_string(),
        src: NamedSource::new(name, yaml.to_owned()),
        span: location.map(|loc| SourceSpan::from((byte_index(yaml, loc), 1))),
        help,
    }))
}

fn has_tab_indent(yaml: &str, loc: Location) -> bool {
    let line_idx = usize::try_from(loc.line().saturating_sub(1)).unwrap_or(usize::MAX);
    yaml.lines().nth(line_idx).is_some_and(|line| {
        line.chars()
            .take_while(|c| c.is_whitespace())
            .any(|c| c == '\t')
    })
}

/// Byte offset of a one-based line and column, clamped to the text.
fn byte_index(yaml: &str, loc: Location) -> usize {
    let target_line = usize::try_from(loc.line().saturating_sub(1)).unwrap_or(usize::MAX);
    let target_column = usize::try_from(loc.column().saturating_sub(1)).unwrap_or(usize::MAX);
    let mut offset = 0usize;
    for (idx, segment) in yaml.split_inclusive('\n').enumerate() {
        if idx == target_line {
            let line = segment.trim_end_matches(['\n', '\r']);
            return offset
                + line
                    .char_indices()
                    .nth(target_column)
                    .map_or(line.len(), |(byte, _)| byte);
        }
        offset += segment.len();
    }
    yaml.len().saturating_sub(1)
}
