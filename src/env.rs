//! Construction environment.
//!
//! An [`Environment`] carries named construction variables (used when
//! substituting command templates and locating search paths) plus the process
//! environment handed to spawned tools. Override dictionaries derive new
//! environments without touching the base; later dictionaries win.
//!
//! ```
//! use settle::env::{Environment, OverrideDict, Value};
//!
//! let mut base = Environment::new();
//! base.set("LATEX", "latex");
//! let mut first = OverrideDict::new();
//! first.insert("LATEX".into(), Value::from("pdflatex"));
//! let mut second = OverrideDict::new();
//! second.insert("LATEX".into(), Value::from("lualatex"));
//! let derived = base.override_with(&[first, second]);
//! assert_eq!(derived.get_str("LATEX").as_deref(), Some("lualatex"));
//! assert_eq!(base.get_str("LATEX").as_deref(), Some("latex"));
//! ```

use std::env;
use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Override keys with this prefix target the process environment.
pub const PROCESS_ENV_PREFIX: &str = "ENV.";

/// A construction variable value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A scalar string, substituted verbatim.
    Str(String),
    /// A list of words, substituted space-separated.
    List(Vec<String>),
}

impl Value {
    /// Render the value for command substitution.
    #[must_use]
    pub fn to_subst_string(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::List(items) => items.join(" "),
        }
    }

    /// Interpret the value as a path list.
    ///
    /// Strings are split on the platform path separator; lists are taken
    /// element-wise. Empty entries are dropped.
    #[must_use]
    pub fn as_paths(&self) -> Vec<Utf8PathBuf> {
        match self {
            Self::Str(s) => split_path_list(s),
            Self::List(items) => items
                .iter()
                .filter(|item| !item.is_empty())
                .map(Utf8PathBuf::from)
                .collect(),
        }
    }

    /// Interpret the value as a list of words.
    #[must_use]
    pub fn as_words(&self) -> Vec<String> {
        match self {
            Self::Str(s) => s.split_whitespace().map(str::to_owned).collect(),
            Self::List(items) => items.clone(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// One layer of overrides applied on top of a base environment.
pub type OverrideDict = IndexMap<String, Value>;

/// Named construction variables and the process environment for tools.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    vars: IndexMap<String, Value>,
    process_env: IndexMap<String, String>,
}

impl Environment {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment seeded with the default TeX toolchain variables.
    #[must_use]
    pub fn with_tex_defaults() -> Self {
        let mut env = Self::new();
        crate::tex::defaults::apply(&mut env);
        env
    }

    /// Look up a construction variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Look up a construction variable rendered as a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.vars.get(key).map(Value::to_subst_string)
    }

    /// Parse a construction variable as an unsigned integer.
    #[must_use]
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_str(key).and_then(|s| s.trim().parse().ok())
    }

    /// Set a construction variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Set a variable only when it is not already defined.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Iterate over construction variables in insertion order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up an entry of the process environment handed to tools.
    #[must_use]
    pub fn process_var(&self, key: &str) -> Option<&str> {
        self.process_env.get(key).map(String::as_str)
    }

    /// Set an entry of the process environment handed to tools.
    pub fn set_process_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.process_env.insert(key.into(), value.into());
    }

    /// Iterate over process environment entries.
    pub fn process_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.process_env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Derive an environment by applying `dicts` in order.
    ///
    /// Keys prefixed with [`PROCESS_ENV_PREFIX`] update the process
    /// environment; every other key replaces a construction variable.
    #[must_use]
    pub fn override_with(&self, dicts: &[OverrideDict]) -> Self {
        let mut derived = self.clone();
        for dict in dicts {
            for (key, value) in dict {
                if let Some(name) = key.strip_prefix(PROCESS_ENV_PREFIX) {
                    derived.set_process_var(name, value.to_subst_string());
                } else {
                    derived.vars.insert(key.clone(), value.clone());
                }
            }
        }
        derived
    }

    /// Directories listed for `var`, construction variable first.
    ///
    /// The construction variable and the process environment entry of the
    /// same name are returned separately so callers can search them in order.
    #[must_use]
    pub fn search_path(&self, var: &str) -> SearchPath {
        SearchPath {
            from_vars: self.get(var).map(Value::as_paths).unwrap_or_default(),
            from_process: self
                .process_var(var)
                .map(split_path_list)
                .unwrap_or_default(),
        }
    }

    /// Prepend `dirs` to the process environment entry `var`.
    ///
    /// The result keeps a trailing separator so tools that honour empty
    /// entries still consult their built-in system paths.
    pub fn prepend_process_path(&mut self, var: &str, dirs: &[Utf8PathBuf]) {
        let mut entries: Vec<String> = dirs.iter().map(|d| d.as_str().to_owned()).collect();
        if let Some(existing) = self.process_var(var) {
            entries.extend(
                existing
                    .split(PATH_SEPARATOR)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_owned),
            );
        }
        let mut seen = std::collections::HashSet::new();
        entries.retain(|entry| seen.insert(entry.clone()));
        let mut joined = entries.join(&PATH_SEPARATOR.to_string());
        joined.push(PATH_SEPARATOR);
        self.set_process_var(var, joined);
    }

    /// Snapshot the calling process environment into `ENV` entries.
    #[must_use]
    pub fn inherit_process_env(mut self) -> Self {
        for (key, value) in env::vars_os() {
            if let (Some(k), Some(v)) = (os_to_string(key), os_to_string(value)) {
                self.process_env.entry(k).or_insert(v);
            }
        }
        self
    }
}

/// Ordered directory lists for one search variable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchPath {
    /// Directories from the construction variable.
    pub from_vars: Vec<Utf8PathBuf>,
    /// Directories from the process environment entry.
    pub from_process: Vec<Utf8PathBuf>,
}

impl SearchPath {
    /// Full search order: `first`, then construction-variable directories,
    /// then process-environment directories, without repeats.
    #[must_use]
    pub fn ordered(&self, first: &Utf8Path) -> Vec<Utf8PathBuf> {
        let mut out: Vec<Utf8PathBuf> = vec![first.to_path_buf()];
        for dir in self.from_vars.iter().chain(&self.from_process) {
            if !out.contains(dir) {
                out.push(dir.clone());
            }
        }
        out
    }
}

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

fn split_path_list(raw: &str) -> Vec<Utf8PathBuf> {
    raw.split(PATH_SEPARATOR)
        .filter(|entry| !entry.is_empty())
        .map(Utf8PathBuf::from)
        .collect()
}

fn os_to_string(value: OsString) -> Option<String> {
    value.into_string().ok()
}
