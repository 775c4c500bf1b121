//! Markers in TeX logs and recorder files.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

fn compile(pattern: &str) -> Option<Regex> {
    let compiled = Regex::new(pattern).ok();
    debug_assert!(compiled.is_some(), "invalid log pattern: {pattern}");
    compiled
}

static RERUN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?m)(^LaTeX Warning:.*Rerun)|(^Package \w+ Warning:.*Rerun)")
});

static CITATIONS: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?m)^LaTeX Warning:.*\n.*Rerun to get citations correct"));

static UNDEFINED: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?m)(^LaTeX Warning:.*undefined references)|(^Package \w+ Warning:.*undefined citations)")
});

static RECORDED_AUX: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?m)^INPUT *(.*\.aux)\r?$"));

static RECORDED_OUTPUT: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?m)^OUTPUT *(.*?)\r?$"));

/// Why a log asks for another pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RerunReason {
    /// LaTeX or a package printed a generic rerun warning.
    RerunWarning,
    /// Citations may be wrong until the next pass.
    Citations,
    /// References or citations are still undefined.
    UndefinedReferences,
}

impl fmt::Display for RerunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RerunWarning => "rerun warning",
            Self::Citations => "citations may be wrong",
            Self::UndefinedReferences => "undefined references",
        })
    }
}

/// Every rerun marker present in `log`, in a fixed order.
#[must_use]
pub fn rerun_reasons(log: &str) -> Vec<RerunReason> {
    [
        (&RERUN, RerunReason::RerunWarning),
        (&CITATIONS, RerunReason::Citations),
        (&UNDEFINED, RerunReason::UndefinedReferences),
    ]
    .into_iter()
    .filter(|(re, _)| re.as_ref().is_some_and(|re| re.is_match(log)))
    .map(|(_, reason)| reason)
    .collect()
}

/// `.aux` files a recorder (`.fls`) file says were read.
#[must_use]
pub fn recorded_aux_files(fls: &str) -> Vec<String> {
    captures(&RECORDED_AUX, fls)
}

/// Files a recorder (`.fls`) file says were written.
#[must_use]
pub fn recorded_outputs(fls: &str) -> Vec<String> {
    captures(&RECORDED_OUTPUT, fls)
}

fn captures(re: &LazyLock<Option<Regex>>, text: &str) -> Vec<String> {
    let Some(re) = re.as_ref() else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for name in re
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
    {
        if !out.iter().any(|seen| seen == name) {
            out.push(name.to_owned());
        }
    }
    out
}
