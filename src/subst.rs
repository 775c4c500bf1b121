//! Command template substitution.
//!
//! Templates reference construction variables as `$NAME` or `${NAME}` and
//! the batch being built as `$TARGET`, `$TARGETS`, `$SOURCE` and `$SOURCES`.
//! Node references accept an attribute selecting part of the path:
//! `${TARGET.dir}`, `${SOURCE.file}`, `${SOURCE.filebase}`,
//! `${SOURCE.suffix}`, `${TARGET.base}` and `${TARGET.abspath}`. Node paths
//! are shell-quoted; variable values are inserted verbatim and expanded
//! recursively. `$$` produces a literal dollar sign.
//!
//! The expanded command is validated with `shlex` before it is returned so
//! malformed quoting is caught before a shell ever sees it.

use std::iter::Peekable;
use std::str::Chars;

use camino::Utf8Path;
use miette::Diagnostic;
use shell_quote::{QuoteRefExt, Sh};
use thiserror::Error;

use crate::env::Environment;
use crate::node::NodeRef;

/// Nesting limit for variables whose values reference other variables.
pub const MAX_DEPTH: usize = 16;

/// Failures expanding a command template.
#[derive(Debug, Error, Diagnostic)]
pub enum SubstError {
    /// A `${` was never closed.
    #[error("unterminated `${{` in `{template}`")]
    #[diagnostic(code(settle::subst::unterminated))]
    Unterminated {
        /// Template containing the unterminated reference.
        template: String,
    },

    /// Variable expansion nested deeper than [`MAX_DEPTH`].
    #[error("variable `{name}` expands recursively beyond {MAX_DEPTH} levels")]
    #[diagnostic(
        code(settle::subst::recursion),
        help("check for a variable that references itself")
    )]
    Recursion {
        /// Variable being expanded when the limit was hit.
        name: String,
    },

    /// A node reference used an attribute that does not exist.
    #[error("unknown attribute `{attribute}` on `{name}`")]
    #[diagnostic(
        code(settle::subst::attribute),
        help("use one of dir, file, filebase, suffix, base, abspath")
    )]
    UnknownAttribute {
        /// Node reference name (`TARGET`, `SOURCES`, ...).
        name: String,
        /// Offending attribute.
        attribute: String,
    },

    /// The expanded command is not valid shell syntax.
    #[error("expanded command is not valid shell syntax: {snippet}")]
    #[diagnostic(code(settle::subst::invalid_command))]
    InvalidCommand {
        /// Full expanded command.
        command: String,
        /// Leading portion shown in the message.
        snippet: String,
    },
}

/// Nodes and environment a template is expanded against.
#[derive(Clone, Copy, Debug)]
pub struct SubstContext<'a> {
    /// Construction variables.
    pub env: &'a Environment,
    /// Targets of the batch being built.
    pub targets: &'a [NodeRef],
    /// Sources of the batch being built.
    pub sources: &'a [NodeRef],
}

impl<'a> SubstContext<'a> {
    /// Bundle the inputs of a substitution.
    #[must_use]
    pub const fn new(env: &'a Environment, targets: &'a [NodeRef], sources: &'a [NodeRef]) -> Self {
        Self {
            env,
            targets,
            sources,
        }
    }
}

/// Expand `template` into a shell command line.
///
/// # Errors
///
/// Returns [`SubstError`] when a reference is malformed or the result does
/// not parse as shell words.
///
/// # Examples
/// ```
/// use settle::env::Environment;
/// use settle::subst::{SubstContext, substitute};
///
/// let mut env = Environment::new();
/// env.set("CC", "cc");
/// env.set("CCCOM", "$CC -c $${HOME}");
/// let cmd = substitute("$CCCOM", SubstContext::new(&env, &[], &[])).unwrap();
/// assert_eq!(cmd, "cc -c ${HOME}");
/// ```
pub fn substitute(template: &str, ctx: SubstContext<'_>) -> Result<String, SubstError> {
    let expanded = squeeze_whitespace(&expand(template, ctx, 0)?);
    if has_unmatched_backticks(&expanded) || shlex::split(&expanded).is_none() {
        let snippet = expanded.chars().take(160).collect();
        return Err(SubstError::InvalidCommand {
            command: expanded,
            snippet,
        });
    }
    Ok(expanded)
}

fn expand(template: &str, ctx: SubstContext<'_>, depth: usize) -> Result<String, SubstError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let reference = take_braced(&mut chars).ok_or_else(|| SubstError::Unterminated {
                    template: template.to_owned(),
                })?;
                out.push_str(&resolve(reference.trim(), ctx, depth)?);
            }
            Some(c) if is_identifier_start(c) => {
                let name = take_identifier(&mut chars);
                out.push_str(&resolve(&name, ctx, depth)?);
            }
            _ => out.push('$'),
        }
    }
    Ok(out)
}

fn take_braced(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut reference = String::new();
    for ch in chars.by_ref() {
        if ch == '}' {
            return Some(reference);
        }
        reference.push(ch);
    }
    None
}

fn take_identifier(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if !is_identifier_char(c) {
            break;
        }
        name.push(c);
        chars.next();
    }
    name
}

fn resolve(reference: &str, ctx: SubstContext<'_>, depth: usize) -> Result<String, SubstError> {
    let (name, attribute) = match reference.split_once('.') {
        Some((name, attribute)) => (name, Some(attribute)),
        None => (reference, None),
    };
    let nodes = match name {
        "TARGET" => ctx.targets.first().map_or(&[][..], std::slice::from_ref),
        "TARGETS" => ctx.targets,
        "SOURCE" => ctx.sources.first().map_or(&[][..], std::slice::from_ref),
        "SOURCES" => ctx.sources,
        _ => return resolve_variable(name, ctx, depth),
    };
    let mut words = Vec::with_capacity(nodes.len());
    for node in nodes {
        let part = node_attribute(node, name, attribute)?;
        words.push(quote(&part));
    }
    Ok(words.join(" "))
}

fn resolve_variable(name: &str, ctx: SubstContext<'_>, depth: usize) -> Result<String, SubstError> {
    let Some(value) = ctx.env.get(name) else {
        return Ok(String::new());
    };
    if depth >= MAX_DEPTH {
        return Err(SubstError::Recursion {
            name: name.to_owned(),
        });
    }
    expand(&value.to_subst_string(), ctx, depth + 1)
}

fn node_attribute(node: &NodeRef, name: &str, attribute: Option<&str>) -> Result<String, SubstError> {
    let full = Utf8Path::new(node.name());
    let text = match attribute {
        None | Some("abspath" | "path") => full.as_str().to_owned(),
        Some("dir") => node.directory().into_string(),
        Some("file") => full.file_name().unwrap_or_default().to_owned(),
        Some("filebase") => full.file_stem().unwrap_or_default().to_owned(),
        Some("suffix") => full
            .extension()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default(),
        Some("base") => full.with_extension("").into_string(),
        Some(other) => {
            return Err(SubstError::UnknownAttribute {
                name: name.to_owned(),
                attribute: other.to_owned(),
            });
        }
    };
    Ok(text)
}

fn quote(text: &str) -> String {
    let bytes: Vec<u8> = text.quoted(Sh);
    match String::from_utf8(bytes) {
        Ok(quoted) => quoted,
        Err(err) => {
            debug_assert!(false, "shell quoting produced non UTF-8 bytes: {err}");
            String::from_utf8_lossy(&err.into_bytes()).into_owned()
        }
    }
}

/// Collapse runs of blanks outside quotes so empty variables leave no gaps.
fn squeeze_whitespace(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut blank = false;
    for ch in line.trim().chars() {
        let unquoted_blank = quote.is_none() && !escaped && matches!(ch, ' ' | '\t');
        if unquoted_blank {
            if !blank {
                out.push(' ');
            }
            blank = true;
            continue;
        }
        blank = false;
        if escaped {
            escaped = false;
        } else {
            match (quote, ch) {
                (Some('\''), '\'') | (Some('"'), '"') => quote = None,
                (Some('"') | None, '\\') => escaped = true,
                (None, '\'' | '"') => quote = Some(ch),
                _ => {}
            }
        }
        out.push(ch);
    }
    out
}

fn has_unmatched_backticks(s: &str) -> bool {
    s.chars().filter(|&c| c == '`').count().rem_euclid(2) != 0
}

const fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

const fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FileSystem;
    use rstest::{fixture, rstest};

    #[fixture]
    fn fs() -> FileSystem {
        FileSystem::new("/work")
    }

    #[fixture]
    fn env() -> Environment {
        let mut env = Environment::new();
        env.set("LATEX", "latex");
        env.set("LATEXFLAGS", vec!["-interaction=nonstopmode".to_owned(), "-recorder".to_owned()]);
        env.set(
            "LATEXCOM",
            "cd ${TARGET.dir} && $LATEX $LATEXFLAGS ${SOURCE.file}",
        );
        env
    }

    #[rstest]
    fn expands_nested_variables_and_node_attributes(fs: FileSystem, env: Environment) {
        let targets = [fs.node("out/doc.dvi")];
        let sources = [fs.node("doc.tex")];
        let cmd = substitute("$LATEXCOM", SubstContext::new(&env, &targets, &sources))
            .expect("substitute");
        assert_eq!(
            cmd,
            "cd /work/out && latex -interaction=nonstopmode -recorder doc.tex"
        );
    }

    #[rstest]
    #[case("${SOURCE.filebase}.aux", "doc.aux")]
    #[case("${SOURCE.suffix}", ".tex")]
    #[case("${SOURCE.base}", "/work/doc")]
    #[case("$SOURCES", "/work/doc.tex /work/refs.bib")]
    #[case("cost: $$5", "cost: $5")]
    #[case("[$UNDEFINED]", "[]")]
    #[case("a $UNDEFINED  b 'c  d'", "a b 'c  d'")]
    fn expands_references(fs: FileSystem, #[case] template: &str, #[case] expected: &str) {
        let env = Environment::new();
        let sources = [fs.node("doc.tex"), fs.node("refs.bib")];
        let cmd = substitute(template, SubstContext::new(&env, &[], &sources)).expect("substitute");
        assert_eq!(cmd, expected);
    }

    #[rstest]
    fn quotes_paths_with_spaces() {
        let fs = FileSystem::new("/my work");
        let env = Environment::new();
        let sources = [fs.node("doc.tex")];
        let cmd = substitute("latex $SOURCE", SubstContext::new(&env, &[], &sources))
            .expect("substitute");
        let words = shlex::split(&cmd).expect("valid shell words");
        assert_eq!(words, ["latex", "/my work/doc.tex"]);
    }

    #[rstest]
    fn self_reference_is_reported() {
        let mut env = Environment::new();
        env.set("LOOP", "x $LOOP");
        let err = substitute("$LOOP", SubstContext::new(&env, &[], &[])).expect_err("recursion");
        assert!(matches!(err, SubstError::Recursion { ref name } if name == "LOOP"));
    }

    #[rstest]
    #[case("${TARGET", "unterminated")]
    #[case("echo 'oops", "invalid")]
    #[case("echo `date", "invalid")]
    fn malformed_templates_fail(#[case] template: &str, #[case] kind: &str) {
        let env = Environment::new();
        let err = substitute(template, SubstContext::new(&env, &[], &[])).expect_err("malformed");
        match kind {
            "unterminated" => assert!(matches!(err, SubstError::Unterminated { .. })),
            _ => assert!(matches!(err, SubstError::InvalidCommand { .. })),
        }
    }

    #[rstest]
    fn unknown_attribute_fails(fs: FileSystem) {
        let env = Environment::new();
        let targets = [fs.node("doc.pdf")];
        let err = substitute("${TARGET.colour}", SubstContext::new(&env, &targets, &[]))
            .expect_err("attribute");
        assert!(matches!(err, SubstError::UnknownAttribute { .. }));
    }
}
