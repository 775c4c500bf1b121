//! Walk over the TeX files a document pulls in with `\include` and `\input`.
//!
//! Side-effect emission and flavour detection both need every file of a
//! document, not its full dependency list. This walk follows only TeX
//! inclusions, visits each file once (so loops are harmless) and hands the
//! visitor each file's text together with its directives.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use camino::Utf8PathBuf;
use tracing::debug;

use super::DEFAULT_LATEX_SUFFIXES;
use super::directive::{Directive, Keyword, candidate_names, extract};
use crate::env::Environment;
use crate::node::{FileSystem, NodeError, NodeRef};

/// One file reached from the root document.
#[derive(Clone, Copy, Debug)]
pub struct IncludedFile<'a> {
    /// The file.
    pub node: &'a NodeRef,
    /// Its text, non-UTF-8 bytes replaced.
    pub text: &'a str,
    /// Directives in `text`, in source order.
    pub directives: &'a [Directive],
}

/// Visit `source` and every file it transitively includes, in inclusion
/// order, until `visit` breaks.
///
/// Included names resolve in the source directory and then along
/// `TEXINPUTS`, directory by directory, trying `.tex`, `.ltx` and `.latex`
/// before the bare name. Names that resolve nowhere are skipped.
///
/// # Errors
///
/// Returns [`NodeError`] when a file that exists cannot be read.
pub fn walk_includes<F>(
    source: &NodeRef,
    env: &Environment,
    fs: &FileSystem,
    mut visit: F,
) -> Result<(), NodeError>
where
    F: FnMut(IncludedFile<'_>) -> ControlFlow<()>,
{
    let dirs = env.search_path("TEXINPUTS").ordered(&source.directory());
    let mut seen = HashSet::new();
    let mut pending = vec![Arc::clone(source)];
    while let Some(node) = pending.pop() {
        if !seen.insert(node.name().to_owned()) || !node.exists() {
            continue;
        }
        let text = node.text_contents()?;
        let directives = extract(&text);
        let file = IncludedFile {
            node: &node,
            text: &text,
            directives: &directives,
        };
        if visit(file).is_break() {
            return Ok(());
        }
        // Reversed so the stack pops includes in source order.
        for directive in directives
            .iter()
            .rev()
            .filter(|d| matches!(d.keyword, Keyword::Include | Keyword::Input))
        {
            match resolve(fs, &dirs, &directive.reference) {
                Some(found) => pending.push(found),
                None => debug!(
                    reference = %directive.reference,
                    included_from = node.name(),
                    "included file not found"
                ),
            }
        }
    }
    Ok(())
}

fn resolve(fs: &FileSystem, dirs: &[Utf8PathBuf], reference: &str) -> Option<NodeRef> {
    let names = candidate_names(reference, DEFAULT_LATEX_SUFFIXES);
    dirs.iter()
        .find_map(|dir| names.iter().find_map(|name| fs.find_in(dir, name)))
        .map(|found| found as NodeRef)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    fn project() -> (tempfile::TempDir, FileSystem) {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
        (dir, FileSystem::new(root))
    }

    fn visited(source: &NodeRef, env: &Environment, fs: &FileSystem) -> Vec<String> {
        let mut names = Vec::new();
        walk_includes(source, env, fs, |file| {
            let name = camino::Utf8Path::new(file.node.name())
                .file_name()
                .unwrap_or_default();
            names.push(name.to_owned());
            ControlFlow::Continue(())
        })
        .expect("walk");
        names
    }

    #[rstest]
    fn visits_files_in_inclusion_order() {
        let (_dir, fs) = project();
        fs::write(fs.root().join("doc.tex"), "\\input{a}\\include{b}\n\\input{c}\n").expect("write");
        fs::write(fs.root().join("a.tex"), "\\input{a2}").expect("write");
        fs::write(fs.root().join("a2.tex"), "").expect("write");
        fs::write(fs.root().join("b.tex"), "").expect("write");
        fs::write(fs.root().join("c.ltx"), "").expect("write");
        assert_eq!(
            visited(&fs.node("doc.tex"), &Environment::new(), &fs),
            ["doc.tex", "a.tex", "a2.tex", "b.tex", "c.ltx"]
        );
    }

    #[rstest]
    fn inferred_suffix_wins_over_the_bare_name() {
        let (_dir, fs) = project();
        fs::write(fs.root().join("doc.tex"), "\\input{chap}").expect("write");
        fs::write(fs.root().join("chap"), "").expect("write");
        fs::write(fs.root().join("chap.tex"), "").expect("write");
        assert_eq!(
            visited(&fs.node("doc.tex"), &Environment::new(), &fs),
            ["doc.tex", "chap.tex"]
        );
    }

    #[rstest]
    fn mutual_inclusion_visits_each_file_once() {
        let (_dir, fs) = project();
        fs::write(fs.root().join("a.tex"), "\\input{b}").expect("write");
        fs::write(fs.root().join("b.tex"), "\\input{a}").expect("write");
        assert_eq!(
            visited(&fs.node("a.tex"), &Environment::new(), &fs),
            ["a.tex", "b.tex"]
        );
    }

    #[rstest]
    fn non_utf8_files_are_still_walked() {
        let (_dir, fs) = project();
        fs::write(
            fs.root().join("doc.tex"),
            b"% r\xe9sum\xe9\n\\input{intro}\n".as_slice(),
        )
        .expect("write");
        fs::write(fs.root().join("intro.tex"), "").expect("write");
        assert_eq!(
            visited(&fs.node("doc.tex"), &Environment::new(), &fs),
            ["doc.tex", "intro.tex"]
        );
    }

    #[rstest]
    fn breaking_stops_the_walk() {
        let (_dir, fs) = project();
        fs::write(fs.root().join("doc.tex"), "\\input{a}").expect("write");
        fs::write(fs.root().join("a.tex"), "").expect("write");
        let mut count = 0;
        walk_includes(&fs.node("doc.tex"), &Environment::new(), &fs, |_| {
            count += 1;
            ControlFlow::Break(())
        })
        .expect("walk");
        assert_eq!(count, 1);
    }
}
