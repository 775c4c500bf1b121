//! TeX versus LaTeX detection.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::env::Environment;
use crate::node::{FileSystem, NodeError, NodeRef};
use crate::scanner::walk_includes;

static LATEX_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\\document(style|class)").ok());

/// Dialect a document is written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor {
    /// Plain TeX: built with one `tex`/`pdftex` run.
    Tex,
    /// LaTeX: built by the convergence driver.
    Latex,
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tex => "TeX",
            Self::Latex => "LaTeX",
        })
    }
}

/// Decide whether `source` is LaTeX.
///
/// A document is LaTeX when it, or any file it includes, declares a
/// `\documentclass` or `\documentstyle`. Included files are found by
/// [`walk_includes`].
///
/// # Errors
///
/// Returns [`NodeError`] when a file that exists cannot be read.
pub fn detect(source: &NodeRef, env: &Environment, fs: &FileSystem) -> Result<Flavor, NodeError> {
    let mut flavor = Flavor::Tex;
    walk_includes(source, env, fs, |file| {
        if LATEX_MARKER.as_ref().is_some_and(|re| re.is_match(file.text)) {
            debug!(source = source.name(), marker_in = file.node.name(), "LaTeX document");
            flavor = Flavor::Latex;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    })?;
    if flavor == Flavor::Tex {
        debug!(source = source.name(), "plain TeX document");
    }
    Ok(flavor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use std::fs;

    fn project() -> (tempfile::TempDir, FileSystem) {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
        (dir, FileSystem::new(root))
    }

    #[rstest]
    #[case("\\documentclass{article}\n\\begin{document}x\\end{document}", Flavor::Latex)]
    #[case("\\documentstyle{article}", Flavor::Latex)]
    #[case("Hello \\bye", Flavor::Tex)]
    fn detects_the_root_document(#[case] text: &str, #[case] expected: Flavor) {
        let (_dir, fs) = project();
        fs::write(fs.root().join("doc.tex"), text).expect("write");
        let flavor = detect(&fs.node("doc.tex"), &Environment::new(), &fs).expect("detect");
        assert_eq!(flavor, expected);
    }

    #[rstest]
    fn follows_inputs_to_find_the_preamble() {
        let (_dir, fs) = project();
        fs::create_dir_all(fs.root().join("inc")).expect("mkdir");
        fs::write(fs.root().join("inc/preamble.ltx"), "\\documentclass{book}").expect("write");
        fs::write(fs.root().join("doc.tex"), "\\input{preamble}\n").expect("write");
        let mut env = Environment::new();
        env.set("TEXINPUTS", fs.root().join("inc").as_str());
        let flavor = detect(&fs.node("doc.tex"), &env, &fs).expect("detect");
        assert_eq!(flavor, Flavor::Latex);
    }

    #[rstest]
    fn follows_every_input_on_a_line() {
        let (_dir, fs) = project();
        fs::write(fs.root().join("preamble.tex"), "\\documentclass{article}").expect("write");
        fs::write(fs.root().join("body.tex"), "Hello").expect("write");
        fs::write(fs.root().join("doc.tex"), "\\input{preamble}\\input{body}\n").expect("write");
        let flavor = detect(&fs.node("doc.tex"), &Environment::new(), &fs).expect("detect");
        assert_eq!(flavor, Flavor::Latex);
    }

    #[rstest]
    fn includes_prefer_the_tex_suffix_over_the_bare_name() {
        let (_dir, fs) = project();
        fs::write(fs.root().join("chap"), "Hello \\bye").expect("write");
        fs::write(fs.root().join("chap.tex"), "\\documentclass{book}").expect("write");
        fs::write(fs.root().join("doc.tex"), "\\input{chap}\n").expect("write");
        let flavor = detect(&fs.node("doc.tex"), &Environment::new(), &fs).expect("detect");
        assert_eq!(flavor, Flavor::Latex);
    }

    #[rstest]
    fn latin1_documents_are_detected() {
        let (_dir, fs) = project();
        fs::write(
            fs.root().join("doc.tex"),
            b"% caf\xe9\n\\input{intro}\n".as_slice(),
        )
        .expect("write");
        fs::write(fs.root().join("intro.tex"), "\\documentclass{article}").expect("write");
        let flavor = detect(&fs.node("doc.tex"), &Environment::new(), &fs).expect("detect");
        assert_eq!(flavor, Flavor::Latex);
    }

    #[rstest]
    fn self_inclusion_terminates() {
        let (_dir, fs) = project();
        fs::write(fs.root().join("doc.tex"), "\\input{doc}\n\\bye").expect("write");
        let flavor = detect(&fs.node("doc.tex"), &Environment::new(), &fs).expect("detect");
        assert_eq!(flavor, Flavor::Tex);
    }
}
