//! Unit tests for the LaTeX dependency scanner.

use std::fs;

use super::*;
use crate::node::Node;
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Project {
    _dir: TempDir,
    fs: FileSystem,
}

impl Project {
    fn write(&self, name: &str, contents: &str) -> NodeRef {
        let path = self.fs.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
        self.fs.node(name)
    }

    fn relative(&self, nodes: &[NodeRef]) -> Vec<String> {
        nodes
            .iter()
            .map(|node| {
                Utf8PathBuf::from(node.name())
                    .strip_prefix(self.fs.root())
                    .map(|p| p.as_str().to_owned())
                    .unwrap_or_else(|_| node.name().to_owned())
            })
            .collect()
    }
}

#[fixture]
fn project() -> Project {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    Project {
        _dir: dir,
        fs: FileSystem::new(root),
    }
}

#[rstest]
fn inferred_extension_wins_over_literal_name(project: Project) {
    project.write("chap", "literal");
    project.write("chap.tex", "inferred");
    let doc = project.write("doc.tex", "\\include{chap}");
    let out = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect("scan");
    assert_eq!(project.relative(&out.deps), ["chap.tex"]);
}

#[rstest]
fn literal_name_is_the_fallback(project: Project) {
    project.write("chap", "literal");
    let doc = project.write("doc.tex", "\\input{chap}");
    let out = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect("scan");
    assert_eq!(project.relative(&out.deps), ["chap"]);
}

#[rstest]
fn explicit_extension_is_respected(project: Project) {
    project.write("refs.bib", "@book{}");
    project.write("refs.bib.bib", "@book{}");
    let doc = project.write("doc.tex", "\\bibliography{refs.bib}");
    let out = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect("scan");
    assert_eq!(project.relative(&out.deps), ["refs.bib"]);
}

#[rstest]
fn results_are_sorted_by_normalised_reference(project: Project) {
    project.write("zeta.tex", "");
    project.write("Alpha.tex", "");
    project.write("mid.bib", "");
    project.write("fig.eps", "");
    let doc = project.write(
        "doc.tex",
        "\\input{zeta}\n\\bibliography{mid}\n\\includegraphics{fig}\n\\input{Alpha}\n",
    );
    let scanner = LatexScanner::dvi();
    let env = Environment::new();
    let first = scanner.scan(&doc, &env, &project.fs).expect("scan");
    let second = scanner.scan(&doc, &env, &project.fs).expect("rescan");
    let expected = ["Alpha.tex", "fig.eps", "mid.bib", "zeta.tex"];
    assert_eq!(project.relative(&first.deps), expected);
    assert_eq!(project.relative(&second.deps), expected);
}

#[rstest]
fn graphics_extensions_follow_the_variant(project: Project) {
    project.write("plot.eps", "");
    project.write("plot.png", "");
    let doc = project.write("doc.tex", "\\includegraphics[width=3in]{plot}");
    let env = Environment::new();
    let dvi = LatexScanner::dvi().scan(&doc, &env, &project.fs).expect("scan");
    let pdf = LatexScanner::pdf().scan(&doc, &env, &project.fs).expect("scan");
    assert_eq!(project.relative(&dvi.deps), ["plot.eps"]);
    assert_eq!(project.relative(&pdf.deps), ["plot.png"]);
}

#[rstest]
fn included_files_are_scanned_recursively(project: Project) {
    project.write("chapters/one.tex", "\\input{chapters/two}");
    project.write("chapters/two.tex", "\\lstinputlisting{code/main.rs}");
    project.write("code/main.rs", "fn main() {}");
    let doc = project.write("doc.tex", "\\include{chapters/one}");
    let out = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect("scan");
    assert_eq!(
        project.relative(&out.deps),
        ["chapters/one.tex", "chapters/two.tex", "code/main.rs"]
    );
}

#[rstest]
fn search_paths_come_from_vars_then_process_env(project: Project) {
    project.write("vars/shared.tex", "");
    project.write("process/shared.tex", "");
    project.write("process/only.bib", "");
    let doc = project.write("doc.tex", "\\input{shared}\\bibliography{only}");
    let mut env = Environment::new();
    env.set("TEXINPUTS", vec![project.fs.root().join("vars").into_string()]);
    env.set_process_var("TEXINPUTS", project.fs.root().join("process").as_str());
    env.set_process_var("BIBINPUTS", project.fs.root().join("process").as_str());
    let out = LatexScanner::dvi().scan(&doc, &env, &project.fs).expect("scan");
    assert_eq!(
        project.relative(&out.deps),
        ["process/only.bib", "vars/shared.tex"]
    );
}

#[rstest]
fn unresolved_references_are_reported_but_packages_are_not(project: Project) {
    let doc = project.write("doc.tex", "\\usepackage{amsmath}\n\\input{missing}\n\\input{missing}");
    let out = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect("scan");
    assert!(out.deps.is_empty());
    assert_eq!(out.unresolved.len(), 1);
    let entry = out.unresolved.first().expect("entry");
    assert_eq!(entry.keyword, Keyword::Input);
    assert_eq!(entry.reference, "missing");
    assert_eq!(entry.included_from, doc.name());
}

#[rstest]
fn include_cycles_are_errors(project: Project) {
    project.write("a.tex", "\\input{b}");
    project.write("b.tex", "\\input{a}");
    let doc = project.write("doc.tex", "\\input{a}");
    let err = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect_err("cycle");
    let cycle = match err {
        ScanError::ReferenceCycle { cycle } => cycle,
        other => panic!("expected a reference cycle, got {other}"),
    };
    let names: Vec<&str> = cycle
        .iter()
        .map(|p| p.rsplit('/').next().unwrap_or(p))
        .collect();
    assert_eq!(names, ["a.tex", "b.tex", "a.tex"]);
}

#[rstest]
fn repeated_references_are_not_cycles(project: Project) {
    project.write("macros.tex", "");
    project.write("one.tex", "\\input{macros}");
    let doc = project.write("doc.tex", "\\input{macros}\\input{one}\\input{macros}");
    let out = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect("scan");
    assert_eq!(project.relative(&out.deps), ["macros.tex", "one.tex"]);
}

#[rstest]
fn edited_files_miss_the_cache(project: Project) {
    project.write("a.tex", "");
    project.write("b.tex", "");
    let doc = project.write("doc.tex", "\\input{a}");
    let scanner = LatexScanner::dvi();
    let env = Environment::new();
    scanner.scan(&doc, &env, &project.fs).expect("scan");
    let cached = scanner.cache().len();
    scanner.scan(&doc, &env, &project.fs).expect("rescan");
    assert_eq!(scanner.cache().len(), cached);

    fs::write(doc.name(), "\\input{b}").expect("edit");
    doc.clear_memoized();
    let out = scanner.scan(&doc, &env, &project.fs).expect("scan edited");
    assert_eq!(project.relative(&out.deps), ["b.tex"]);
}

#[rstest]
fn missing_documents_have_no_dependencies(project: Project) {
    let doc = project.fs.node("absent.tex");
    let out = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect("scan");
    assert!(out.deps.is_empty());
}

#[rstest]
#[case("doc.tex", None, true)]
#[case("doc.ltx", None, true)]
#[case("fig.eps", None, false)]
#[case("doc.ltx", Some(".tex"), false)]
#[case("doc.sty", Some(".tex .sty"), true)]
fn selection_follows_latex_suffixes(
    #[case] name: &str,
    #[case] suffixes: Option<&str>,
    #[case] selected: bool,
) {
    let fs = FileSystem::new("/work");
    let mut env = Environment::new();
    if let Some(list) = suffixes {
        env.set("LATEXSUFFIXES", list);
    }
    let selector = SuffixSelector::latex(false);
    assert_eq!(selector.scanner_for(&fs.node(name), &env).is_some(), selected);
}

#[rstest]
fn latin1_sources_keep_their_directives(project: Project) {
    project.write("intro.tex", "Intro");
    let path = project.fs.root().join("doc.tex");
    fs::write(&path, b"\\documentclass{article}\n% r\xe9sum\xe9\n\\input{intro}\n".as_slice())
        .expect("write latin-1 source");
    let doc = project.fs.node("doc.tex");
    let out = LatexScanner::dvi()
        .scan(&doc, &Environment::new(), &project.fs)
        .expect("scan");
    assert_eq!(project.relative(&out.deps), ["intro.tex"]);
    assert!(out.unresolved.is_empty());
}
