//! Unit tests for the runner module's path and settings helpers.

use super::*;
use clap::Parser;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::env::Value;

#[fixture]
fn workdir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    (dir, root)
}

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("parse")
}

#[rstest]
#[case("/work", "doc.tex", "/work/doc.tex")]
#[case("/work", "sub/doc.tex", "/work/sub/doc.tex")]
#[case("/work", "/tmp/doc.tex", "/tmp/doc.tex")]
fn paths_resolve_against_the_working_directory(
    #[case] dir: &str,
    #[case] input: &str,
    #[case] expected: &str,
) {
    let resolved = resolve_path(Utf8Path::new(dir), Path::new(input)).expect("resolve");
    assert_eq!(resolved, Utf8PathBuf::from(expected));
}

#[rstest]
#[case("/work/out/doc.pdf", "out/doc.pdf")]
#[case("/elsewhere/doc.pdf", "/elsewhere/doc.pdf")]
fn names_display_relative_to_the_working_directory(#[case] name: &str, #[case] expected: &str) {
    assert_eq!(relative_to(Utf8Path::new("/work"), name), expected);
}

#[rstest]
fn missing_default_settings_are_empty(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, root) = workdir;
    let cli = parse(&["settle", "scan", "doc.tex"]);
    assert!(load_settings(&cli, &root).expect("settings").is_empty());
}

#[rstest]
fn missing_explicit_settings_fail(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, root) = workdir;
    let cli = parse(&["settle", "-c", "missing.yml", "scan", "doc.tex"]);
    let err = load_settings(&cli, &root).expect_err("missing settings");
    assert!(matches!(
        err.downcast_ref::<RunnerError>(),
        Some(RunnerError::ConfigNotFound { .. })
    ));
}

#[rstest]
fn defines_override_the_settings_file(workdir: (TempDir, Utf8PathBuf)) {
    let (_guard, root) = workdir;
    fs::write(
        root.join(config::DEFAULT_FILE),
        "vars:\n  LATEX: lualatex\n  BIBTEX: biber\nenv:\n  TZ: UTC\n",
    )
    .expect("write settings");
    let cli = parse(&["settle", "-D", "LATEX=xelatex", "scan", "doc.tex"]);
    let env = load_environment(&cli, &root).expect("environment");
    assert_eq!(env.get("LATEX"), Some(&Value::from("xelatex")));
    assert_eq!(env.get("BIBTEX"), Some(&Value::from("biber")));
    assert_eq!(env.get("MAKEINDEX"), Some(&Value::from("makeindex")));
    assert_eq!(env.process_var("TZ"), Some("UTC"));
}
