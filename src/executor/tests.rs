//! Unit tests for executors and the batch executor registry.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::action::BuildError;
use crate::env::Value;
use crate::node::Node;
use crate::process::{MockProcessRunner, ProcessOutput};
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    fs: FileSystem,
}

impl Workspace {
    fn existing(&self, name: &str) -> NodeRef {
        let node = self.fs.node(name);
        fs::write(node.name(), name).expect("write file");
        node
    }
}

#[fixture]
fn ws() -> Workspace {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    Workspace {
        _dir: dir,
        fs: FileSystem::new(root),
    }
}

fn names(nodes: &[NodeRef]) -> Vec<String> {
    nodes
        .iter()
        .map(|n| Utf8PathBuf::from(n.name()).file_name().unwrap_or_default().to_owned())
        .collect()
}

fn succeed() -> MockProcessRunner {
    let mut runner = MockProcessRunner::new();
    runner.expect_run().returning(|_, _| {
        Ok(ProcessOutput {
            status: Some(0),
            ..ProcessOutput::default()
        })
    });
    runner
}

#[rstest]
fn empty_action_list_is_rejected() {
    let err = Executor::new(Vec::new(), Arc::default()).expect_err("no action");
    assert!(matches!(err, ExecutorError::NoAction));
}

#[rstest]
fn add_sources_deduplicates(ws: Workspace) {
    let a = ws.fs.node("a.c");
    let b = ws.fs.node("b.c");
    let c = ws.fs.node("c.c");
    let mut exec = Executor::new(vec![Action::noop()], Arc::default())
        .expect("executor")
        .with_batch(vec![ws.fs.node("prog")], vec![Arc::clone(&a)]);
    exec.add_sources(&[Arc::clone(&a), Arc::clone(&b)])
        .expect("add");
    exec.add_sources(&[b, c, a]).expect("add again");
    assert_eq!(names(&exec.all_sources()), ["a.c", "b.c", "c.c"]);
}

#[rstest]
#[case(0)]
#[case(2)]
fn add_sources_requires_a_single_batch(ws: Workspace, #[case] batches: usize) {
    let mut exec = Executor::new(vec![Action::noop()], Arc::default()).expect("executor");
    for i in 0..batches {
        exec.add_batch(vec![ws.fs.node(format!("t{i}"))], Vec::new());
    }
    let err = exec
        .add_sources(&[ws.fs.node("s.c")])
        .expect_err("precondition");
    assert!(matches!(err, ExecutorError::MultipleBatches { count } if count == batches));
}

#[rstest]
fn all_targets_and_sources_flatten_in_order(ws: Workspace) {
    let shared = ws.fs.node("common.h");
    let mut exec = Executor::new(vec![Action::noop()], Arc::default())
        .expect("executor")
        .with_batch(vec![ws.fs.node("a.o")], vec![ws.fs.node("a.c"), Arc::clone(&shared)]);
    exec.add_batch(vec![ws.fs.node("b.o")], vec![ws.fs.node("b.c"), shared]);
    assert_eq!(names(&exec.all_targets()), ["a.o", "b.o"]);
    assert_eq!(
        names(&exec.all_sources()),
        ["a.c", "common.h", "b.c", "common.h"]
    );
}

#[rstest]
fn prepare_reports_missing_source_without_running(ws: Workspace) {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let exec = Executor::new(
        vec![Action::callback("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ActionOutcome::ok())
        })],
        Arc::default(),
    )
    .expect("executor")
    .with_batch(
        vec![ws.fs.node("doc.pdf"), ws.fs.node("doc.log")],
        vec![ws.fs.node("doc.tex")],
    );
    let err = exec.prepare().expect_err("missing source");
    match err {
        ExecutorError::MissingSource {
            source_node,
            target,
        } => {
            assert!(source_node.ends_with("doc.tex"));
            assert!(target.ends_with("doc.pdf"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[rstest]
fn prepare_accepts_existing_sources(ws: Workspace) {
    let exec = Executor::new(vec![Action::noop()], Arc::default())
        .expect("executor")
        .with_batch(vec![ws.fs.node("doc.pdf")], vec![ws.existing("doc.tex")]);
    assert!(exec.prepare().is_ok());
}

#[rstest]
fn contents_are_memoised_until_cleanup(ws: Workspace) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let action = Action::callback_with_contents(
        "gen",
        |_| Ok(ActionOutcome::ok()),
        move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            "generated".to_owned()
        },
    );
    let mut exec = Executor::new(vec![action], Arc::default())
        .expect("executor")
        .with_batch(vec![ws.fs.node("out")], Vec::new());

    let first = exec.content_signature().expect("sign");
    let second = exec.content_signature().expect("sign");
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    exec.cleanup();
    assert_eq!(exec.content_signature().expect("sign"), first);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[rstest]
fn contents_follow_pre_main_post_order(ws: Workspace) {
    let mut exec = Executor::new(vec![Action::command("main")], Arc::default())
        .expect("executor")
        .with_batch(vec![ws.fs.node("out")], Vec::new());
    exec.add_pre_action(Action::command("pre"));
    exec.add_post_action(Action::command("post"));
    assert_eq!(exec.contents().expect("contents"), "premainpost");
    assert_eq!(exec.display(), "pre\nmain\npost");
}

#[rstest]
fn build_env_applies_overrides_in_order() {
    let mut base = Environment::new();
    base.set("CC", "cc");
    base.set("OPT", "-O0");
    let first: OverrideDict = [("CC".to_owned(), Value::from("gcc"))].into_iter().collect();
    let second: OverrideDict = [("CC".to_owned(), Value::from("clang"))].into_iter().collect();
    let exec = Executor::new(vec![Action::noop()], Arc::new(base))
        .expect("executor")
        .with_overrides(vec![first, second]);
    let env = exec.build_env();
    assert_eq!(env.get_str("CC").as_deref(), Some("clang"));
    assert_eq!(env.get_str("OPT").as_deref(), Some("-O0"));
    assert!(Arc::ptr_eq(&env, &exec.build_env()));
}

#[rstest]
fn run_executes_chain_in_order(ws: Workspace) {
    let mut runner = MockProcessRunner::new();
    let mut seq = mockall::Sequence::new();
    for expected in ["pre", "main", "post"] {
        runner
            .expect_run()
            .withf(move |command, _| command == expected)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|command, _| {
                Ok(ProcessOutput {
                    status: Some(0),
                    stdout: command.to_owned(),
                    stderr: String::new(),
                })
            });
    }
    let mut exec = Executor::new(vec![Action::command("main")], Arc::default())
        .expect("executor")
        .with_batch(vec![ws.fs.node("out")], Vec::new());
    exec.add_pre_action(Action::command("pre"));
    exec.add_post_action(Action::command("post"));
    let report = exec.run(&runner, RunOptions::default()).expect("run");
    assert_eq!(report.stdout(), "premainpost");
}

#[rstest]
fn failing_action_aborts_the_chain(ws: Workspace) {
    let mut runner = MockProcessRunner::new();
    runner.expect_run().times(1).returning(|_, _| {
        Ok(ProcessOutput {
            status: Some(2),
            stdout: String::new(),
            stderr: "no such file".to_owned(),
        })
    });
    let mut exec = Executor::new(vec![Action::command("compile")], Arc::default())
        .expect("executor")
        .with_batch(vec![ws.fs.node("prog")], Vec::new());
    exec.add_post_action(Action::command("strip"));
    let err = exec
        .run(&runner, RunOptions::default())
        .expect_err("failure");
    match err {
        ExecutorError::ActionFailed {
            action,
            target,
            status,
            stderr,
        } => {
            assert_eq!(action, "compile");
            assert!(target.ends_with("prog"));
            assert_eq!(status, Some(2));
            assert_eq!(stderr, "no such file");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
fn build_errors_keep_their_identity(ws: Workspace) {
    let exec = Executor::new(
        vec![Action::callback("check", |_| {
            Err(BuildError::new("invalid input").for_node("in.dat"))
        })],
        Arc::default(),
    )
    .expect("executor")
    .with_batch(vec![ws.fs.node("out.dat")], Vec::new());
    let err = exec
        .run(&succeed(), RunOptions::default())
        .expect_err("build error");
    match err {
        ExecutorError::Build {
            executor, source, ..
        } => {
            assert_eq!(source.node.as_deref(), Some("in.dat"));
            assert!(executor.starts_with("check("));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
fn unignored_sources_filter_by_batch_and_ignore_list(ws: Workspace) {
    let a_o = ws.fs.node("a.o");
    let skip = ws.fs.node("skip.h");
    let mut exec = Executor::new(vec![Action::noop()], Arc::default())
        .expect("executor")
        .with_batch(
            vec![Arc::clone(&a_o)],
            vec![ws.fs.node("a.c"), Arc::clone(&skip)],
        );
    exec.add_batch(vec![ws.fs.node("b.o")], vec![ws.fs.node("b.c")]);
    let kept = exec.unignored_sources(Some(&a_o), &[Arc::clone(&skip)]);
    assert_eq!(names(&kept), ["a.c"]);
    assert_eq!(names(&exec.unignored_sources(None, &[skip])), ["a.c", "b.c"]);
}

#[rstest]
fn children_and_side_effects_are_unique(ws: Workspace) {
    let target = ws.fs.file("doc.pdf");
    let aux = ws.fs.node("doc.aux");
    target.add_side_effects(&[Arc::clone(&aux), aux]);
    let target: NodeRef = target;
    target.add_to_implicit(&[ws.fs.node("intro.tex"), ws.fs.node("doc.tex")]);
    let exec = Executor::new(vec![Action::noop()], Arc::default())
        .expect("executor")
        .with_batch(vec![target], vec![ws.fs.node("doc.tex")]);
    assert_eq!(names(&exec.all_children()), ["doc.tex", "intro.tex"]);
    assert_eq!(names(&exec.action_side_effects()), ["doc.aux"]);
}

#[rstest]
fn registry_rejects_duplicate_keys(ws: Workspace) {
    let mut registry = BatchExecutorRegistry::new();
    let exec = Executor::new(vec![Action::noop()], Arc::default())
        .expect("executor")
        .with_batch(vec![ws.fs.node("a.o")], vec![ws.fs.node("a.c")]);
    let shared = registry.add("cc", exec).expect("register");
    let err = registry
        .add("cc", NullExecutor::default())
        .expect_err("duplicate");
    assert!(matches!(err, RegistryError::DuplicateKey { ref key } if key == "cc"));

    if let Some(real) = lock_slot(&shared).as_real_mut() {
        real.add_batch(vec![ws.fs.node("b.o")], vec![ws.fs.node("b.c")]);
    }
    let again = registry.get("cc").expect("registered");
    assert_eq!(lock_slot(&again).all_targets().len(), 2);
}
