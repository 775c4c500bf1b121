//! Side effects of a LaTeX build.
//!
//! LaTeX writes many files next to its output. They are registered as side
//! effects of the target so a scheduler neither builds them separately nor
//! runs two builds writing the same file at once.

use std::fs;
use std::io;
use std::ops::ControlFlow;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::features::Features;
use super::log::recorded_outputs;
use crate::env::Environment;
use crate::node::{FileNode, FileSystem, Node, NodeError, NodeRef, unique_nodes};
use crate::scanner::{Keyword, walk_includes};

/// Files every LaTeX run writes.
const ALWAYS: &[&str] = &[".aux", ".log", ".fls"];

/// Register the side effects of building `target` from `source`.
///
/// Returns the registered nodes in a stable order: the fixed files first,
/// then feature-dependent files, chapter `.aux` files, and finally outputs
/// listed by an existing recorder file.
///
/// # Errors
///
/// Returns [`NodeError`] when the source or an included file cannot be read.
pub fn emit_side_effects(
    target: &FileNode,
    source: &NodeRef,
    env: &Environment,
    fs: &FileSystem,
) -> Result<Vec<NodeRef>, NodeError> {
    let target_dir = target.directory();
    let stem = Utf8Path::new(source.name()).file_stem().unwrap_or_default();
    let base = target_dir.join(stem);
    let with_suffix = |suffix: &str| Utf8PathBuf::from(format!("{base}{suffix}"));

    let scanned = scan_sources(source, env, fs)?;
    let mut paths: Vec<Utf8PathBuf> = ALWAYS.iter().map(|suffix| with_suffix(suffix)).collect();
    paths.extend(scanned.features.suffixes().into_iter().map(with_suffix));
    paths.extend(
        scanned
            .chapters
            .iter()
            .map(|chapter| target_dir.join(format!("{chapter}.aux"))),
    );

    let fls = with_suffix(".fls");
    let own: Vec<Utf8PathBuf> = [".aux", ".log", ".fls", ".dvi", ".pdf"]
        .iter()
        .map(|suffix| with_suffix(suffix))
        .collect();
    for output in recorder_outputs(&fls)? {
        let path = if output.is_absolute() {
            output
        } else {
            target_dir.join(output)
        };
        let path = fs.normalise(&path);
        if !own.contains(&path) {
            paths.push(path);
        }
    }

    let nodes: Vec<NodeRef> = paths.iter().map(|path| fs.node(path)).collect();
    let nodes = unique_nodes(&nodes);
    debug!(target = target.name(), count = nodes.len(), "registering side effects");
    target.add_side_effects(&nodes);
    Ok(nodes)
}

struct Scanned {
    features: Features,
    chapters: Vec<String>,
}

/// Detect features across the source and every file it includes.
fn scan_sources(source: &NodeRef, env: &Environment, fs: &FileSystem) -> Result<Scanned, NodeError> {
    let mut scanned = Scanned {
        features: Features::default(),
        chapters: Vec::new(),
    };
    walk_includes(source, env, fs, |file| {
        scanned.features = scanned.features.union(Features::detect(file.text));
        for directive in file.directives {
            if directive.keyword == Keyword::Include
                && !scanned.chapters.contains(&directive.reference)
            {
                scanned.chapters.push(directive.reference.clone());
            }
        }
        ControlFlow::Continue(())
    })?;
    Ok(scanned)
}

fn recorder_outputs(fls: &Utf8Path) -> Result<Vec<Utf8PathBuf>, NodeError> {
    match fs::read(fls) {
        Ok(bytes) => Ok(recorded_outputs(&String::from_utf8_lossy(&bytes))
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(NodeError::Read {
            path: fls.to_path_buf(),
            source,
        }),
    }
}
