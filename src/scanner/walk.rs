//! Recursive resolution of directives starting from one document.
//!
//! Traversal is a depth-first walk keyed on resolved node identity. A node
//! reached again while still on the walk stack closes a reference cycle,
//! which is reported rather than silently skipped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use camino::Utf8PathBuf;
use tracing::{debug, warn};

use super::{Directive, Keyword, LatexScanner, ScanError, ScanOutcome, Unresolved};
use crate::env::Environment;
use crate::node::{FileSystem, NodeRef};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

pub(super) struct Walk<'a> {
    scanner: &'a LatexScanner,
    env: &'a Environment,
    fs: &'a FileSystem,
    root: &'a NodeRef,
    search_root: Utf8PathBuf,
    states: HashMap<String, VisitState>,
    stack: Vec<String>,
    seen: HashSet<String>,
    found: Vec<(String, NodeRef)>,
    unresolved: Vec<Unresolved>,
}

impl<'a> Walk<'a> {
    pub(super) fn new(
        scanner: &'a LatexScanner,
        env: &'a Environment,
        fs: &'a FileSystem,
        root: &'a NodeRef,
    ) -> Self {
        Self {
            scanner,
            env,
            fs,
            root,
            search_root: root.directory(),
            states: HashMap::new(),
            stack: Vec::new(),
            seen: HashSet::from([root.name().to_owned()]),
            found: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    pub(super) fn run(mut self) -> Result<ScanOutcome, ScanError> {
        self.visit(Arc::clone(self.root))?;
        self.found
            .sort_by(|(ka, na), (kb, nb)| ka.cmp(kb).then_with(|| na.name().cmp(nb.name())));
        Ok(ScanOutcome {
            deps: self.found.into_iter().map(|(_, node)| node).collect(),
            unresolved: self.unresolved,
        })
    }

    fn visit(&mut self, node: NodeRef) -> Result<(), ScanError> {
        let name = node.name().to_owned();
        self.states.insert(name.clone(), VisitState::Visiting);
        self.stack.push(name.clone());

        let directives = self.scanner.directives(&node)?;
        for directive in directives.iter() {
            let Some(dep) = self.resolve(directive) else {
                self.report_unresolved(directive, &name);
                continue;
            };
            let dep_name = dep.name().to_owned();
            if self.seen.insert(dep_name.clone()) {
                self.found.push((directive.sort_key(), Arc::clone(&dep)));
            }
            if !directive.keyword.recurses() {
                continue;
            }
            match self.states.get(&dep_name).copied() {
                Some(VisitState::Visiting) => return Err(self.cycle_through(dep_name)),
                Some(VisitState::Visited) => {}
                None => self.visit(dep)?,
            }
        }

        self.stack.pop();
        self.states.insert(name, VisitState::Visited);
        Ok(())
    }

    fn resolve(&self, directive: &Directive) -> Option<NodeRef> {
        let dirs = self
            .env
            .search_path(directive.keyword.path_var())
            .ordered(&self.search_root);
        let names = directive
            .keyword
            .candidates(&directive.reference, self.scanner.graphics_extensions());
        for dir in &dirs {
            for candidate in &names {
                if let Some(found) = self.fs.find_in(dir, candidate) {
                    debug!(reference = %directive.reference, path = %dir.join(candidate), "resolved");
                    let node: NodeRef = found;
                    return Some(node);
                }
            }
        }
        None
    }

    fn report_unresolved(&mut self, directive: &Directive, included_from: &str) {
        if directive.keyword == Keyword::UsePackage {
            debug!(package = %directive.reference, "ignoring unresolved package");
            return;
        }
        let entry = Unresolved {
            keyword: directive.keyword,
            reference: directive.reference.clone(),
            included_from: included_from.to_owned(),
        };
        if self.unresolved.contains(&entry) {
            return;
        }
        warn!(
            reference = %entry.reference,
            included_from = %entry.included_from,
            "no dependency generated for file: not found"
        );
        self.unresolved.push(entry);
    }

    fn cycle_through(&self, node: String) -> ScanError {
        let idx = self
            .stack
            .iter()
            .position(|n| *n == node)
            .unwrap_or_else(|| {
                debug_assert!(false, "visiting node must be on the stack");
                0
            });
        let mut cycle: Vec<String> = self.stack.iter().skip(idx).cloned().collect();
        cycle.push(node);
        ScanError::ReferenceCycle {
            cycle: canonicalize_cycle(cycle),
        }
    }
}

/// Rotate a closed cycle so it starts (and ends) at its smallest member.
fn canonicalize_cycle(mut cycle: Vec<String>) -> Vec<String> {
    if cycle.len() < 2 {
        return cycle;
    }
    let len = cycle.len() - 1;
    let start = cycle
        .iter()
        .take(len)
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(idx, _)| idx);
    let (prefix, suffix) = cycle.split_at_mut(len);
    prefix.rotate_left(start);
    if let (Some(first), Some(slot)) = (prefix.first().cloned(), suffix.first_mut()) {
        slot.clone_from(&first);
    }
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[rstest]
    #[case(&["c", "a", "b", "c"], &["a", "b", "c", "a"])]
    #[case(&["c", "b", "a", "c"], &["a", "c", "b", "a"])]
    #[case(&["a", "a"], &["a", "a"])]
    fn cycles_start_at_smallest_member(#[case] input: &[&str], #[case] expected: &[&str]) {
        assert_eq!(canonicalize_cycle(owned(input)), owned(expected));
    }
}
