//! Temporary document projects.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use settle::node::{FileSystem, Node, NodeRef};
use std::fs;
use tempfile::TempDir;

/// A temporary directory with a node table rooted in it.
#[derive(Debug)]
pub struct Project {
    _dir: TempDir,
    fs: FileSystem,
}

impl Project {
    /// Create an empty project.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create project dir")?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|path| anyhow::anyhow!("non-UTF-8 temp dir {}", path.display()))?;
        Ok(Self {
            _dir: dir,
            fs: FileSystem::new(root),
        })
    }

    /// Project root directory.
    pub fn root(&self) -> &Utf8Path {
        self.fs.root()
    }

    /// Node table rooted at the project directory.
    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    /// Absolute path of `name`.
    pub fn path(&self, name: &str) -> Utf8PathBuf {
        self.root().join(name)
    }

    /// Write `contents` to `name`, creating parent directories, and return
    /// its node.
    pub fn write(&self, name: &str, contents: &str) -> Result<NodeRef> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {parent}"))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {path}"))?;
        Ok(self.fs.node(name))
    }

    /// Read `name` as text.
    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        fs::read_to_string(&path).with_context(|| format!("read {path}"))
    }

    /// Names relative to the project root, for readable assertions.
    pub fn relative(&self, nodes: &[NodeRef]) -> Vec<String> {
        nodes
            .iter()
            .map(|node| {
                Utf8Path::new(node.name())
                    .strip_prefix(self.root())
                    .map_or_else(|_| node.name().to_owned(), |rel| rel.as_str().to_owned())
            })
            .collect()
    }
}
