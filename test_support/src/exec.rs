//! Helpers for creating executable stubs in tests.
//!
//! These utilities write tiny shell scripts and mark them executable so
//! tests can drive the real shell runner without depending on a TeX
//! installation. Callers own the containing directory's lifetime to keep the
//! stub on disk.
//!
//! # Examples
//!
//! ```rust
//! use camino::Utf8Path;
//! use tempfile::TempDir;
//! use test_support::write_exec;
//!
//! let temp = TempDir::new().expect("tempdir");
//! let root = Utf8Path::from_path(temp.path()).expect("utf8 path");
//! let path = write_exec(root, "tool", "exit 0").expect("stub executable");
//! assert!(path.exists());
//! ```

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Write an executable shell script named `name` inside `root`.
pub fn write_exec(root: &Utf8Path, name: &str, body: &str) -> Result<Utf8PathBuf> {
    let path = root.join(name);
    fs::write(path.as_std_path(), format!("#!/bin/sh\n{body}\n"))
        .with_context(|| format!("write exec stub {name}"))?;
    make_executable(&path)?;
    Ok(path)
}

/// Mark an existing file as executable on Unix; no-op elsewhere.
pub fn make_executable(path: &Utf8Path) -> Result<()> {
    #[cfg(unix)]
    {
        let mut perms = fs::metadata(path.as_std_path())
            .context("stat exec stub")?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path.as_std_path(), perms).context("chmod exec stub")?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

/// Write a stand-in for `latex` that behaves like one quiet pass.
///
/// The stub writes `<stem>.aux`, `<stem>.log` and `<stem>.dvi` in the
/// current directory for its last argument, and appends a line to
/// `passes.txt` so tests can count invocations.
pub fn fake_latex(root: &Utf8Path) -> Result<Utf8PathBuf> {
    write_exec(
        root,
        "fake-latex",
        r#"for last; do :; done
base="${last%.*}"
echo pass >> passes.txt
printf '\\relax\n' > "$base.aux"
printf 'This is a fake TeX engine\n' > "$base.log"
printf 'dvi' > "$base.dvi""#,
    )
}
