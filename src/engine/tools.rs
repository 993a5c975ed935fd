//! Path and quoting utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Absolute form of `path` without touching the filesystem or the process working directory.
/// Tools are always handed absolute paths so no worker ever depends on the current directory.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("absolutize {}", path.display()))
}

/// Create `dir` (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))
}

/// Quote one argument for display as a POSIX shell word. Display only; commands are never run through a shell.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Convert absolute path to relative path from base
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}
