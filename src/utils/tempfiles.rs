use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Sibling temp path for an atomically replaced file (`index.csv` -> `index.csv.tmp`).
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
    final_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}.tmp"))
}

/// Hidden partial path next to a final output (`out/x_phys.nc` -> `out/.x_phys.nc.part`).
/// Same directory as the final file so the closing rename never crosses filesystems.
pub fn partial_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!(".{name}.part"))
}

/// True for paths produced by [`partial_path_for`].
pub fn is_partial_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".part"))
}

/// Remove a stale temp/partial file left by an interrupted run.
pub fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove stale {}", path.display())),
    }
}

pub fn rename_temp_to_final(temp_path: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp_path, final_path).with_context(|| {
        format!(
            "atomic rename temp to final path ({} -> {})",
            temp_path.display(),
            final_path.display()
        )
    })
}

/// Best-effort removal of scratch files and then their directory (recursively: the directory is
/// owned by one unit and tools may leave sidecars in it). Failures are logged, never returned.
pub fn cleanup_best_effort(files: &[PathBuf], dir: Option<&Path>) {
    for f in files {
        if let Err(e) = fs::remove_file(f)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("Cleanup: could not remove {}: {}", f.display(), e);
        }
    }
    if let Some(dir) = dir
        && let Err(e) = fs::remove_dir_all(dir)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("Cleanup: could not remove {}: {}", dir.display(), e);
    }
}
