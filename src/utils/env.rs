//! GDAL bin directory from the environment: env var → `.env` in the working directory.

use std::path::{Path, PathBuf};

use crate::utils::config::PackagePaths;

fn non_empty_var(key: &str) -> Option<String> {
    let s = std::env::var(key).ok()?;
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

/// `GRIDMOSAIC_GDAL_BIN` from the process environment, else from `.env` in `dir`.
pub fn gdal_bin_from_env(dir: &Path) -> Option<PathBuf> {
    let key = PackagePaths::get().gdal_bin_env();
    if let Some(s) = non_empty_var(&key) {
        return Some(PathBuf::from(s));
    }
    let env_path = dir.join(".env");
    if env_path.is_file() {
        let _ = dotenvy::from_path(&env_path);
        if let Some(s) = non_empty_var(&key) {
            log::debug!("{} loaded from {}", key, env_path.display());
            return Some(PathBuf::from(s));
        }
    }
    None
}
