//! Load `.gridmosaic.toml` (or an explicit `--config` file). CLI only; library callers build [`Opts`] directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::config::PackagePaths;
use crate::{Opts, ResampleMethod};

#[derive(Debug, Default, Deserialize)]
pub struct SettingsToml {
    #[serde(default)]
    settings: RunSection,
    #[serde(default)]
    product: ProductSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunSection {
    input_root: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    index_path: Option<PathBuf>,
    workers: Option<usize>,
    resolution: Option<f64>,
    resample: Option<ResampleMethod>,
    gdal_zlevel: Option<u8>,
    output_deflate_level: Option<u8>,
    warp_threads: Option<usize>,
    limit: Option<usize>,
    /// Seconds; 0 disables the timeout.
    tool_timeout: Option<u64>,
    max_attempts: Option<u32>,
    materialize: Option<bool>,
    keep_raw: Option<bool>,
    grid_label: Option<String>,
    gdal_bin: Option<PathBuf>,
    verbose: Option<bool>,
    summary_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProductSection {
    code: Option<String>,
    grid_name: Option<String>,
    variable: Option<String>,
    fallback_scale: Option<f64>,
    fallback_fill: Option<f64>,
    units: Option<String>,
    long_name: Option<String>,
    source_product: Option<String>,
}

/// Load an explicit config file. Missing or malformed files are errors.
pub fn load_settings_file(path: &Path) -> Result<SettingsToml> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse config {}", path.display()))
}

/// Load `.gridmosaic.toml` from `dir` if present. Missing is `Ok(None)`; a malformed file is an
/// error (this runs before logging is set up, so a warning would go nowhere).
pub fn load_default_settings(dir: &Path) -> Result<Option<SettingsToml>> {
    let path = dir.join(PackagePaths::get().config_filename());
    if !path.is_file() {
        return Ok(None);
    }
    load_settings_file(&path).map(Some)
}

/// `verbose` from the file, so logging can be configured before anything else runs.
pub fn file_verbose(file: &SettingsToml) -> Option<bool> {
    file.settings.verbose
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $sec.$field.clone() {
            $opts.$field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_opts(file: &SettingsToml, opts: &mut Opts) {
    let run = &file.settings;
    apply_file_opt!(run, opts, input_root);
    apply_file_opt!(run, opts, output_dir);
    apply_file_opt!(run, opts, scratch_dir);
    apply_file_opt!(run, opts, index_path);
    apply_file_opt!(run, opts, workers);
    apply_file_opt!(run, opts, resolution);
    apply_file_opt!(run, opts, resample);
    apply_file_opt!(run, opts, gdal_zlevel);
    apply_file_opt!(run, opts, output_deflate_level);
    apply_file_opt!(run, opts, warp_threads);
    apply_file_opt!(run, opts, max_attempts);
    apply_file_opt!(run, opts, materialize);
    apply_file_opt!(run, opts, keep_raw);
    apply_file_opt!(run, opts, verbose);
    if run.limit.is_some() {
        opts.limit = run.limit;
    }
    if let Some(secs) = run.tool_timeout {
        opts.tool_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if run.grid_label.is_some() {
        opts.grid_label = run.grid_label.clone();
    }
    if run.gdal_bin.is_some() {
        opts.gdal_bin = run.gdal_bin.clone();
    }
    if run.summary_path.is_some() {
        opts.summary_path = run.summary_path.clone();
    }

    let product = &file.product;
    let p = &mut opts.product;
    apply_file_opt!(product, p, code);
    apply_file_opt!(product, p, grid_name);
    apply_file_opt!(product, p, variable);
    apply_file_opt!(product, p, fallback_scale);
    apply_file_opt!(product, p, fallback_fill);
    apply_file_opt!(product, p, units);
    apply_file_opt!(product, p, long_name);
    apply_file_opt!(product, p, source_product);
}
