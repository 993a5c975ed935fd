//! gridmosaic: mosaic MODIS sinusoidal tiles per timestamp, reproject them onto a global
//! geographic grid and write physical-value NetCDF.

pub mod engine;
pub mod group;
pub mod index;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

use anyhow::Context;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::engine::runner::{ProcessRunner, ToolRunner};
use crate::pipeline::{NetcdfPhysicalPass, PhysicalPass, Pipeline, prepare_opts};
use crate::utils::config::PackagePaths;
use crate::utils::{partial_path_for, remove_stale, rename_temp_to_final, temp_path_for};

/// Result alias used by public gridmosaic API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Index (if needed), group and process every timestamp with the real GDAL tools and NetCDF pass.
pub fn run(opts: &Opts, cancel: &Arc<AtomicBool>) -> Result<RunSummary> {
    let runner = ProcessRunner::new(opts.tool_timeout);
    run_with(opts, &runner, &NetcdfPhysicalPass, cancel)
}

/// [`run`] with injectable tool runner and physical pass.
///
/// Indexing errors are returned; per-unit failures are not: they are recorded in the summary.
pub fn run_with(
    opts: &Opts,
    runner: &dyn ToolRunner,
    physical: &dyn PhysicalPass,
    cancel: &Arc<AtomicBool>,
) -> Result<RunSummary> {
    let opts = prepare_opts(opts)?;
    let granules = index::ensure_index(&opts)?;
    let units = group::group_work_units(&granules, opts.limit);
    if units.is_empty() {
        warn!("No work units to process");
    }
    info!(
        "Processing {} timestamps with {} workers -> {}",
        units.len(),
        opts.workers,
        opts.output_dir.display()
    );

    let pipeline = Pipeline::new(&opts, runner, physical);
    let summary = engine::parallel::dispatch(&pipeline, &units, opts.workers, cancel)?;

    if let Some(path) = &opts.summary_path {
        write_summary(path, &summary)?;
    }
    Ok(summary)
}

/// Directories get the default summary file name inside them.
fn summary_target(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(PackagePaths::get().summary_filename())
    } else {
        path.to_path_buf()
    }
}

/// Write `summary` as pretty JSON via temp file and rename.
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let target = summary_target(path);
    let temp = temp_path_for(&target);
    let json = serde_json::to_string_pretty(summary).context("serialize run summary")?;
    std::fs::write(&temp, json).with_context(|| format!("write {}", temp.display()))?;
    rename_temp_to_final(&temp, &target)?;
    info!("Summary written to {}", target.display());
    Ok(())
}

/// Copy `input` to `output` with `variable` as compressed float32 and `attrs` set on it.
/// `output` appears only when complete.
pub fn set_attr(
    input: &Path,
    output: &Path,
    variable: &str,
    attrs: &[(String, String)],
    deflate_level: u8,
) -> Result<()> {
    let output = engine::tools::absolutize(output)?;
    let partial = partial_path_for(&output);
    remove_stale(&partial)?;
    if let Err(e) =
        pipeline::physical::set_attributes(input, &partial, variable, attrs, deflate_level)
    {
        let _ = remove_stale(&partial);
        return Err(e).with_context(|| format!("set attributes on {}", input.display()));
    }
    rename_temp_to_final(&partial, &output)
}
