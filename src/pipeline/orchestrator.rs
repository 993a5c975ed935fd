//! Per-unit stage sequence: skip-check, mosaic, materialize, reproject, physical pass, cleanup.
//!
//! A unit never returns an error to its caller: every failure becomes [`UnitOutcome::Failed`]
//! so one bad timestamp cannot take down the run.

use anyhow::Result;
use log::{debug, warn};
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::engine::gdal::{GdalTools, WarpParams, subdataset_ref};
use crate::engine::runner::{ToolRunner, run_with_retry};
use crate::engine::tools::{absolutize, ensure_dir};
use crate::pipeline::context::UnitPaths;
use crate::pipeline::error_handler::PipelineError;
use crate::pipeline::physical::PhysicalPass;
use crate::utils::fd_limit::warn_if_tiles_exceed_fd_limit;
use crate::utils::{cleanup_best_effort, remove_stale};
use crate::{Opts, UnitOutcome, WorkUnit};

/// Everything a unit needs besides its granules. Shared read-only by all workers.
pub struct Pipeline<'a> {
    opts: &'a Opts,
    tools: GdalTools,
    runner: &'a dyn ToolRunner,
    physical: &'a dyn PhysicalPass,
}

impl<'a> Pipeline<'a> {
    /// `opts` should come from [`prepare_opts`] so every path handed to a tool is absolute.
    pub fn new(
        opts: &'a Opts,
        runner: &'a dyn ToolRunner,
        physical: &'a dyn PhysicalPass,
    ) -> Self {
        Self {
            opts,
            tools: GdalTools::new(opts.gdal_bin.clone()),
            runner,
            physical,
        }
    }

    pub fn opts(&self) -> &Opts {
        self.opts
    }

    /// Run one unit to completion. Scratch is cleaned up whatever the outcome.
    pub fn process_unit(&self, unit: &WorkUnit) -> UnitOutcome {
        let paths = UnitPaths::new(&unit.timestamp_key, self.opts);
        if paths.final_nc.exists() {
            return UnitOutcome::Skipped;
        }

        let start = Instant::now();
        let result = self.run_stages(unit, &paths);
        if result.is_err()
            && let Err(e) = remove_stale(&paths.partial_nc)
        {
            warn!("{}: {:#}", unit.timestamp_key, e);
        }
        cleanup_best_effort(
            &paths.scratch_files(self.opts.keep_raw),
            Some(&paths.tmp_dir),
        );
        debug!("{} finished in {:?}", unit.timestamp_key, start.elapsed());

        match result {
            Ok(()) => UnitOutcome::Completed {
                output: paths.final_nc,
            },
            Err(e) => UnitOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    fn run_stages(&self, unit: &WorkUnit, paths: &UnitPaths) -> Result<(), PipelineError> {
        let key = &unit.timestamp_key;
        let opts = self.opts;
        warn_if_tiles_exceed_fd_limit(key, unit.granules.len());
        debug!("{}: tiles {}", key, unit.tiles().collect::<Vec<_>>().join(","));

        fs::create_dir_all(&paths.tmp_dir)
            .map_err(|e| PipelineError::io(format!("create {}", paths.tmp_dir.display()), e))?;
        if let Err(e) = fs::remove_file(&paths.partial_nc)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(PipelineError::io(
                format!("remove stale {}", paths.partial_nc.display()),
                e,
            ));
        }

        // 1. Mosaic
        self.write_file_list(unit, &paths.file_list)?;
        let cmd = self.tools.build_vrt(&paths.file_list, &paths.vrt);
        run_with_retry(self.runner, &cmd, opts.max_attempts)?;

        // 2. Materialize
        if opts.materialize {
            let cmd = self.tools.translate(&paths.vrt, &paths.sinu_nc, opts.gdal_zlevel);
            run_with_retry(self.runner, &cmd, opts.max_attempts)?;
        }

        // 3. Reproject
        let params = WarpParams {
            resolution: opts.resolution,
            resample: opts.resample,
            threads: opts.warp_threads,
            zlevel: opts.gdal_zlevel,
        };
        let cmd = self
            .tools
            .warp(paths.warp_source(opts.materialize), &paths.raw_nc, &params);
        run_with_retry(self.runner, &cmd, opts.max_attempts)?;

        // 4. Physical pass, then publish
        let report = self.physical.apply(
            &paths.raw_nc,
            &paths.partial_nc,
            &opts.product,
            opts.output_deflate_level,
        )?;
        debug!(
            "{}: {}/{} valid pixels",
            key, report.valid_pixels, report.total_pixels
        );
        fs::rename(&paths.partial_nc, &paths.final_nc).map_err(|e| {
            PipelineError::io(
                format!(
                    "rename {} -> {}",
                    paths.partial_nc.display(),
                    paths.final_nc.display()
                ),
                e,
            )
        })?;
        Ok(())
    }

    fn write_file_list(&self, unit: &WorkUnit, list: &Path) -> Result<(), PipelineError> {
        let product = &self.opts.product;
        let mut body = String::new();
        for g in &unit.granules {
            let path = std::path::absolute(&g.path)
                .map_err(|e| PipelineError::io(format!("absolutize {}", g.path.display()), e))?;
            body.push_str(&subdataset_ref(&path, &product.grid_name, &product.variable));
            body.push('\n');
        }
        fs::write(list, body).map_err(|e| PipelineError::io(format!("write {}", list.display()), e))
    }
}

/// Absolute copy of `opts` with output and scratch directories created.
pub fn prepare_opts(opts: &Opts) -> Result<Opts> {
    let mut opts = opts.clone();
    opts.input_root = absolutize(&opts.input_root)?;
    opts.output_dir = absolutize(&opts.output_dir)?;
    opts.scratch_dir = absolutize(&opts.scratch_dir)?;
    opts.index_path = absolutize(&opts.index_path)?;
    if let Some(bin) = &opts.gdal_bin {
        opts.gdal_bin = Some(absolutize(bin)?);
    }
    ensure_dir(&opts.output_dir)?;
    ensure_dir(&opts.scratch_dir)?;
    Ok(opts)
}
