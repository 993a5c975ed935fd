//! Public and internal types for the gridmosaic API and pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::config::{Defaults, ProductDefaults};

/// One source raster tile for one acquisition period. Built by the indexer, never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Granule {
    pub path: PathBuf,
    pub year: i32,
    pub day_of_year: u32,
    /// Acquisition date (Jan 1 of `year` + `day_of_year - 1` days).
    pub date: NaiveDate,
    /// Canonical per-timestamp key, e.g. `A2021001`.
    pub timestamp_key: String,
    /// Tile id, e.g. `h10v05`.
    pub tile: String,
    /// Collection, e.g. `061`.
    pub collection: String,
    /// Production id (processing timestamp), e.g. `2022293211312`.
    pub production: String,
}

/// All granules sharing one timestamp key. Never empty; at most one granule per tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkUnit {
    pub timestamp_key: String,
    pub granules: Vec<Granule>,
}

impl WorkUnit {
    pub fn tiles(&self) -> impl Iterator<Item = &str> {
        self.granules.iter().map(|g| g.tile.as_str())
    }
}

/// Resampling kernel handed to the warp tool (`-r`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    Near,
    #[default]
    Bilinear,
    Cubic,
    Cubicspline,
    Lanczos,
    /// Area-weighted average; use when upscaling to a coarser grid.
    Average,
    Mode,
}

impl ResampleMethod {
    pub fn as_gdal_str(&self) -> &'static str {
        match self {
            ResampleMethod::Near => "near",
            ResampleMethod::Bilinear => "bilinear",
            ResampleMethod::Cubic => "cubic",
            ResampleMethod::Cubicspline => "cubicspline",
            ResampleMethod::Lanczos => "lanczos",
            ResampleMethod::Average => "average",
            ResampleMethod::Mode => "mode",
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_gdal_str())
    }
}

/// Source product definition: naming convention, subdataset location, and the values
/// used when the reprojected file carries no packing attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductSpec {
    /// Product code at the start of granule file names, e.g. `MOD16A2GF`.
    pub code: String,
    /// HDF-EOS grid holding the variable.
    pub grid_name: String,
    /// Science dataset (and NetCDF variable) name.
    pub variable: String,
    pub fallback_scale: f64,
    pub fallback_fill: f64,
    pub units: String,
    pub long_name: String,
    pub source_product: String,
}

impl Default for ProductSpec {
    fn default() -> Self {
        Self {
            code: ProductDefaults::CODE.to_string(),
            grid_name: ProductDefaults::GRID_NAME.to_string(),
            variable: ProductDefaults::VARIABLE.to_string(),
            fallback_scale: ProductDefaults::FALLBACK_SCALE,
            fallback_fill: ProductDefaults::FALLBACK_FILL,
            units: ProductDefaults::UNITS.to_string(),
            long_name: ProductDefaults::LONG_NAME.to_string(),
            source_product: ProductDefaults::SOURCE_PRODUCT.to_string(),
        }
    }
}

/// Full run configuration (CLI + config file). Passed down to every stage; nothing reads ambient constants.
#[derive(Clone, Debug)]
pub struct Opts {
    pub input_root: PathBuf,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    /// Granule index CSV. Built only when absent (or when `reindex`).
    pub index_path: PathBuf,
    /// Worker pool size.
    pub workers: usize,
    /// Output pixel size in degrees.
    pub resolution: f64,
    pub resample: ResampleMethod,
    /// ZLEVEL for GDAL-written NetCDF intermediates.
    pub gdal_zlevel: u8,
    /// Deflate level of the final physical output.
    pub output_deflate_level: u8,
    /// `NUM_THREADS` warp option per gdalwarp invocation.
    pub warp_threads: usize,
    /// Process only the first N timestamps.
    pub limit: Option<usize>,
    /// Wall-clock limit per tool invocation.
    pub tool_timeout: Option<Duration>,
    /// Attempts per tool invocation for retryable failures (>= 1).
    pub max_attempts: u32,
    /// Write the mosaic to a source-projection NetCDF before warping. When false, warp reads the VRT.
    pub materialize: bool,
    /// Keep the reprojected-but-unscaled file next to the final output.
    pub keep_raw: bool,
    /// Grid description used in output names. When None, derived from the resolution.
    pub grid_label: Option<String>,
    /// Directory holding the GDAL executables. When None, resolved from PATH.
    pub gdal_bin: Option<PathBuf>,
    pub reindex: bool,
    pub verbose: bool,
    pub summary_path: Option<PathBuf>,
    pub product: ProductSpec,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from(Defaults::INPUT_ROOT),
            output_dir: PathBuf::from(Defaults::OUTPUT_DIR),
            scratch_dir: PathBuf::from(Defaults::SCRATCH_DIR),
            index_path: PathBuf::from(Defaults::INDEX_FILE),
            workers: Defaults::WORKERS,
            resolution: Defaults::RESOLUTION_DEG,
            resample: ResampleMethod::Bilinear,
            gdal_zlevel: Defaults::GDAL_ZLEVEL,
            output_deflate_level: Defaults::OUTPUT_DEFLATE_LEVEL,
            warp_threads: Defaults::WARP_THREADS,
            limit: None,
            tool_timeout: Some(Duration::from_secs(Defaults::TOOL_TIMEOUT_SECS)),
            max_attempts: Defaults::MAX_ATTEMPTS,
            materialize: true,
            keep_raw: false,
            grid_label: None,
            gdal_bin: None,
            reindex: false,
            verbose: false,
            summary_path: None,
            product: ProductSpec::default(),
        }
    }
}

impl Opts {
    /// Grid description for output names: configured label, or `global_epsg4326_<res>deg`
    /// with the decimal point spelled `p` (0.05 -> `0p05`).
    pub fn grid_label(&self) -> String {
        if let Some(label) = &self.grid_label {
            return label.clone();
        }
        let res = format!("{}", self.resolution).replace('.', "p");
        format!("global_epsg4326_{res}deg")
    }
}

/// What happened to one Work Unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UnitOutcome {
    /// Final output already existed; nothing was run.
    Skipped,
    Completed { output: PathBuf },
    Failed { error: String },
    /// Not started because the run was interrupted.
    Cancelled,
}

/// Outcome of one unit, tagged with its timestamp key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitReport {
    pub timestamp_key: String,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

impl fmt::Display for UnitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            UnitOutcome::Skipped => write!(f, "[SKIP] {} output exists", self.timestamp_key),
            UnitOutcome::Completed { output } => {
                let name = output
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                write!(f, "[OK] {} -> {}", self.timestamp_key, name)
            }
            UnitOutcome::Failed { error } => {
                write!(f, "[ERROR] {}: {}", self.timestamp_key, error)
            }
            UnitOutcome::Cancelled => write!(f, "[CANCELLED] {}", self.timestamp_key),
        }
    }
}

/// Aggregate of all unit outcomes for one run. Keys are sorted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub skipped: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub cancelled: Vec<String>,
}

impl RunSummary {
    pub fn record(&mut self, report: &UnitReport) {
        let key = report.timestamp_key.clone();
        match &report.outcome {
            UnitOutcome::Skipped => self.skipped.push(key),
            UnitOutcome::Completed { .. } => self.succeeded.push(key),
            UnitOutcome::Failed { error } => self.failed.push((key, error.clone())),
            UnitOutcome::Cancelled => self.cancelled.push(key),
        }
    }

    /// Sort every list so the summary does not depend on completion order.
    pub fn finalize(&mut self) {
        self.skipped.sort();
        self.succeeded.sort();
        self.failed.sort();
        self.cancelled.sort();
    }

    pub fn total(&self) -> usize {
        self.skipped.len() + self.succeeded.len() + self.failed.len() + self.cancelled.len()
    }

    /// True when no unit failed and none was cancelled.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}
