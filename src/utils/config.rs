//! Application configuration constants.
//! Defaults and tuning in one place; everything here can be overridden through [`Opts`](crate::Opts).

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    summary_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                summary_filename: format!("{pkg}_summary.json"),
                env_prefix: pkg.to_uppercase(),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Config file looked up in the working directory when `--config` is not given.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    pub fn summary_filename(&self) -> &str {
        &self.summary_filename
    }

    /// Environment variable holding the GDAL bin directory.
    pub fn gdal_bin_env(&self) -> String {
        format!("{}_GDAL_BIN", self.env_prefix)
    }
}

// ---- Run defaults ----

/// Defaults for [`Opts`](crate::Opts). Paths are relative to the working directory.
pub struct Defaults;

impl Defaults {
    pub const INPUT_ROOT: &'static str = "rawdata";
    pub const OUTPUT_DIR: &'static str = "global_epsg4326";
    pub const SCRATCH_DIR: &'static str = "_tmp";
    pub const INDEX_FILE: &'static str = "granule_index.csv";
    /// External tools are I/O bound; a small pool avoids exhausting GDAL's own threads and file handles.
    pub const WORKERS: usize = 4;
    /// ~500 m at the equator.
    pub const RESOLUTION_DEG: f64 = 0.005;
    pub const GDAL_ZLEVEL: u8 = 1;
    pub const OUTPUT_DEFLATE_LEVEL: u8 = 1;
    pub const WARP_THREADS: usize = 4;
    pub const TOOL_TIMEOUT_SECS: u64 = 3600;
    pub const MAX_ATTEMPTS: u32 = 2;
}

/// MOD16A2GF v6.1 evapotranspiration.
pub struct ProductDefaults;

impl ProductDefaults {
    pub const CODE: &'static str = "MOD16A2GF";
    pub const GRID_NAME: &'static str = "MOD_Grid_MOD16A2";
    pub const VARIABLE: &'static str = "ET_500m";
    pub const FALLBACK_SCALE: f64 = 0.1;
    pub const FALLBACK_FILL: f64 = 32767.0;
    /// kg/m^2 == mm of water
    pub const UNITS: &'static str = "mm/8day";
    pub const LONG_NAME: &'static str = "Evapotranspiration (MOD16A2GF v6.1), scaled and masked";
    pub const SOURCE_PRODUCT: &'static str = "MOD16A2GF v6.1";
}

// ---- Tool invocation ----

/// Global geographic target grid.
pub struct TargetGrid;

impl TargetGrid {
    pub const SRS: &'static str = "EPSG:4326";
    /// xmin ymin xmax ymax
    pub const EXTENT: [&'static str; 4] = ["-180", "-90", "180", "90"];
}

/// Attributes stripped from the physical output: they describe the packed encoding, not the data.
pub const PACKING_ATTRIBUTES: [&str; 5] = [
    "scale_factor",
    "add_offset",
    "_FillValue",
    "missing_value",
    "valid_range",
];

/// How often a running tool is polled for exit.
pub const TOOL_POLL_INTERVAL_MS: u64 = 200;

/// Bytes of captured stderr kept for error messages.
pub const STDERR_TAIL_BYTES: usize = 2000;

// ---- CPU detection ----

/// Scheduler variables consulted before the machine CPU count (batch jobs are often
/// granted fewer CPUs than the node has).
pub const SCHEDULER_CPU_VARS: [&str; 3] = ["SLURM_CPUS_PER_TASK", "SLURM_CPUS_ON_NODE", "PBS_NP"];

/// CPUs available to this process: scheduler allocation if present, else rayon's count.
/// Values like `4(x2)` (SLURM) use the leading number.
pub fn available_cpus() -> usize {
    for var in SCHEDULER_CPU_VARS {
        if let Ok(v) = std::env::var(var)
            && let Some(n) = parse_cpu_count(&v)
        {
            return n;
        }
    }
    rayon::current_num_threads().max(1)
}

pub(crate) fn parse_cpu_count(value: &str) -> Option<usize> {
    let head = value.split('(').next()?.trim();
    head.parse::<usize>().ok().filter(|n| *n > 0)
}

/// Default pool size: conservative, never more than the CPUs granted.
pub fn default_workers() -> usize {
    Defaults::WORKERS.min(available_cpus())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slurm_style_counts() {
        assert_eq!(parse_cpu_count("8"), Some(8));
        assert_eq!(parse_cpu_count("4(x2)"), Some(4));
        assert_eq!(parse_cpu_count(" 16 "), Some(16));
        assert_eq!(parse_cpu_count("0"), None);
        assert_eq!(parse_cpu_count("many"), None);
    }
}
