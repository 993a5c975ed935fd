use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::ResampleMethod;
use crate::pipeline::physical::parse_attr_assignment;

struct DefaultArgs;

impl DefaultArgs {
    pub const SET_ATTR_DEFLATE: u8 = 3;
}

/// Mosaic, reproject and rescale MODIS sinusoidal granules onto a global geographic grid.
#[derive(Clone, Debug, Parser)]
#[command(name = "gridmosaic")]
#[command(about = "Mosaic MODIS tiles per timestamp, reproject to EPSG:4326 and write physical-value NetCDF.")]
pub struct Cli {
    /// TOML config file. Default: `.gridmosaic.toml` in the working directory, if present.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (debug logging and a progress bar). `--verbose=false` beats the config.
    #[arg(long, short = 'v', global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Index granules (if needed) and process every timestamp.
    Run(RunArgs),
    /// Build or rebuild the granule index only.
    Index(CommonArgs),
    /// Copy a NetCDF file, storing one variable as compressed float32 with new string attributes.
    SetAttr(SetAttrArgs),
}

/// Flags shared by `run` and `index`.
#[derive(Clone, Debug, Default, Args)]
pub struct CommonArgs {
    /// Root directory searched recursively for granules.
    #[arg(long, short = 'i')]
    pub input_root: Option<PathBuf>,

    /// Granule index CSV.
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Rebuild the index even if it exists.
    #[arg(long)]
    pub reindex: bool,

    /// Product code at the start of granule file names.
    #[arg(long)]
    pub product: Option<String>,
}

#[derive(Clone, Debug, Default, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Directory for final outputs.
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Scratch root; each timestamp gets its own subdirectory.
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Worker pool size. Default: min(4, available CPUs).
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Output pixel size in degrees.
    #[arg(long)]
    pub resolution: Option<f64>,

    /// Resampling kernel for reprojection.
    #[arg(long, short = 'r', value_enum)]
    pub resample: Option<ResampleMethod>,

    /// ZLEVEL for NetCDF files written by GDAL.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=9))]
    pub gdal_zlevel: Option<u8>,

    /// Deflate level of the final output.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub deflate_level: Option<u8>,

    /// NUM_THREADS for each reprojection.
    #[arg(long)]
    pub warp_threads: Option<usize>,

    /// Process only the first N timestamps.
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Seconds before a tool invocation is killed; 0 disables the limit.
    #[arg(long)]
    pub tool_timeout: Option<u64>,

    /// Attempts per tool invocation for retryable failures.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Materialize the mosaic before reprojection (false: reproject straight from the VRT).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub materialize: Option<bool>,

    /// Keep the reprojected, unscaled file next to the final output.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub keep_raw: Option<bool>,

    /// Grid description used in output file names.
    #[arg(long)]
    pub grid_label: Option<String>,

    /// Directory containing gdalbuildvrt, gdal_translate and gdalwarp.
    #[arg(long)]
    pub gdal_bin: Option<PathBuf>,

    /// Variable to extract from each granule.
    #[arg(long)]
    pub variable: Option<String>,

    /// Write a JSON run summary here.
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Clone, Debug, Args)]
pub struct SetAttrArgs {
    /// Variable to convert and annotate.
    #[arg(long = "var")]
    pub variable: String,

    /// Attribute to set, as key=value. Repeatable.
    #[arg(long = "attr", required = true, value_parser = parse_attr_assignment)]
    pub attrs: Vec<(String, String)>,

    #[arg(long, default_value_t = DefaultArgs::SET_ATTR_DEFLATE, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub deflate_level: u8,

    pub input: PathBuf,

    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::parse_from(["gridmosaic", "-v"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, Some(true));
    }

    #[test]
    fn verbose_does_not_swallow_subcommand() {
        let cli = Cli::parse_from(["gridmosaic", "-v", "run", "-i", "/raw"]);
        assert_eq!(cli.verbose, Some(true));
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.common.input_root, Some(PathBuf::from("/raw")));

        let cli = Cli::parse_from(["gridmosaic", "-v", "index"]);
        assert!(matches!(cli.command, Some(Commands::Index(_))));

        let cli = Cli::parse_from(["gridmosaic", "--verbose=false", "index"]);
        assert_eq!(cli.verbose, Some(false));
        assert!(matches!(cli.command, Some(Commands::Index(_))));

        let cli = Cli::parse_from(["gridmosaic", "index"]);
        assert_eq!(cli.verbose, None);
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::parse_from([
            "gridmosaic",
            "run",
            "-i",
            "/raw",
            "--resolution",
            "0.05",
            "-r",
            "average",
            "--materialize",
            "false",
            "--tool-timeout",
            "0",
        ]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.common.input_root, Some(PathBuf::from("/raw")));
        assert_eq!(args.resolution, Some(0.05));
        assert_eq!(args.resample, Some(ResampleMethod::Average));
        assert_eq!(args.materialize, Some(false));
        assert_eq!(args.tool_timeout, Some(0));
    }

    #[test]
    fn set_attr_collects_pairs() {
        let cli = Cli::parse_from([
            "gridmosaic",
            "set-attr",
            "--var",
            "precip",
            "--attr",
            "units=mm/day",
            "--attr",
            "long_name=Precipitation",
            "in.nc",
            "out.nc",
        ]);
        let Some(Commands::SetAttr(args)) = cli.command else {
            panic!("expected set-attr");
        };
        assert_eq!(args.attrs.len(), 2);
        assert_eq!(args.attrs[0], ("units".into(), "mm/day".into()));
        assert_eq!(args.deflate_level, 3);
    }

    #[test]
    fn set_attr_rejects_bad_pair() {
        let parsed = Cli::try_parse_from([
            "gridmosaic", "set-attr", "--var", "p", "--attr", "oops", "a.nc", "b.nc",
        ]);
        assert!(parsed.is_err());
    }
}
