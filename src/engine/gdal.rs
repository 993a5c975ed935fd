//! Argument construction for the GDAL command-line tools used by the pipeline.
//!
//! Every builder is a pure function of its inputs; nothing here spawns a process.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::ResampleMethod;
use crate::engine::tools::shell_quote;
use crate::utils::config::TargetGrid;

/// The external tools the pipeline drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tool {
    BuildVrt,
    Translate,
    Warp,
}

impl Tool {
    pub fn executable(&self) -> &'static str {
        match self {
            Tool::BuildVrt => "gdalbuildvrt",
            Tool::Translate => "gdal_translate",
            Tool::Warp => "gdalwarp",
        }
    }
}

/// One fully specified tool invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn name(&self) -> &'static str {
        self.tool.executable()
    }

    /// Value following `flag` in the argument list (e.g. `-r` -> `bilinear`).
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(String::as_str)
    }

    /// Last argument: the output path for every tool here.
    pub fn output(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program.to_string_lossy()))?;
        for a in &self.args {
            write!(f, " {}", shell_quote(a))?;
        }
        Ok(())
    }
}

/// Reference to one HDF-EOS grid variable inside a granule:
/// `HDF4_EOS:EOS_GRID:"<path>":<grid>:<variable>`.
pub fn subdataset_ref(hdf_path: &Path, grid: &str, variable: &str) -> String {
    format!(
        "HDF4_EOS:EOS_GRID:\"{}\":{}:{}",
        hdf_path.display(),
        grid,
        variable
    )
}

/// NC4 + deflate creation options shared by translate and warp.
pub fn netcdf_creation_options(zlevel: u8) -> Vec<String> {
    vec![
        "-co".into(),
        "FORMAT=NC4".into(),
        "-co".into(),
        "COMPRESS=DEFLATE".into(),
        "-co".into(),
        format!("ZLEVEL={zlevel}"),
    ]
}

/// Reprojection settings for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct WarpParams {
    /// Pixel size in degrees.
    pub resolution: f64,
    pub resample: ResampleMethod,
    pub threads: usize,
    pub zlevel: u8,
}

/// Builds invocations, resolving executables from an optional bin directory (else PATH).
#[derive(Clone, Debug, Default)]
pub struct GdalTools {
    bin_dir: Option<PathBuf>,
}

impl GdalTools {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir }
    }

    fn command(&self, tool: Tool, args: Vec<String>) -> ToolCommand {
        let program = match &self.bin_dir {
            Some(dir) => dir.join(tool.executable()),
            None => PathBuf::from(tool.executable()),
        };
        ToolCommand {
            tool,
            program,
            args,
        }
    }

    /// Mosaic: a VRT over every subdataset listed in `file_list`, at the finest input resolution.
    pub fn build_vrt(&self, file_list: &Path, vrt: &Path) -> ToolCommand {
        let args = vec![
            "-overwrite".into(),
            "-resolution".into(),
            "highest".into(),
            "-input_file_list".into(),
            file_list.to_string_lossy().into_owned(),
            vrt.to_string_lossy().into_owned(),
        ];
        self.command(Tool::BuildVrt, args)
    }

    /// Materialize: VRT -> Float32 NetCDF-4 in the source projection.
    pub fn translate(&self, vrt: &Path, out: &Path, zlevel: u8) -> ToolCommand {
        let mut args: Vec<String> = vec![
            "-of".into(),
            "netCDF".into(),
            "-ot".into(),
            "Float32".into(),
        ];
        args.extend(netcdf_creation_options(zlevel));
        args.push(vrt.to_string_lossy().into_owned());
        args.push(out.to_string_lossy().into_owned());
        self.command(Tool::Translate, args)
    }

    /// Reproject onto the global EPSG:4326 grid with target-aligned pixels.
    pub fn warp(&self, src: &Path, out: &Path, params: &WarpParams) -> ToolCommand {
        let res = format_resolution(params.resolution);
        let mut args: Vec<String> = vec![
            "-overwrite".into(),
            "-t_srs".into(),
            TargetGrid::SRS.into(),
            "-te".into(),
        ];
        args.extend(TargetGrid::EXTENT.iter().map(|s| s.to_string()));
        args.extend([
            "-tr".into(),
            res.clone(),
            res,
            "-tap".into(),
            "-r".into(),
            params.resample.as_gdal_str().into(),
            "-multi".into(),
            "-wo".into(),
            format!("NUM_THREADS={}", params.threads.max(1)),
            "-ot".into(),
            "Float32".into(),
            "-of".into(),
            "netCDF".into(),
        ]);
        args.extend(netcdf_creation_options(params.zlevel));
        args.push(src.to_string_lossy().into_owned());
        args.push(out.to_string_lossy().into_owned());
        self.command(Tool::Warp, args)
    }
}

/// Shortest decimal form (`0.005`, `0.05`, `1`).
pub fn format_resolution(res: f64) -> String {
    format!("{res}")
}
