//! Engine: command-line surface, tool invocation and the worker pool.

pub mod arg_parser;
pub mod cli;
pub mod gdal;
pub mod parallel;
pub mod progress;
pub mod runner;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::{Cli, Commands, CommonArgs, RunArgs, SetAttrArgs};
pub use cli::handle_run;
pub use gdal::{GdalTools, Tool, ToolCommand, WarpParams};
pub use parallel::dispatch;
pub use runner::{ProcessRunner, ToolRunner, run_with_retry};
pub use tools::{absolutize, ensure_dir, path_relative_to};
