//! gridmosaic CLI: index granules, then mosaic, reproject and rescale each timestamp.

use anyhow::Result;
use clap::Parser;
use gridmosaic::engine::arg_parser::Cli;
use gridmosaic::engine::handle_run;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> Result<ExitCode> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    let code = handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(code)
}
