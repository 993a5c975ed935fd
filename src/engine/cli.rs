//! CLI command handlers: `run` (default), `index`, `set-attr`.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::engine::arg_parser::{Cli, Commands, CommonArgs, RunArgs, SetAttrArgs};
use crate::utils::env::gdal_bin_from_env;
use crate::utils::settings_toml::{
    SettingsToml, apply_file_to_opts, file_verbose, load_default_settings, load_settings_file,
};
use crate::utils::{Colors, default_workers, setup_logging};
use crate::{Opts, RunSummary};

/// Overwrite opts field from a CLI flag when given.
macro_rules! apply_cli_opt {
    ($args:expr, $opts:expr, $field:ident => $target:ident) => {
        if let Some(v) = $args.$field.clone() {
            $opts.$target = v;
        }
    };
}

fn apply_common_to_opts(args: &CommonArgs, opts: &mut Opts) {
    apply_cli_opt!(args, opts, input_root => input_root);
    apply_cli_opt!(args, opts, index => index_path);
    apply_cli_opt!(args, opts.product, product => code);
    opts.reindex |= args.reindex;
}

fn apply_run_to_opts(args: &RunArgs, opts: &mut Opts) {
    apply_common_to_opts(&args.common, opts);
    apply_cli_opt!(args, opts, output_dir => output_dir);
    apply_cli_opt!(args, opts, scratch_dir => scratch_dir);
    apply_cli_opt!(args, opts, workers => workers);
    apply_cli_opt!(args, opts, resolution => resolution);
    apply_cli_opt!(args, opts, resample => resample);
    apply_cli_opt!(args, opts, gdal_zlevel => gdal_zlevel);
    apply_cli_opt!(args, opts, deflate_level => output_deflate_level);
    apply_cli_opt!(args, opts, warp_threads => warp_threads);
    apply_cli_opt!(args, opts, max_attempts => max_attempts);
    apply_cli_opt!(args, opts, materialize => materialize);
    apply_cli_opt!(args, opts, keep_raw => keep_raw);
    apply_cli_opt!(args, opts.product, variable => variable);
    if args.limit.is_some() {
        opts.limit = args.limit;
    }
    if let Some(secs) = args.tool_timeout {
        opts.tool_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if args.grid_label.is_some() {
        opts.grid_label = args.grid_label.clone();
    }
    if args.gdal_bin.is_some() {
        opts.gdal_bin = args.gdal_bin.clone();
    }
    if args.summary.is_some() {
        opts.summary_path = args.summary.clone();
    }
}

/// Defaults, then environment, then config file, then CLI flags.
fn base_opts(cwd: &Path, file: Option<&SettingsToml>, verbose: bool) -> Opts {
    let mut opts = Opts {
        workers: default_workers(),
        gdal_bin: gdal_bin_from_env(cwd),
        ..Default::default()
    };
    if let Some(file) = file {
        apply_file_to_opts(file, &mut opts);
    }
    opts.verbose = verbose;
    opts
}

/// Dispatch the parsed command line. Returns the process exit code.
pub fn handle_run(cli: &Cli) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("current directory")?;
    let file = match &cli.config {
        Some(path) => Some(load_settings_file(path)?),
        None => load_default_settings(&cwd)?,
    };
    let verbose = cli
        .verbose
        .or_else(|| file.as_ref().and_then(file_verbose))
        .unwrap_or(false);
    setup_logging(verbose);

    let mut opts = base_opts(&cwd, file.as_ref(), verbose);
    match &cli.command {
        Some(Commands::SetAttr(args)) => {
            handle_set_attr(args)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Index(args)) => {
            apply_common_to_opts(args, &mut opts);
            handle_index(&opts)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run(args)) => {
            apply_run_to_opts(args, &mut opts);
            handle_pipeline(&opts)
        }
        None => handle_pipeline(&opts),
    }
}

fn handle_pipeline(opts: &Opts) -> Result<ExitCode> {
    let config_str = format!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        opts
    );
    debug!("{}", config_str);

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if !cancel_handler.swap(true, Ordering::SeqCst) {
            eprintln!("Interrupt received: finishing running units, skipping the rest");
        }
    })
    .context("set Ctrl+C handler")?;

    let summary = crate::run(opts, &cancel)?;
    print_summary(&summary);
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_index(opts: &Opts) -> Result<()> {
    let opts = Opts {
        input_root: crate::engine::tools::absolutize(&opts.input_root)?,
        index_path: crate::engine::tools::absolutize(&opts.index_path)?,
        ..opts.clone()
    };
    let granules = crate::index::ensure_index(&opts)?;
    let units = crate::group::group_work_units(&granules, None);
    info!(
        "{} granules across {} timestamps",
        granules.len(),
        units.len()
    );
    Ok(())
}

fn handle_set_attr(args: &SetAttrArgs) -> Result<()> {
    crate::set_attr(
        &args.input,
        &args.output,
        &args.variable,
        &args.attrs,
        args.deflate_level,
    )?;
    info!("[OK] {} -> {}", args.input.display(), args.output.display());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let counts = format!(
        "{} ok, {} skipped, {} failed, {} cancelled",
        summary.succeeded.len(),
        summary.skipped.len(),
        summary.failed.len(),
        summary.cancelled.len()
    );
    let color = if !summary.failed.is_empty() {
        Colors::FAILED
    } else if !summary.cancelled.is_empty() {
        Colors::CANCELLED
    } else {
        Colors::OK
    };
    info!("Summary: {}", Colors::colorize(color, &counts));
    for (key, error) in &summary.failed {
        warn!("  {} {}: {}", Colors::colorize(Colors::FAILED, "failed"), key, error);
    }
    if !summary.cancelled.is_empty() {
        warn!(
            "  {} {}",
            Colors::colorize(Colors::CANCELLED, "cancelled"),
            summary.cancelled.join(", ")
        );
    }
    if !summary.skipped.is_empty() {
        debug!(
            "  {} {}",
            Colors::colorize(Colors::SKIPPED, "skipped"),
            summary.skipped.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResampleMethod;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn cli_overrides_file() {
        let file: SettingsToml = toml::from_str(
            "[settings]\nresolution = 0.05\nworkers = 2\n[product]\nvariable = \"PET_500m\"\n",
        )
        .unwrap();
        let cli = Cli::parse_from(["gridmosaic", "run", "--workers", "8", "-r", "average"]);
        let Some(Commands::Run(args)) = &cli.command else {
            panic!("expected run");
        };
        let mut opts = base_opts(Path::new("/nonexistent"), Some(&file), false);
        apply_run_to_opts(args, &mut opts);
        assert_eq!(opts.workers, 8);
        assert_eq!(opts.resolution, 0.05);
        assert_eq!(opts.resample, ResampleMethod::Average);
        assert_eq!(opts.product.variable, "PET_500m");
    }

    #[test]
    fn index_flags_apply() {
        let cli = Cli::parse_from(["gridmosaic", "index", "-i", "/raw", "--reindex"]);
        let Some(Commands::Index(args)) = &cli.command else {
            panic!("expected index");
        };
        let mut opts = Opts::default();
        apply_common_to_opts(args, &mut opts);
        assert_eq!(opts.input_root, PathBuf::from("/raw"));
        assert!(opts.reindex);
    }
}
