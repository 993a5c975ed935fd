//! Parallel work dispatcher: a fixed-size rayon pool runs Work Units, outcomes stream back over a
//! channel and are reported as each unit finishes.

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::progress::{ProgressBar, create_progress_bar, update_progress_bar};
use crate::pipeline::Pipeline;
use crate::utils::cap_workers;
use crate::utils::config::PackagePaths;
use crate::{RunSummary, UnitOutcome, UnitReport, WorkUnit};

/// Run every unit on a pool of `workers` threads. Units not yet started when `cancel` is set
/// report [`UnitOutcome::Cancelled`]; units already running finish normally.
pub fn dispatch(
    pipeline: &Pipeline,
    units: &[WorkUnit],
    workers: usize,
    cancel: &Arc<AtomicBool>,
) -> Result<RunSummary> {
    let workers = cap_workers(workers);
    debug!("Dispatching {} units on {} workers", units.len(), workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("{}-worker-{i}", PackagePaths::get().pkg_name()))
        .build()
        .context("build worker pool")?;

    let bar = pipeline
        .opts()
        .verbose
        .then(|| create_progress_bar(units.len(), "Units"));

    let (tx, rx) = unbounded::<UnitReport>();
    let mut summary = RunSummary::default();
    std::thread::scope(|s| {
        s.spawn(move || {
            pool.install(|| {
                units.par_iter().with_max_len(1).for_each_with(tx, |tx, unit| {
                    let outcome = if cancel.load(Ordering::SeqCst) {
                        UnitOutcome::Cancelled
                    } else {
                        pipeline.process_unit(unit)
                    };
                    let _ = tx.send(UnitReport {
                        timestamp_key: unit.timestamp_key.clone(),
                        outcome,
                    });
                });
            });
        });

        // Senders are dropped when the pool finishes, which ends this loop.
        for report in rx.iter() {
            log_report(&report, bar.as_ref());
            summary.record(&report);
        }
    });

    summary.finalize();
    Ok(summary)
}

fn log_report(report: &UnitReport, bar: Option<&ProgressBar>) {
    match &report.outcome {
        UnitOutcome::Failed { .. } => error!("{}", report),
        UnitOutcome::Cancelled => warn!("{}", report),
        _ => info!("{}", report),
    }
    if let Some(bar) = bar {
        update_progress_bar(bar, 1);
    }
}
