//! Running external tools: the [`ToolRunner`] seam, the process-backed runner with a wall-clock
//! timeout, and the bounded retry policy shared by every runner.

use log::{debug, warn};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::gdal::ToolCommand;
use crate::pipeline::error_handler::{PipelineError, stderr_tail};
use crate::utils::config::TOOL_POLL_INTERVAL_MS;

/// Runs one tool invocation to completion. Implementations must be usable from many workers at once.
pub trait ToolRunner: Send + Sync {
    fn run(&self, cmd: &ToolCommand) -> Result<(), PipelineError>;
}

/// Spawns the real executable. Stdout is discarded, stderr captured for error reports.
#[derive(Clone, Debug, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<(), PipelineError> {
        debug!("[CMD] {}", cmd);
        let started = Instant::now();
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PipelineError::ToolSpawn {
                tool: cmd.name().to_string(),
                source,
            })?;

        // Drain stderr on its own thread so a chatty tool never blocks on a full pipe.
        let stderr = child.stderr.take();
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });

        let status = wait_with_timeout(&mut child, self.timeout)
            .map_err(|e| PipelineError::io(format!("wait for {}", cmd.name()), e))?;
        // On timeout the reader is left detached: a grandchild may still hold the pipe open.
        let Some(status) = status else {
            return Err(PipelineError::ToolTimeout {
                tool: cmd.name().to_string(),
                timeout: self.timeout.unwrap_or_default(),
            });
        };
        let stderr = reader.join().unwrap_or_default();

        if !status.success() {
            return Err(PipelineError::ToolInvocation {
                tool: cmd.name().to_string(),
                status: status.to_string(),
                stderr: stderr_tail(&stderr),
            });
        }
        debug!("{} finished in {:?}", cmd.name(), started.elapsed());
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", cmd.name(), stderr_tail(&stderr));
        }
        Ok(())
    }
}

/// Wait for `child`; `Ok(None)` when `timeout` expired (the child is killed and reaped).
fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };
    let start = Instant::now();
    let poll = Duration::from_millis(TOOL_POLL_INTERVAL_MS);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        let remaining = timeout.saturating_sub(start.elapsed());
        thread::sleep(poll.min(remaining).max(Duration::from_millis(1)));
    }
}

/// Run `cmd`, retrying retryable failures (non-zero exit, timeout) up to `max_attempts` total.
/// Spawn failures and other errors are returned immediately.
pub fn run_with_retry(
    runner: &dyn ToolRunner,
    cmd: &ToolCommand,
    max_attempts: u32,
) -> Result<(), PipelineError> {
    let attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match runner.run(cmd) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(
                    "{} failed (attempt {}/{}), retrying: {}",
                    cmd.name(),
                    attempt,
                    attempts,
                    e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
