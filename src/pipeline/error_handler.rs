//! Unit-local failure taxonomy. Every variant aborts only the Work Unit that raised it.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::utils::config::STDERR_TAIL_BYTES;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// External raster tool returned a non-zero exit status.
    #[error("{tool} failed ({status}): {stderr}")]
    ToolInvocation {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    ToolTimeout { tool: String, timeout: Duration },

    /// Tool could not be started at all (not installed, not executable).
    #[error("could not start {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("variable '{variable}' not found in {}; available: [{}]", .path.display(), .available.join(", "))]
    MissingVariable {
        variable: String,
        path: PathBuf,
        available: Vec<String>,
    },

    #[error("netCDF error on {}: {message}", .path.display())]
    NetCdf { path: PathBuf, message: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Non-zero exits and timeouts are usually transient (network mounts, busy filesystems).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ToolInvocation { .. } | PipelineError::ToolTimeout { .. }
        )
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn netcdf(path: &Path, err: impl std::fmt::Display) -> Self {
        PipelineError::NetCdf {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Keep the last [`STDERR_TAIL_BYTES`] of tool stderr, trimmed, on a char boundary.
pub fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}
