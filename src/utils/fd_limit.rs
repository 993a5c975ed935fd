//! File descriptor limit detection for capping the worker pool (Unix).

/// Estimated descriptors held by this process per in-flight unit (child pipes, NetCDF handles, scratch files).
pub const FDS_PER_WORKER: usize = 16;

/// Fraction of the process FD limit to use (leave headroom for other code).
const FD_LIMIT_FRACTION: f64 = 0.8;

/// Returns the soft limit for max open file descriptors, or `None` if unavailable (e.g. Windows).
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    use std::mem::MaybeUninit;
    let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) } != 0 {
        return None;
    }
    let rlim = unsafe { rlim.assume_init() };
    let cur = rlim.rlim_cur;
    // RLIM_INFINITY is typically !0 or u64::MAX; treat as "no practical limit"
    if cur == libc::RLIM_INFINITY || cur > i64::MAX as u64 {
        return None;
    }
    Some(cur)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Suggested max pool size so we stay under ~80% of the FD limit.
/// Returns `None` if no limit is available (use caller's value).
pub fn max_workers_by_fd_limit() -> Option<usize> {
    let limit = max_open_fds()?;
    let usable = (limit as f64 * FD_LIMIT_FRACTION) as usize;
    if usable < FDS_PER_WORKER {
        return Some(1);
    }
    Some(usable / FDS_PER_WORKER)
}

/// Cap `requested` workers by the FD limit; never below 1.
pub fn cap_workers(requested: usize) -> usize {
    let requested = requested.max(1);
    match max_workers_by_fd_limit() {
        Some(fd_cap) if fd_cap < requested => {
            log::debug!("Capping workers {} -> {} (FD limit ~80%)", requested, fd_cap);
            fd_cap.max(1)
        }
        _ => requested,
    }
}

/// Tool children inherit our soft limit and the mosaic tools hold every tile open at once.
/// Warn when a unit has more tiles than that limit leaves room for.
pub fn warn_if_tiles_exceed_fd_limit(key: &str, tiles: usize) {
    if let Some(limit) = max_open_fds()
        && (tiles as f64) > limit as f64 * FD_LIMIT_FRACTION
    {
        log::warn!(
            "{}: {} tiles is close to the open-file limit ({}); tools may fail with EMFILE",
            key,
            tiles,
            limit
        );
    }
}
