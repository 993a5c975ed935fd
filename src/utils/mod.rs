pub mod config;
pub mod env;
pub mod fd_limit;
pub mod logger;
pub mod settings_toml;
pub mod tempfiles;

pub use config::*;
pub use fd_limit::{
    FDS_PER_WORKER, cap_workers, max_open_fds, max_workers_by_fd_limit,
    warn_if_tiles_exceed_fd_limit,
};
pub use logger::{Colors, setup_logging};
pub use tempfiles::{
    cleanup_best_effort, is_partial_path, partial_path_for, remove_stale, rename_temp_to_final,
    temp_path_for,
};
