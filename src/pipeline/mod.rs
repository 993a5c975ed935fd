//! Pipeline components: per-unit paths, stage sequence, physical pass, error handling.

pub mod context;
pub mod error_handler;
pub mod fill_scale;
pub mod orchestrator;
pub mod physical;

pub use context::UnitPaths;
pub use error_handler::PipelineError;
pub use fill_scale::{PackingInfo, Resolved, ValueSource, apply_fill_and_scale, resolve_packing};
pub use orchestrator::{Pipeline, prepare_opts};
pub use physical::{NetcdfPhysicalPass, PhysicalPass, PhysicalReport};
