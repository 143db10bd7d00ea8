//! Core module - detection scheduling, statistics reporting and lifecycle

mod engine;
mod reporter;
mod scheduler;

pub use engine::Monitor;
pub use reporter::{StatsReport, StatsReporter};
pub use scheduler::{DetectionScheduler, PassSummary};
