// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Transit Sentinel - service disruption detection for transit fleets
//!
//! Periodically inspects vehicle position reports and turns anomalous
//! conditions into alerts:
//! - vehicles stopped far longer than a dwell should take
//! - vehicles on the same route bunched together
//! - routes running with too few vehicles
//! - vehicles that have gone silent
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Monitor                           │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌───────────┐   ┌──────────────────┐   │
//! │  │ Detection  │ → │ Detectors │ → │ Position Gateway │   │
//! │  │ Scheduler  │   │  (x4)     │   │  (SQLite, ...)   │   │
//! │  └────────────┘   └───────────┘   └──────────────────┘   │
//! │        ↓                                                  │
//! │  ┌────────────┐   ┌──────────────────┐                    │
//! │  │ AlertStore │ ← │ Stats Reporter   │                    │
//! │  └────────────┘   └──────────────────┘                    │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod alerts;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod geo;
pub mod positions;
pub mod simulator;

// Re-exports for convenience
pub use alerts::{AlertStatistics, AlertStore};
pub use config::Config;
pub use crate::core::{Monitor, StatsReport};
pub use detection::{Alert, AlertType, DetectorSet};
pub use error::{ConfigError, MonitorError, QueryError};
pub use positions::{PositionGateway, SqlitePositionStore, VehiclePosition, VehicleStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = "Transit Sentinel";
