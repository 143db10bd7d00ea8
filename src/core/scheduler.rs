// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Recurring detection passes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alerts::AlertStore;
use crate::detection::DetectorSet;
use crate::positions::PositionGateway;

/// What one detection pass did
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub as_of: DateTime<Utc>,
    pub alerts_recorded: usize,
    pub failed_detectors: Vec<&'static str>,
    pub elapsed: Duration,
}

/// Runs every detector once per interval and feeds the alert store.
///
/// A pass is awaited before the next tick is taken, so passes never overlap;
/// a slow pass pushes the following tick back instead of stacking up work.
pub struct DetectionScheduler {
    detectors: DetectorSet,
    gateway: Arc<dyn PositionGateway>,
    alerts: Arc<AlertStore>,
    interval: Duration,
    passes: AtomicU64,
}

impl DetectionScheduler {
    pub fn new(
        detectors: DetectorSet,
        gateway: Arc<dyn PositionGateway>,
        alerts: Arc<AlertStore>,
        interval: Duration,
    ) -> Self {
        Self {
            detectors,
            gateway,
            alerts,
            interval,
            passes: AtomicU64::new(0),
        }
    }

    /// Passes completed so far
    pub fn passes_completed(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// One detection pass, measured against the current time
    pub async fn run_pass(&self) -> PassSummary {
        let as_of = Utc::now();
        let started = Instant::now();

        let outcome = self.detectors.run_pass(self.gateway.as_ref(), as_of).await;
        let alerts_recorded = self.alerts.record_all(outcome.alerts);
        let elapsed = started.elapsed();

        self.passes.fetch_add(1, Ordering::Relaxed);

        if outcome.failed.is_empty() {
            debug!("Detection pass raised {} alerts in {:?}", alerts_recorded, elapsed);
        } else {
            warn!(
                "Detection pass raised {} alerts in {:?}, skipped: {}",
                alerts_recorded,
                elapsed,
                outcome.failed.join(", ")
            );
        }

        PassSummary {
            as_of,
            alerts_recorded,
            failed_detectors: outcome.failed,
            elapsed,
        }
    }

    /// Tick until shutdown. Shutdown is only observed between passes, so an
    /// in-flight pass always finishes.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Detection scheduler running every {:?}", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Detection scheduler shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_pass().await;
                }
            }
        }
    }
}
