// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Periodic alert statistics

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::alerts::{AlertStatistics, AlertStore};
use crate::config::ReportFormat;
use crate::detection::{Alert, AlertType};

/// Summary emitted by the reporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub captured_at: DateTime<Utc>,
    pub total: u64,
    pub by_type: BTreeMap<AlertType, u64>,
    /// Most recent alerts, newest first
    pub sample: Vec<Alert>,
}

impl StatsReport {
    pub fn from_statistics(stats: &AlertStatistics, sample_size: usize) -> Self {
        Self {
            captured_at: stats.captured_at,
            total: stats.total,
            by_type: stats.counts.clone(),
            sample: stats.latest(sample_size).into_iter().cloned().collect(),
        }
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Alert statistics at {}", self.captured_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "  total: {}", self.total)?;
        for alert_type in AlertType::ALL {
            let count = self.by_type.get(&alert_type).copied().unwrap_or(0);
            writeln!(f, "  {:<20} {}", alert_type.as_str(), count)?;
        }
        if self.sample.is_empty() {
            write!(f, "  no recent alerts")
        } else {
            write!(f, "  recent:")?;
            for alert in &self.sample {
                write!(f, "\n    {}", alert)?;
            }
            Ok(())
        }
    }
}

/// Reads the alert store on its own cadence and logs a summary. Never writes.
pub struct StatsReporter {
    alerts: Arc<AlertStore>,
    interval: Duration,
    sample_size: usize,
    format: ReportFormat,
    reports: AtomicU64,
}

impl StatsReporter {
    pub fn new(
        alerts: Arc<AlertStore>,
        interval: Duration,
        sample_size: usize,
        format: ReportFormat,
    ) -> Self {
        Self {
            alerts,
            interval,
            sample_size,
            format,
            reports: AtomicU64::new(0),
        }
    }

    /// Reports emitted so far
    pub fn reports_emitted(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    pub fn build_report(&self) -> StatsReport {
        StatsReport::from_statistics(&self.alerts.snapshot(), self.sample_size)
    }

    pub fn render(&self, report: &StatsReport) -> String {
        match self.format {
            ReportFormat::Text => report.to_string(),
            ReportFormat::Json => match serde_json::to_string(report) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize statistics report: {}", e);
                    report.to_string()
                }
            },
        }
    }

    /// Build, log and count one report
    pub fn report(&self) -> StatsReport {
        let report = self.build_report();
        info!("{}", self.render(&report));
        self.reports.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Report every interval until shutdown. The first report comes one full
    /// interval after start.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Statistics reporter running every {:?}", self.interval);

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Statistics reporter shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::AlertDetail;
    use uuid::Uuid;

    fn coverage_alert(route: &str, count: u32) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            detail: AlertDetail::LowRouteCoverage {
                active_vehicles: count,
                minimum_required: 2,
            },
            message: format!("Route {} has {} active vehicles, expected at least 2", route, count),
            severity: count,
            created_at: Utc::now(),
            route_id: Some(route.to_string()),
            vehicle_ids: vec![],
            location: None,
        }
    }

    fn populated_store() -> Arc<AlertStore> {
        let store = Arc::new(AlertStore::new(20));
        for i in 0..8 {
            store.record(coverage_alert(&format!("r{}", i), 1));
        }
        store
    }

    #[test]
    fn test_report_samples_newest_first() {
        let reporter = StatsReporter::new(populated_store(), Duration::from_secs(300), 5, ReportFormat::Text);
        let report = reporter.build_report();

        assert_eq!(report.total, 8);
        assert_eq!(report.by_type[&AlertType::LowRouteCoverage], 8);
        assert_eq!(report.by_type[&AlertType::DelayedVehicle], 0);
        assert_eq!(report.sample.len(), 5);
        assert_eq!(report.sample[0].route_id.as_deref(), Some("r7"));
        assert_eq!(report.sample[4].route_id.as_deref(), Some("r3"));
    }

    #[test]
    fn test_reporting_does_not_touch_counts() {
        let store = populated_store();
        let reporter = StatsReporter::new(Arc::clone(&store), Duration::from_secs(300), 5, ReportFormat::Text);
        reporter.report();
        reporter.report();
        assert_eq!(store.total(), 8);
        assert_eq!(reporter.reports_emitted(), 2);
    }

    #[test]
    fn test_text_rendering() {
        let reporter = StatsReporter::new(populated_store(), Duration::from_secs(300), 2, ReportFormat::Text);
        let text = reporter.render(&reporter.build_report());

        assert!(text.contains("total: 8"));
        assert!(text.contains("LOW_ROUTE_COVERAGE"));
        assert!(text.contains("OFFLINE_VEHICLE"));
        assert!(text.contains("Route r7 has 1 active vehicles"));
    }

    #[test]
    fn test_empty_store_text_rendering() {
        let reporter = StatsReporter::new(Arc::new(AlertStore::new(5)), Duration::from_secs(300), 5, ReportFormat::Text);
        let text = reporter.render(&reporter.build_report());
        assert!(text.contains("total: 0"));
        assert!(text.contains("no recent alerts"));
    }

    #[test]
    fn test_json_rendering() {
        let reporter = StatsReporter::new(populated_store(), Duration::from_secs(300), 1, ReportFormat::Json);
        let json = reporter.render(&reporter.build_report());

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total"], 8);
        assert_eq!(value["by_type"]["LOW_ROUTE_COVERAGE"], 8);
        assert_eq!(value["sample"].as_array().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_on_own_cadence() {
        let reporter = Arc::new(StatsReporter::new(
            populated_store(),
            Duration::from_secs(300),
            5,
            ReportFormat::Text,
        ));

        let (tx, rx) = broadcast::channel(1);
        let handle = {
            let reporter = Arc::clone(&reporter);
            tokio::spawn(async move { reporter.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(reporter.reports_emitted(), 0);

        tokio::time::sleep(Duration::from_secs(350)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        // Reports at 300 and 600 seconds
        assert_eq!(reporter.reports_emitted(), 2);
    }
}
