// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Detection module - disruption rules and the alerts they raise

mod bunching;
mod coverage;
mod delayed;
mod offline;

pub use bunching::*;
pub use coverage::*;
pub use delayed::*;
pub use offline::*;

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::DetectionConfig;
use crate::error::QueryError;
use crate::geo::GeoPoint;
use crate::positions::PositionGateway;

/// Kind of service disruption
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    DelayedVehicle,
    VehicleBunching,
    LowRouteCoverage,
    OfflineVehicle,
}

impl AlertType {
    pub const ALL: [AlertType; 4] = [
        AlertType::DelayedVehicle,
        AlertType::VehicleBunching,
        AlertType::LowRouteCoverage,
        AlertType::OfflineVehicle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::DelayedVehicle => "DELAYED_VEHICLE",
            AlertType::VehicleBunching => "VEHICLE_BUNCHING",
            AlertType::LowRouteCoverage => "LOW_ROUTE_COVERAGE",
            AlertType::OfflineVehicle => "OFFLINE_VEHICLE",
        }
    }

    /// Which end of the severity scale is worse for this type.
    ///
    /// Minute-based alerts grow with the problem. Bunching severity is the
    /// gap in hundredths of a kilometre and coverage severity is the vehicle
    /// count, so for those the smallest number is the worst case.
    pub fn severity_order(&self) -> SeverityOrder {
        match self {
            AlertType::DelayedVehicle | AlertType::OfflineVehicle => SeverityOrder::HigherIsWorse,
            AlertType::VehicleBunching | AlertType::LowRouteCoverage => SeverityOrder::LowerIsWorse,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polarity of an alert type's severity scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeverityOrder {
    HigherIsWorse,
    LowerIsWorse,
}

/// Rule-specific facts behind an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertDetail {
    DelayedVehicle {
        minutes_stopped: i64,
    },
    VehicleBunching {
        distance_km: f64,
    },
    LowRouteCoverage {
        active_vehicles: u32,
        minimum_required: u32,
    },
    OfflineVehicle {
        minutes_offline: i64,
        last_seen: DateTime<Utc>,
    },
}

impl AlertDetail {
    pub fn alert_type(&self) -> AlertType {
        match self {
            AlertDetail::DelayedVehicle { .. } => AlertType::DelayedVehicle,
            AlertDetail::VehicleBunching { .. } => AlertType::VehicleBunching,
            AlertDetail::LowRouteCoverage { .. } => AlertType::LowRouteCoverage,
            AlertDetail::OfflineVehicle { .. } => AlertType::OfflineVehicle,
        }
    }
}

/// A raised disruption alert. Never modified once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub detail: AlertDetail,
    pub message: String,
    pub severity: u32,
    pub created_at: DateTime<Utc>,
    pub route_id: Option<String>,
    /// Empty for route alerts, one id for vehicle alerts, two for a bunched pair
    pub vehicle_ids: Vec<String>,
    pub location: Option<GeoPoint>,
}

impl Alert {
    pub fn alert_type(&self) -> AlertType {
        self.detail.alert_type()
    }

    /// Worst-first ordering. Groups by type, then applies the type's severity polarity.
    pub fn cmp_urgency(&self, other: &Alert) -> Ordering {
        self.alert_type()
            .cmp(&other.alert_type())
            .then_with(|| match self.alert_type().severity_order() {
                SeverityOrder::HigherIsWorse => other.severity.cmp(&self.severity),
                SeverityOrder::LowerIsWorse => self.severity.cmp(&other.severity),
            })
            .then_with(|| self.created_at.cmp(&other.created_at))
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (severity {})",
            self.alert_type(),
            self.message,
            self.severity
        )
    }
}

/// Sort alerts worst-first, see [`Alert::cmp_urgency`]
pub fn sort_by_urgency(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| a.cmp_urgency(b));
}

/// Clamp a minute count into `0..=cap`
pub(crate) fn capped_severity(value: i64, cap: u32) -> u32 {
    value.clamp(0, i64::from(cap)) as u32
}

/// One disruption rule: a gateway query followed by a pure classification
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn alert_type(&self) -> AlertType;

    async fn detect(
        &self,
        gateway: &dyn PositionGateway,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Alert>, QueryError>;
}

/// Result of running every detector once
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub alerts: Vec<Alert>,
    /// Detectors that contributed nothing because they failed
    pub failed: Vec<&'static str>,
}

/// The four disruption rules, run together each tick
pub struct DetectorSet {
    detectors: Vec<Box<dyn Detector>>,
    /// Upper bound on each detector's run, whatever gateway it reads
    timeout: Option<Duration>,
}

impl DetectorSet {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(vec![
            Box::new(DelayedVehicleDetector::new(config)),
            Box::new(BunchingDetector::new(config)),
            Box::new(RouteCoverageDetector::new(config)),
            Box::new(OfflineVehicleDetector::new(config)),
        ])
    }

    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self {
            detectors,
            timeout: None,
        }
    }

    /// Fail any detector still running after `timeout` with [`QueryError::Timeout`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run all detectors concurrently. A failing or panicking detector is
    /// logged and skipped; the others still contribute.
    pub async fn run_pass(&self, gateway: &dyn PositionGateway, as_of: DateTime<Utc>) -> PassOutcome {
        let timeout = self.timeout;
        let runs = self.detectors.iter().map(|detector| async move {
            let run = AssertUnwindSafe(detector.detect(gateway, as_of)).catch_unwind();
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => Ok(Err(QueryError::Timeout(limit))),
                },
                None => run.await,
            };
            (detector.name(), result)
        });

        let mut outcome = PassOutcome::default();

        for (name, result) in join_all(runs).await {
            match result {
                Ok(Ok(alerts)) => {
                    debug!("Detector {} raised {} alerts", name, alerts.len());
                    outcome.alerts.extend(alerts);
                }
                Ok(Err(e)) => {
                    warn!("Detector {} skipped this tick: {}", name, e);
                    outcome.failed.push(name);
                }
                Err(panic) => {
                    error!(
                        "Detector {} panicked at {}: {}",
                        name,
                        as_of,
                        panic_message(&*panic)
                    );
                    outcome.failed.push(name);
                }
            }
        }

        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
