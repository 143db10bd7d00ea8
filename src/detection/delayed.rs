// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Vehicles held at a stop for too long

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{capped_severity, Alert, AlertDetail, AlertType, Detector};
use crate::config::DetectionConfig;
use crate::error::QueryError;
use crate::geo::GeoPoint;
use crate::positions::{PositionGateway, StoppedVehicle};

/// Raises one DELAYED_VEHICLE alert per vehicle stopped past the threshold.
/// Severity is the minutes stopped, capped.
pub struct DelayedVehicleDetector {
    threshold_minutes: u64,
    severity_cap: u32,
}

impl DelayedVehicleDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            threshold_minutes: config.stopped_threshold_minutes,
            severity_cap: config.severity_cap,
        }
    }

    pub fn classify(&self, rows: &[StoppedVehicle], as_of: DateTime<Utc>) -> Vec<Alert> {
        rows.iter()
            .map(|row| Alert {
                id: Uuid::new_v4(),
                detail: AlertDetail::DelayedVehicle {
                    minutes_stopped: row.minutes_stopped,
                },
                message: format!(
                    "Vehicle {} on route {} has been stopped for {} minutes",
                    row.vehicle_id, row.route_id, row.minutes_stopped
                ),
                severity: capped_severity(row.minutes_stopped, self.severity_cap),
                created_at: as_of,
                route_id: Some(row.route_id.clone()),
                vehicle_ids: vec![row.vehicle_id.clone()],
                location: Some(GeoPoint::new(row.latitude, row.longitude)),
            })
            .collect()
    }
}

#[async_trait]
impl Detector for DelayedVehicleDetector {
    fn name(&self) -> &'static str {
        "delayed_vehicle"
    }

    fn alert_type(&self) -> AlertType {
        AlertType::DelayedVehicle
    }

    async fn detect(
        &self,
        gateway: &dyn PositionGateway,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Alert>, QueryError> {
        let rows = gateway
            .find_stopped_longer_than(self.threshold_minutes, as_of)
            .await?;
        Ok(self.classify(&rows, as_of))
    }
}
