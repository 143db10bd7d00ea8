// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Vehicles that stopped reporting

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{capped_severity, Alert, AlertDetail, AlertType, Detector};
use crate::config::DetectionConfig;
use crate::error::QueryError;
use crate::positions::{PositionGateway, StaleVehicle};

/// Raises OFFLINE_VEHICLE for vehicles that were recently part of the active
/// fleet but have been silent past the threshold. Severity is whole minutes
/// since the last report.
pub struct OfflineVehicleDetector {
    offline_minutes: u64,
    active_window_minutes: u64,
    severity_cap: u32,
}

impl OfflineVehicleDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            offline_minutes: config.offline_threshold_minutes,
            active_window_minutes: config.active_window_minutes,
            severity_cap: config.severity_cap,
        }
    }

    pub fn classify(&self, rows: &[StaleVehicle], as_of: DateTime<Utc>) -> Vec<Alert> {
        rows.iter()
            .map(|row| {
                // num_minutes truncates, which floors for the non-negative case
                let minutes = (as_of - row.last_seen).num_minutes().max(0);

                Alert {
                    id: Uuid::new_v4(),
                    detail: AlertDetail::OfflineVehicle {
                        minutes_offline: minutes,
                        last_seen: row.last_seen,
                    },
                    message: format!(
                        "Vehicle {} on route {} has not reported for {} minutes (last seen {})",
                        row.vehicle_id,
                        row.route_id,
                        minutes,
                        row.last_seen.format("%H:%M:%S UTC")
                    ),
                    severity: capped_severity(minutes, self.severity_cap),
                    created_at: as_of,
                    route_id: Some(row.route_id.clone()),
                    vehicle_ids: vec![row.vehicle_id.clone()],
                    location: None,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Detector for OfflineVehicleDetector {
    fn name(&self) -> &'static str {
        "offline_vehicle"
    }

    fn alert_type(&self) -> AlertType {
        AlertType::OfflineVehicle
    }

    async fn detect(
        &self,
        gateway: &dyn PositionGateway,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Alert>, QueryError> {
        let rows = gateway
            .find_stale_vehicles(self.offline_minutes, self.active_window_minutes, as_of)
            .await?;
        Ok(self.classify(&rows, as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap()
    }

    fn stale(vehicle: &str, last_seen: DateTime<Utc>) -> StaleVehicle {
        StaleVehicle {
            vehicle_id: vehicle.to_string(),
            route_id: "38".to_string(),
            last_seen,
        }
    }

    #[test]
    fn test_severity_is_minutes_since_last_report() {
        let detector = OfflineVehicleDetector::new(&DetectionConfig::default());
        let alerts = detector.classify(&[stale("bus-7", as_of() - Duration::minutes(18))], as_of());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type(), AlertType::OfflineVehicle);
        assert_eq!(alerts[0].severity, 18);
        assert_eq!(alerts[0].vehicle_ids, vec!["bus-7".to_string()]);
        assert!(alerts[0].location.is_none());
    }

    #[test]
    fn test_partial_minutes_floor() {
        let detector = OfflineVehicleDetector::new(&DetectionConfig::default());
        let last_seen = as_of() - Duration::seconds(18 * 60 + 59);
        let alerts = detector.classify(&[stale("bus-7", last_seen)], as_of());
        assert_eq!(alerts[0].severity, 18);
    }

    #[test]
    fn test_future_timestamp_scores_zero() {
        let detector = OfflineVehicleDetector::new(&DetectionConfig::default());
        let alerts = detector.classify(&[stale("bus-7", as_of() + Duration::minutes(2))], as_of());
        assert_eq!(alerts[0].severity, 0);
    }
}
