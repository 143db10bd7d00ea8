// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Routes running with too few vehicles

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Alert, AlertDetail, AlertType, Detector};
use crate::config::DetectionConfig;
use crate::error::QueryError;
use crate::positions::{PositionGateway, RouteVehicleCount};

/// Raises LOW_ROUTE_COVERAGE for each route with fewer active vehicles than
/// the minimum. Severity is the vehicle count, so 0 is the worst case.
///
/// Only routes present in the gateway result are evaluated. Whether a route
/// with no recent reports shows up with a count of 0 is up to the gateway.
pub struct RouteCoverageDetector {
    recency_window_minutes: u64,
    minimum_vehicles: u32,
}

impl RouteCoverageDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            recency_window_minutes: config.recency_window_minutes,
            minimum_vehicles: config.minimum_vehicles_per_route,
        }
    }

    pub fn classify(&self, rows: &[RouteVehicleCount], as_of: DateTime<Utc>) -> Vec<Alert> {
        rows.iter()
            .filter(|row| row.count < self.minimum_vehicles)
            .map(|row| Alert {
                id: Uuid::new_v4(),
                detail: AlertDetail::LowRouteCoverage {
                    active_vehicles: row.count,
                    minimum_required: self.minimum_vehicles,
                },
                message: format!(
                    "Route {} has {} active vehicles, expected at least {}",
                    row.route_id, row.count, self.minimum_vehicles
                ),
                severity: row.count,
                created_at: as_of,
                route_id: Some(row.route_id.clone()),
                vehicle_ids: Vec::new(),
                location: None,
            })
            .collect()
    }
}

#[async_trait]
impl Detector for RouteCoverageDetector {
    fn name(&self) -> &'static str {
        "low_route_coverage"
    }

    fn alert_type(&self) -> AlertType {
        AlertType::LowRouteCoverage
    }

    async fn detect(
        &self,
        gateway: &dyn PositionGateway,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Alert>, QueryError> {
        let rows = gateway
            .find_route_vehicle_counts(self.recency_window_minutes, as_of)
            .await?;
        Ok(self.classify(&rows, as_of))
    }
}
