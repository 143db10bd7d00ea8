// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Vehicles on the same route running too close together

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Alert, AlertDetail, AlertType, Detector};
use crate::config::DetectionConfig;
use crate::error::QueryError;
use crate::geo::{min_distance_for_latitude_gap_km, GeoPoint};
use crate::positions::{ActiveVehicle, PositionGateway};

/// Slack on the latitude pruning bound so rounding never hides a pair
const PRUNE_SLACK_KM: f64 = 1e-9;

/// Two vehicles of one route within the bunching distance
#[derive(Debug, Clone, PartialEq)]
pub struct BunchedPair<'a> {
    /// Lexicographically smaller vehicle id first
    pub first: &'a ActiveVehicle,
    pub second: &'a ActiveVehicle,
    pub distance_km: f64,
}

/// Raises one VEHICLE_BUNCHING alert per pair of same-route vehicles within
/// `bunching_distance_km` of each other.
///
/// Severity is the gap in hundredths of a kilometre (0.32 km scores 32), so
/// unlike the minute-based alerts a *lower* severity is worse. Sort
/// ascending, or use [`super::sort_by_urgency`], to get the tightest
/// bunching first.
pub struct BunchingDetector {
    recency_window_minutes: u64,
    max_distance_km: f64,
}

impl BunchingDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            recency_window_minutes: config.recency_window_minutes,
            max_distance_km: config.bunching_distance_km,
        }
    }

    pub fn classify(&self, rows: &[ActiveVehicle], as_of: DateTime<Utc>) -> Vec<Alert> {
        let mut by_route: BTreeMap<&str, Vec<&ActiveVehicle>> = BTreeMap::new();
        for row in rows {
            by_route.entry(row.route_id.as_str()).or_default().push(row);
        }

        let mut alerts = Vec::new();

        for (route_id, mut vehicles) in by_route {
            for pair in self.close_pairs(&mut vehicles) {
                let location = pair.first.location().midpoint(&pair.second.location());

                alerts.push(Alert {
                    id: Uuid::new_v4(),
                    detail: AlertDetail::VehicleBunching {
                        distance_km: pair.distance_km,
                    },
                    message: format!(
                        "Vehicles {} and {} on route {} are {:.2} km apart",
                        pair.first.vehicle_id, pair.second.vehicle_id, route_id, pair.distance_km
                    ),
                    severity: (pair.distance_km * 100.0).round() as u32,
                    created_at: as_of,
                    route_id: Some(route_id.to_string()),
                    vehicle_ids: vec![pair.first.vehicle_id.clone(), pair.second.vehicle_id.clone()],
                    location: Some(location),
                });
            }
        }

        alerts
    }

    /// Every pair within the bunching distance, ordered by vehicle ids.
    ///
    /// Vehicles are swept in latitude order; once the latitude gap alone
    /// puts the next vehicle out of range, so is every vehicle after it.
    pub fn close_pairs<'a>(&self, vehicles: &mut [&'a ActiveVehicle]) -> Vec<BunchedPair<'a>> {
        vehicles.sort_by(|a, b| {
            a.latitude
                .total_cmp(&b.latitude)
                .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
        });

        let mut pairs = Vec::new();

        for (i, a) in vehicles.iter().enumerate() {
            for b in &vehicles[i + 1..] {
                let gap_bound = min_distance_for_latitude_gap_km(b.latitude - a.latitude);
                if gap_bound > self.max_distance_km + PRUNE_SLACK_KM {
                    break;
                }

                let distance_km = GeoPoint::distance_to(&a.location(), &b.location());
                if distance_km <= self.max_distance_km {
                    let (first, second) = if a.vehicle_id <= b.vehicle_id {
                        (*a, *b)
                    } else {
                        (*b, *a)
                    };
                    pairs.push(BunchedPair {
                        first,
                        second,
                        distance_km,
                    });
                }
            }
        }

        pairs.sort_by(|x, y| {
            x.first
                .vehicle_id
                .cmp(&y.first.vehicle_id)
                .then_with(|| x.second.vehicle_id.cmp(&y.second.vehicle_id))
        });
        pairs
    }
}

#[async_trait]
impl Detector for BunchingDetector {
    fn name(&self) -> &'static str {
        "vehicle_bunching"
    }

    fn alert_type(&self) -> AlertType {
        AlertType::VehicleBunching
    }

    async fn detect(
        &self,
        gateway: &dyn PositionGateway,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Alert>, QueryError> {
        let rows = gateway
            .find_active_vehicles_by_route(self.recency_window_minutes, as_of)
            .await?;
        Ok(self.classify(&rows, as_of))
    }
}
