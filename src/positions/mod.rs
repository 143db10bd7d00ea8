// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Vehicle positions and the query gateway the detectors read through

mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use store::*;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::geo::GeoPoint;

/// Relationship of a vehicle to its current stop, GTFS-realtime naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    IncomingAt,
    StoppedAt,
    InTransitTo,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::IncomingAt => "INCOMING_AT",
            VehicleStatus::StoppedAt => "STOPPED_AT",
            VehicleStatus::InTransitTo => "IN_TRANSIT_TO",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCOMING_AT" => Ok(VehicleStatus::IncomingAt),
            "STOPPED_AT" => Ok(VehicleStatus::StoppedAt),
            "IN_TRANSIT_TO" => Ok(VehicleStatus::InTransitTo),
            other => Err(format!("unknown vehicle status '{}'", other)),
        }
    }
}

/// A single reported vehicle position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: String,
    pub route_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub current_status: VehicleStatus,
    pub timestamp: DateTime<Utc>,
}

impl VehiclePosition {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Vehicle whose latest report is STOPPED_AT and older than the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct StoppedVehicle {
    pub vehicle_id: String,
    pub route_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub minutes_stopped: i64,
}

/// Latest position of a vehicle that reported within the recency window
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveVehicle {
    pub route_id: String,
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ActiveVehicle {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Number of distinct recently active vehicles on a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteVehicleCount {
    pub route_id: String,
    pub count: u32,
}

/// Vehicle that used to report but has gone quiet
#[derive(Debug, Clone, PartialEq)]
pub struct StaleVehicle {
    pub vehicle_id: String,
    pub route_id: String,
    pub last_seen: DateTime<Utc>,
}

/// Read-only queries against the external position store.
///
/// Every query only considers the most recent row per vehicle and measures
/// ages against `as_of`, so one detection pass sees a single consistent "now".
/// An empty result is not an error.
#[async_trait]
pub trait PositionGateway: Send + Sync {
    /// Vehicles stopped at a stop whose last report is older than `minutes`.
    async fn find_stopped_longer_than(
        &self,
        minutes: u64,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StoppedVehicle>, QueryError>;

    /// Latest position of every vehicle that reported within the window.
    async fn find_active_vehicles_by_route(
        &self,
        recency_window_minutes: u64,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ActiveVehicle>, QueryError>;

    /// Active vehicle count per route within the window.
    async fn find_route_vehicle_counts(
        &self,
        recency_window_minutes: u64,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<RouteVehicleCount>, QueryError>;

    /// Vehicles silent for longer than `offline_minutes` that still reported
    /// within `must_have_reported_within_minutes`.
    async fn find_stale_vehicles(
        &self,
        offline_minutes: u64,
        must_have_reported_within_minutes: u64,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StaleVehicle>, QueryError>;
}
