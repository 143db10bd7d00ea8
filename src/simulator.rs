// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Synthetic fleet for demo mode

use chrono::{DateTime, Utc};
use rand::prelude::*;

use crate::positions::{VehiclePosition, VehicleStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behavior {
    Normal,
    /// Stops at a stop on this step and never reports again
    StallsAt(u64),
    /// Stops reporting entirely after this step
    SilentAfter(u64),
}

#[derive(Debug, Clone)]
struct SimVehicle {
    id: String,
    route_id: String,
    origin: (f64, f64),
    heading: (f64, f64),
    /// Head start along the route, in steps
    phase: f64,
    behavior: Behavior,
}

/// Moves a handful of vehicles along straight San Francisco corridors and
/// scripts one of each disruption: a stalled bus on route 14, a bunched pair
/// and a vehicle that goes quiet on route 38, and a lone bus on route 49.
pub struct FleetSimulator {
    vehicles: Vec<SimVehicle>,
    step: u64,
    rng: StdRng,
    jitter_deg: f64,
}

impl FleetSimulator {
    pub fn new(seed: u64) -> Self {
        let mission = ((37.7520, -122.4185), (0.0004, 0.0002));
        let geary = ((37.7810, -122.4700), (0.0, 0.0008));
        let van_ness = ((37.7700, -122.4195), (0.0005, 0.0));

        let vehicle = |id: &str, route: &str, corridor: ((f64, f64), (f64, f64)), phase: f64, behavior| {
            SimVehicle {
                id: id.to_string(),
                route_id: route.to_string(),
                origin: corridor.0,
                heading: corridor.1,
                phase,
                behavior,
            }
        };

        let vehicles = vec![
            vehicle("1401", "14", mission, 0.0, Behavior::Normal),
            vehicle("1402", "14", mission, 50.0, Behavior::Normal),
            vehicle("1403", "14", mission, 100.0, Behavior::StallsAt(3)),
            vehicle("3801", "38", geary, 0.0, Behavior::Normal),
            vehicle("3802", "38", geary, 5.0, Behavior::Normal),
            vehicle("3803", "38", geary, 40.0, Behavior::Normal),
            vehicle("3804", "38", geary, 80.0, Behavior::SilentAfter(5)),
            vehicle("4901", "49", van_ness, 0.0, Behavior::Normal),
        ];

        Self {
            vehicles,
            step: 0,
            rng: StdRng::seed_from_u64(seed),
            jitter_deg: 0.00003,
        }
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn steps_taken(&self) -> u64 {
        self.step
    }

    /// Reports for every vehicle still transmitting, stamped `now`
    pub fn step(&mut self, now: DateTime<Utc>) -> Vec<VehiclePosition> {
        let step = self.step;
        self.step += 1;

        let mut reports = Vec::with_capacity(self.vehicles.len());

        for vehicle in &self.vehicles {
            let progress = match vehicle.behavior {
                Behavior::StallsAt(at) if step > at => continue,
                Behavior::SilentAfter(after) if step > after => continue,
                Behavior::StallsAt(at) => (at.min(step) as f64) + vehicle.phase,
                _ => step as f64 + vehicle.phase,
            };

            let status = match vehicle.behavior {
                Behavior::StallsAt(at) if step == at => VehicleStatus::StoppedAt,
                _ => match step % 4 {
                    0 => VehicleStatus::StoppedAt,
                    3 => VehicleStatus::IncomingAt,
                    _ => VehicleStatus::InTransitTo,
                },
            };

            let jitter_lat = self.rng.gen_range(-self.jitter_deg..self.jitter_deg);
            let jitter_lon = self.rng.gen_range(-self.jitter_deg..self.jitter_deg);

            reports.push(VehiclePosition {
                vehicle_id: vehicle.id.clone(),
                route_id: vehicle.route_id.clone(),
                latitude: vehicle.origin.0 + vehicle.heading.0 * progress + jitter_lat,
                longitude: vehicle.origin.1 + vehicle.heading.1 * progress + jitter_lon,
                current_status: status,
                timestamp: now,
            });
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::distance_km;

    fn find<'a>(reports: &'a [VehiclePosition], id: &str) -> Option<&'a VehiclePosition> {
        reports.iter().find(|r| r.vehicle_id == id)
    }

    #[test]
    fn test_all_vehicles_report_initially() {
        let mut sim = FleetSimulator::new(1);
        let reports = sim.step(Utc::now());
        assert_eq!(reports.len(), sim.vehicle_count());
        assert_eq!(sim.steps_taken(), 1);
    }

    #[test]
    fn test_scripted_disruptions() {
        let mut sim = FleetSimulator::new(1);
        let mut last = Vec::new();
        let mut stalled_report = None;

        for _ in 0..10 {
            last = sim.step(Utc::now());
            if let Some(r) = find(&last, "1403") {
                stalled_report = Some(r.clone());
            }
        }

        // Stalled bus went quiet while stopped at a stop
        assert!(find(&last, "1403").is_none());
        assert_eq!(stalled_report.unwrap().current_status, VehicleStatus::StoppedAt);

        // Silent bus stopped reporting
        assert!(find(&last, "3804").is_none());

        // Bunched pair stays within a kilometre
        let a = find(&last, "3801").unwrap();
        let b = find(&last, "3802").unwrap();
        assert!(distance_km(a.latitude, a.longitude, b.latitude, b.longitude) < 1.0);

        // Route 49 runs a single vehicle
        assert_eq!(last.iter().filter(|r| r.route_id == "49").count(), 1);
    }

    #[test]
    fn test_same_seed_same_fleet() {
        let now = Utc::now();
        let a = FleetSimulator::new(42).step(now);
        let b = FleetSimulator::new(42).step(now);
        assert_eq!(a, b);
    }
}
