// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Scriptable gateway for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ActiveVehicle, PositionGateway, RouteVehicleCount, StaleVehicle, StoppedVehicle};
use crate::error::QueryError;

/// One of the four gateway queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Stopped,
    Active,
    Counts,
    Stale,
}

/// Returns canned rows (or errors) for each query and counts calls.
#[derive(Default)]
pub struct FakeGateway {
    stopped: Option<Result<Vec<StoppedVehicle>, QueryError>>,
    active: Option<Result<Vec<ActiveVehicle>, QueryError>>,
    counts: Option<Result<Vec<RouteVehicleCount>, QueryError>>,
    stale: Option<Result<Vec<StaleVehicle>, QueryError>>,
    latency: Vec<(Query, Duration)>,
    calls: AtomicUsize,
}

impl FakeGateway {
    pub fn with_stopped(mut self, rows: Result<Vec<StoppedVehicle>, QueryError>) -> Self {
        self.stopped = Some(rows);
        self
    }

    pub fn with_active(mut self, rows: Result<Vec<ActiveVehicle>, QueryError>) -> Self {
        self.active = Some(rows);
        self
    }

    pub fn with_counts(mut self, rows: Result<Vec<RouteVehicleCount>, QueryError>) -> Self {
        self.counts = Some(rows);
        self
    }

    pub fn with_stale(mut self, rows: Result<Vec<StaleVehicle>, QueryError>) -> Self {
        self.stale = Some(rows);
        self
    }

    /// `query` sleeps this long before answering
    pub fn with_latency(mut self, query: Query, latency: Duration) -> Self {
        self.latency.push((query, latency));
        self
    }

    /// Total queries answered so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer<T: Clone>(
        &self,
        query: Query,
        canned: &Option<Result<Vec<T>, QueryError>>,
    ) -> Result<Vec<T>, QueryError> {
        let latency = self.latency.iter().find(|(q, _)| *q == query).map(|(_, d)| *d);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        canned.clone().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[async_trait]
impl PositionGateway for FakeGateway {
    async fn find_stopped_longer_than(
        &self,
        _minutes: u64,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<StoppedVehicle>, QueryError> {
        self.answer(Query::Stopped, &self.stopped).await
    }

    async fn find_active_vehicles_by_route(
        &self,
        _recency_window_minutes: u64,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<ActiveVehicle>, QueryError> {
        self.answer(Query::Active, &self.active).await
    }

    async fn find_route_vehicle_counts(
        &self,
        _recency_window_minutes: u64,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<RouteVehicleCount>, QueryError> {
        self.answer(Query::Counts, &self.counts).await
    }

    async fn find_stale_vehicles(
        &self,
        _offline_minutes: u64,
        _must_have_reported_within_minutes: u64,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<StaleVehicle>, QueryError> {
        self.answer(Query::Stale, &self.stale).await
    }
}
