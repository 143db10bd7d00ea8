// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! SQLite-backed position store

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, InterruptHandle};
use tracing::{debug, info, warn};

use super::{
    ActiveVehicle, PositionGateway, RouteVehicleCount, StaleVehicle, StoppedVehicle,
    VehiclePosition, VehicleStatus,
};
use crate::config::DatabaseConfig;
use crate::error::QueryError;

/// Latest row per vehicle. Ties on `reported_at` go to the last inserted row.
const LATEST_PER_VEHICLE: &str = r#"
    WITH latest AS (
        SELECT vehicle_id, route_id, latitude, longitude, current_status, reported_at,
               ROW_NUMBER() OVER (
                   PARTITION BY vehicle_id ORDER BY reported_at DESC, id DESC
               ) AS rn
        FROM vehicle_positions
    )
"#;

/// Position store on a single SQLite connection.
///
/// Queries run on the blocking pool and are bounded by `query_timeout`; a
/// query that overruns is interrupted and reported as [`QueryError::Timeout`].
#[derive(Clone)]
pub struct SqlitePositionStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    query_timeout: Duration,
}

impl SqlitePositionStore {
    /// Open or create the store on disk
    pub fn open(config: &DatabaseConfig, query_timeout: Duration) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let store = Self::from_connection(conn, query_timeout)?;
        info!("Position store opened at {:?}", config.path);
        Ok(store)
    }

    /// Fresh store that lives only as long as this handle and its clones
    pub fn open_in_memory(query_timeout: Duration) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, query_timeout)
    }

    fn from_connection(conn: Connection, query_timeout: Duration) -> Result<Self> {
        Self::create_tables(&conn)?;
        let interrupt = conn.get_interrupt_handle();

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt: Arc::new(interrupt),
            query_timeout,
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vehicle_positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                vehicle_id TEXT NOT NULL,
                route_id TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                current_status TEXT NOT NULL,
                reported_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_positions_vehicle
                ON vehicle_positions(vehicle_id, reported_at);
            CREATE INDEX IF NOT EXISTS idx_positions_reported
                ON vehicle_positions(reported_at);
            CREATE INDEX IF NOT EXISTS idx_positions_route
                ON vehicle_positions(route_id);
        "#,
        )?;

        Ok(())
    }

    /// Store a single position report
    pub fn record_position(&self, position: &VehiclePosition) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO vehicle_positions
                (vehicle_id, route_id, latitude, longitude, current_status, reported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                position.vehicle_id,
                position.route_id,
                position.latitude,
                position.longitude,
                position.current_status.as_str(),
                position.timestamp.timestamp(),
            ],
        )?;

        Ok(())
    }

    /// Store many position reports in one transaction
    pub fn record_positions_batch(&self, positions: &[VehiclePosition]) -> Result<usize> {
        let conn = self.conn.lock();

        let tx = conn.unchecked_transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO vehicle_positions
                    (vehicle_id, route_id, latitude, longitude, current_status, reported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for position in positions {
                stmt.execute(params![
                    position.vehicle_id,
                    position.route_id,
                    position.latitude,
                    position.longitude,
                    position.current_status.as_str(),
                    position.timestamp.timestamp(),
                ])?;
                count += 1;
            }
        }

        tx.commit()?;
        debug!("Stored {} position reports", count);
        Ok(count)
    }

    /// Delete reports older than `cutoff`
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();

        let deleted = conn.execute(
            "DELETE FROM vehicle_positions WHERE reported_at < ?1",
            params![cutoff.timestamp()],
        )?;

        if deleted > 0 {
            info!("Pruned {} position reports older than {}", deleted, cutoff);
        }
        Ok(deleted)
    }

    /// Row and cardinality counts
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();

        let (positions, vehicles, routes): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT vehicle_id), COUNT(DISTINCT route_id)
             FROM vehicle_positions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(StoreStats {
            position_count: positions as usize,
            vehicle_count: vehicles as usize,
            route_count: routes as usize,
        })
    }

    async fn run_query<T, F>(&self, name: &'static str, query: F) -> Result<T, QueryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let ticket = QueryTicket::new(Arc::clone(&self.interrupt));
        let state = Arc::clone(&ticket.state);
        let conn = Arc::clone(&self.conn);

        let task = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            {
                let mut state = state.lock();
                if *state == CallState::Abandoned {
                    return None;
                }
                *state = CallState::Running;
            }
            // Dropped before `guard`, so Done is set while the connection is still held
            let _done = MarkDone(state);
            Some(query(&*guard))
        });

        match tokio::time::timeout(self.query_timeout, task).await {
            Ok(Ok(Some(result))) => result.map_err(QueryError::from),
            Ok(Ok(None)) => Err(QueryError::Timeout(self.query_timeout)),
            Ok(Err(e)) => Err(QueryError::Store(format!("{} query task failed: {}", name, e))),
            Err(_) => {
                if ticket.abandon() {
                    warn!("{} query exceeded {:?}, interrupted", name, self.query_timeout);
                } else {
                    warn!(
                        "{} query still waiting for the connection after {:?}, skipped",
                        name, self.query_timeout
                    );
                }
                Err(QueryError::Timeout(self.query_timeout))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Queued,
    Running,
    Done,
    Abandoned,
}

/// Caller's handle on one blocking query.
///
/// The connection is shared, so the interrupt is only sent while this call's
/// own statement holds it. Dropping the ticket (timeout, or the caller's
/// future being cancelled) abandons the call.
struct QueryTicket {
    state: Arc<Mutex<CallState>>,
    interrupt: Arc<InterruptHandle>,
}

impl QueryTicket {
    fn new(interrupt: Arc<InterruptHandle>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CallState::Queued)),
            interrupt,
        }
    }

    /// Skip the query if it has not started, interrupt it if it is running.
    /// Returns whether an interrupt was sent.
    fn abandon(&self) -> bool {
        // Held across interrupt() so the query cannot finish and hand the
        // connection to another statement in between
        let mut state = self.state.lock();
        match *state {
            CallState::Queued => {
                *state = CallState::Abandoned;
                false
            }
            CallState::Running => {
                self.interrupt.interrupt();
                *state = CallState::Abandoned;
                true
            }
            CallState::Done | CallState::Abandoned => false,
        }
    }
}

/// Flags a started call finished, including when the query panics
struct MarkDone(Arc<Mutex<CallState>>);

impl Drop for MarkDone {
    fn drop(&mut self) {
        *self.0.lock() = CallState::Done;
    }
}

impl Drop for QueryTicket {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// Unix-seconds instant `minutes` before `as_of`
fn cutoff_secs(as_of: DateTime<Utc>, minutes: u64) -> i64 {
    let offset = i64::try_from(minutes).unwrap_or(i64::MAX).saturating_mul(60);
    as_of.timestamp().saturating_sub(offset)
}

fn instant_from_secs(secs: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(column, secs))
}

#[async_trait]
impl PositionGateway for SqlitePositionStore {
    async fn find_stopped_longer_than(
        &self,
        minutes: u64,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StoppedVehicle>, QueryError> {
        let now = as_of.timestamp();
        let cutoff = cutoff_secs(as_of, minutes);

        self.run_query("stopped_vehicles", move |conn| {
            let sql = format!(
                "{LATEST_PER_VEHICLE}
                 SELECT vehicle_id, route_id, latitude, longitude, (?1 - reported_at) / 60
                 FROM latest
                 WHERE rn = 1 AND current_status = ?2 AND reported_at < ?3
                 ORDER BY vehicle_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![now, VehicleStatus::StoppedAt.as_str(), cutoff],
                |row| {
                    Ok(StoppedVehicle {
                        vehicle_id: row.get(0)?,
                        route_id: row.get(1)?,
                        latitude: row.get(2)?,
                        longitude: row.get(3)?,
                        minutes_stopped: row.get(4)?,
                    })
                },
            )?;
            rows.collect()
        })
        .await
    }

    async fn find_active_vehicles_by_route(
        &self,
        recency_window_minutes: u64,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ActiveVehicle>, QueryError> {
        let cutoff = cutoff_secs(as_of, recency_window_minutes);

        self.run_query("active_vehicles", move |conn| {
            let sql = format!(
                "{LATEST_PER_VEHICLE}
                 SELECT route_id, vehicle_id, latitude, longitude
                 FROM latest
                 WHERE rn = 1 AND reported_at >= ?1
                 ORDER BY route_id, vehicle_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok(ActiveVehicle {
                    route_id: row.get(0)?,
                    vehicle_id: row.get(1)?,
                    latitude: row.get(2)?,
                    longitude: row.get(3)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn find_route_vehicle_counts(
        &self,
        recency_window_minutes: u64,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<RouteVehicleCount>, QueryError> {
        let cutoff = cutoff_secs(as_of, recency_window_minutes);

        // Every route the store has seen is reported, with 0 when nothing on
        // it is currently active.
        self.run_query("route_vehicle_counts", move |conn| {
            let sql = format!(
                "{LATEST_PER_VEHICLE},
                 active AS (
                     SELECT route_id, COUNT(*) AS vehicles
                     FROM latest
                     WHERE rn = 1 AND reported_at >= ?1
                     GROUP BY route_id
                 )
                 SELECT known.route_id, COALESCE(active.vehicles, 0)
                 FROM (SELECT DISTINCT route_id FROM vehicle_positions) AS known
                 LEFT JOIN active ON active.route_id = known.route_id
                 ORDER BY known.route_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![cutoff], |row| {
                let vehicles: i64 = row.get(1)?;
                Ok(RouteVehicleCount {
                    route_id: row.get(0)?,
                    count: u32::try_from(vehicles).unwrap_or(u32::MAX),
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn find_stale_vehicles(
        &self,
        offline_minutes: u64,
        must_have_reported_within_minutes: u64,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StaleVehicle>, QueryError> {
        let offline_cutoff = cutoff_secs(as_of, offline_minutes);
        let seen_cutoff = cutoff_secs(as_of, must_have_reported_within_minutes);

        self.run_query("stale_vehicles", move |conn| {
            let sql = format!(
                "{LATEST_PER_VEHICLE}
                 SELECT vehicle_id, route_id, reported_at
                 FROM latest
                 WHERE rn = 1 AND reported_at < ?1 AND reported_at >= ?2
                 ORDER BY vehicle_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![offline_cutoff, seen_cutoff], |row| {
                Ok(StaleVehicle {
                    vehicle_id: row.get(0)?,
                    route_id: row.get(1)?,
                    last_seen: instant_from_secs(row.get(2)?, 2)?,
                })
            })?;
            rows.collect()
        })
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub position_count: usize,
    pub vehicle_count: usize,
    pub route_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap()
    }

    fn report(
        vehicle: &str,
        route: &str,
        status: VehicleStatus,
        minutes_ago: i64,
    ) -> VehiclePosition {
        VehiclePosition {
            vehicle_id: vehicle.to_string(),
            route_id: route.to_string(),
            latitude: 37.7580,
            longitude: -122.4278,
            current_status: status,
            timestamp: as_of() - ChronoDuration::minutes(minutes_ago),
        }
    }

    fn store_with(positions: &[VehiclePosition]) -> SqlitePositionStore {
        let store = SqlitePositionStore::open_in_memory(Duration::from_secs(5)).unwrap();
        store.record_positions_batch(positions).unwrap();
        store
    }

    #[tokio::test]
    async fn test_stopped_uses_latest_report_only() {
        let store = store_with(&[
            report("bus-1", "14", VehicleStatus::StoppedAt, 12),
            report("bus-2", "14", VehicleStatus::StoppedAt, 3),
            // bus-3 was stopped long ago but has moved on since
            report("bus-3", "38", VehicleStatus::StoppedAt, 40),
            report("bus-3", "38", VehicleStatus::InTransitTo, 1),
            report("bus-4", "38", VehicleStatus::InTransitTo, 30),
        ]);

        let rows = store.find_stopped_longer_than(5, as_of()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vehicle_id, "bus-1");
        assert_eq!(rows[0].route_id, "14");
        assert_eq!(rows[0].minutes_stopped, 12);
    }

    #[tokio::test]
    async fn test_active_vehicles_respect_window() {
        let store = store_with(&[
            report("bus-1", "14", VehicleStatus::InTransitTo, 10),
            report("bus-1", "14", VehicleStatus::InTransitTo, 2),
            report("bus-2", "14", VehicleStatus::StoppedAt, 4),
            report("bus-3", "38", VehicleStatus::InTransitTo, 9),
        ]);

        let rows = store.find_active_vehicles_by_route(5, as_of()).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.vehicle_id.as_str()).collect();
        assert_eq!(ids, vec!["bus-1", "bus-2"]);
    }

    #[tokio::test]
    async fn test_route_counts_include_known_idle_routes() {
        let store = store_with(&[
            report("bus-1", "14", VehicleStatus::InTransitTo, 1),
            report("bus-2", "14", VehicleStatus::InTransitTo, 2),
            report("bus-3", "38", VehicleStatus::InTransitTo, 1),
            report("bus-4", "49", VehicleStatus::InTransitTo, 45),
        ]);

        let rows = store.find_route_vehicle_counts(5, as_of()).await.unwrap();
        assert_eq!(
            rows,
            vec![
                RouteVehicleCount { route_id: "14".into(), count: 2 },
                RouteVehicleCount { route_id: "38".into(), count: 1 },
                RouteVehicleCount { route_id: "49".into(), count: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_route_counts_follow_route_changes() {
        // A vehicle reassigned mid-shift only counts on its current route
        let store = store_with(&[
            report("bus-1", "14", VehicleStatus::InTransitTo, 4),
            report("bus-1", "38", VehicleStatus::InTransitTo, 1),
        ]);

        let rows = store.find_route_vehicle_counts(5, as_of()).await.unwrap();
        assert_eq!(rows[0], RouteVehicleCount { route_id: "14".into(), count: 0 });
        assert_eq!(rows[1], RouteVehicleCount { route_id: "38".into(), count: 1 });
    }

    #[tokio::test]
    async fn test_stale_vehicles_exclude_never_active() {
        let store = store_with(&[
            report("bus-1", "14", VehicleStatus::InTransitTo, 18),
            report("bus-2", "14", VehicleStatus::InTransitTo, 2),
            report("bus-3", "38", VehicleStatus::InTransitTo, 500),
        ]);

        let rows = store.find_stale_vehicles(15, 60, as_of()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vehicle_id, "bus-1");
        assert_eq!(rows[0].last_seen, as_of() - ChronoDuration::minutes(18));
    }

    #[tokio::test]
    async fn test_empty_store_returns_no_rows() {
        let store = store_with(&[]);
        assert!(store.find_stopped_longer_than(5, as_of()).await.unwrap().is_empty());
        assert!(store.find_active_vehicles_by_route(5, as_of()).await.unwrap().is_empty());
        assert!(store.find_route_vehicle_counts(5, as_of()).await.unwrap().is_empty());
        assert!(store.find_stale_vehicles(15, 60, as_of()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_query_times_out() {
        let store = SqlitePositionStore::open_in_memory(Duration::from_millis(50)).unwrap();

        // Hold the connection so the query cannot start
        let guard = store.conn.lock();
        let result = store.find_stopped_longer_than(5, as_of()).await;
        drop(guard);

        assert!(matches!(result, Err(QueryError::Timeout(d)) if d == Duration::from_millis(50)));
    }

    /// Runs for well over the test timeouts
    const LONG_STATEMENT: &str = "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 3000000)
         SELECT COUNT(*) FROM n";

    #[tokio::test]
    async fn test_queued_timeout_leaves_other_statement_alone() {
        let store = store_with(&[report("bus-1", "14", VehicleStatus::StoppedAt, 120)]);
        let store = SqlitePositionStore {
            query_timeout: Duration::from_millis(20),
            ..store
        };

        // Another user of the connection is mid-statement when the query times out
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let writer = {
            let conn = Arc::clone(&store.conn);
            std::thread::spawn(move || {
                let conn = conn.lock();
                started_tx.send(()).unwrap();
                let counted: rusqlite::Result<i64> =
                    conn.query_row(LONG_STATEMENT, [], |row| row.get(0));
                let pruned = conn.execute("DELETE FROM vehicle_positions WHERE reported_at < ?1", params![i64::MAX]);
                (counted, pruned)
            })
        };
        started_rx.recv().unwrap();

        let result = store.find_stopped_longer_than(5, as_of()).await;
        assert!(matches!(result, Err(QueryError::Timeout(_))));

        let (counted, pruned) = writer.join().unwrap();
        assert_eq!(counted.unwrap(), 3_000_000);
        assert_eq!(pruned.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_running_query_is_interrupted_on_timeout() {
        let store = SqlitePositionStore::open_in_memory(Duration::from_millis(20)).unwrap();

        let result = store
            .run_query("long", |conn| conn.query_row(LONG_STATEMENT, [], |row| row.get::<_, i64>(0)))
            .await;
        assert!(matches!(result, Err(QueryError::Timeout(_))));

        // The connection is usable again once the interrupted statement unwinds
        let store = SqlitePositionStore {
            query_timeout: Duration::from_secs(5),
            ..store
        };
        assert!(store.find_route_vehicle_counts(5, as_of()).await.unwrap().is_empty());
    }

    #[test]
    fn test_abandon_before_start_skips_without_interrupt() {
        let store = SqlitePositionStore::open_in_memory(Duration::from_secs(5)).unwrap();
        let ticket = QueryTicket::new(Arc::clone(&store.interrupt));

        assert!(!ticket.abandon());
        assert_eq!(*ticket.state.lock(), CallState::Abandoned);

        let ticket = QueryTicket::new(Arc::clone(&store.interrupt));
        *ticket.state.lock() = CallState::Running;
        assert!(ticket.abandon());

        let ticket = QueryTicket::new(Arc::clone(&store.interrupt));
        *ticket.state.lock() = CallState::Done;
        assert!(!ticket.abandon());
    }

    #[test]
    fn test_stats_and_prune() {
        let store = store_with(&[
            report("bus-1", "14", VehicleStatus::InTransitTo, 120),
            report("bus-1", "14", VehicleStatus::InTransitTo, 1),
            report("bus-2", "38", VehicleStatus::StoppedAt, 1),
        ]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.position_count, 3);
        assert_eq!(stats.vehicle_count, 2);
        assert_eq!(stats.route_count, 2);

        let deleted = store.prune_older_than(as_of() - ChronoDuration::minutes(60)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.stats().unwrap().position_count, 2);
    }
}
