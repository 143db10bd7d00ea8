// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Alert store - bounded recent alerts plus lifetime counters

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::detection::{Alert, AlertType};

/// Point-in-time copy of the alert counters and recent alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    /// Alerts recorded per type since the process started
    pub counts: BTreeMap<AlertType, u64>,
    pub total: u64,
    /// Most recent alerts, oldest first
    pub recent: Vec<Alert>,
    pub captured_at: DateTime<Utc>,
}

impl AlertStatistics {
    pub fn count(&self, alert_type: AlertType) -> u64 {
        self.counts.get(&alert_type).copied().unwrap_or(0)
    }

    /// Up to `limit` alerts, newest first
    pub fn latest(&self, limit: usize) -> Vec<&Alert> {
        self.recent.iter().rev().take(limit).collect()
    }
}

struct StoreInner {
    counts: BTreeMap<AlertType, u64>,
    total: u64,
    recent: VecDeque<Alert>,
}

/// Shared between the detection scheduler (writer) and the reporter (reader).
///
/// Counters only ever grow. The recent list keeps the last `capacity` alerts
/// and drops the oldest on overflow.
pub struct AlertStore {
    inner: Mutex<StoreInner>,
    capacity: usize,
}

impl AlertStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let counts = AlertType::ALL.iter().map(|t| (*t, 0)).collect();

        Self {
            inner: Mutex::new(StoreInner {
                counts,
                total: 0,
                recent: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, alert: Alert) {
        let mut inner = self.inner.lock();
        Self::push(&mut inner, alert, self.capacity);
    }

    /// Record a batch under a single lock, so a snapshot sees all or none of it
    pub fn record_all<I>(&self, alerts: I) -> usize
    where
        I: IntoIterator<Item = Alert>,
    {
        let mut inner = self.inner.lock();
        let mut recorded = 0;
        for alert in alerts {
            Self::push(&mut inner, alert, self.capacity);
            recorded += 1;
        }
        recorded
    }

    fn push(inner: &mut StoreInner, alert: Alert, capacity: usize) {
        *inner.counts.entry(alert.alert_type()).or_insert(0) += 1;
        inner.total += 1;

        if inner.recent.len() == capacity {
            inner.recent.pop_front();
        }
        inner.recent.push_back(alert);
    }

    pub fn snapshot(&self) -> AlertStatistics {
        let inner = self.inner.lock();
        AlertStatistics {
            counts: inner.counts.clone(),
            total: inner.total,
            recent: inner.recent.iter().cloned().collect(),
            captured_at: Utc::now(),
        }
    }

    pub fn total(&self) -> u64 {
        self.inner.lock().total
    }
}
