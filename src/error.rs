// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/transit-sentinel

//! Error taxonomy for the disruption monitor

use std::time::Duration;
use thiserror::Error;

/// Transient failure of a position store query.
///
/// Detectors recover from these locally: the affected detector contributes
/// no alerts for the current tick and the next tick acts as the retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The query did not complete within the configured timeout
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// The store rejected or failed the query
    #[error("position store error: {0}")]
    Store(String),

    /// The store could not be reached at all
    #[error("position store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                ) =>
            {
                QueryError::Unavailable(err.to_string())
            }
            _ => QueryError::Store(err.to_string()),
        }
    }
}

/// Nonsensical configuration. Fatal at startup.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// A threshold that must be strictly positive was zero, negative or NaN
    #[error("{field} must be positive, got {value}")]
    NonPositive {
        /// Dotted path of the offending setting
        field: &'static str,
        /// Rendered offending value
        value: String,
    },

    /// A setting beyond what the monitor can represent
    #[error("{field} must be at most {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: String,
        max: String,
    },

    /// Two settings contradict each other
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Lifecycle errors surfaced by [`crate::Monitor`].
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration rejected before anything was scheduled
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `start()` called on a monitor that is already running
    #[error("monitor is already running")]
    AlreadyRunning,

    /// A background task panicked or was aborted while draining
    #[error("background task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for MonitorError {
    fn from(err: tokio::task::JoinError) -> Self {
        MonitorError::Join(err.to_string())
    }
}
