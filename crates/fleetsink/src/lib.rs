// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fleet Telemetry Bridge
//!
//! Routes vehicle telemetry from a publish/subscribe stream into relational
//! storage: one routing table, one eager store connection per destination,
//! one transaction per message.
//!
//! # Features
//!
//! - **Exact-match routing** -- JSON routing table, topic equality, fan-out
//!   to every matching destination
//! - **Transactional inserts** -- prepare/bind/execute/commit as one unit
//!   with step-tagged failures
//! - **Swallowed per-message errors** -- every failure becomes one outcome
//!   log line; the transport never observes an error
//! - **SQLite backend** -- embedded, zero external services
//!
//! # Architecture
//!
//! ```text
//! Bridge
//! +-- RoutingTable       (immutable topic -> destination bindings)
//! +-- Dispatcher
//!     +-- Destination    (one per binding)
//!         +-- SqliteStore (single eager connection, Mutex-serialized)
//!         +-- OutcomeLog  (append-only per-destination log)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fleetsink::Bridge;
//!
//! let bridge = Bridge::open("routes.json")?;
//! bridge.dispatch(
//!     "cars/telemetry",
//!     br#"{"VIN":"V1","TripID":"T1","telemetry":{"speed":10}}"#,
//! );
//! bridge.close();
//! ```

pub mod config;
pub mod decode;
pub mod dispatch;
pub mod outcome;
pub mod sqlite;
pub mod store;

pub use config::{ConfigError, Credentials, DestinationConfig, RoutingTable};
pub use decode::{decode, DecodeError, TelemetryRecord};
pub use dispatch::{Destination, DestinationStatsSnapshot, Dispatcher, ValidationError};
pub use outcome::OutcomeLog;
pub use sqlite::{store_path, SqliteStore, TelemetryRow};
pub use store::{ConnectError, PersistError, PersistStep, TelemetryStore};

use std::path::Path;
use thiserror::Error;

/// Bridge startup errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No destination available: all {attempted} connection(s) failed at startup")]
    NoAvailableDestination { attempted: usize },
}

/// The bridge context: routing table turned into connected destinations.
///
/// One `Bridge` owns everything a delivery needs, so several independent
/// bridges can coexist in one process. Startup is eager: the routing table
/// must load, every destination is connected up front, and at least one
/// must succeed.
#[derive(Debug)]
pub struct Bridge {
    dispatcher: Dispatcher<SqliteStore>,
}

impl Bridge {
    /// Load the routing table from `config_path` and connect every
    /// destination.
    ///
    /// A destination whose store fails to connect stays in the dispatch set
    /// as offline; its traffic is dropped with logged outcomes. Startup
    /// fails only when the config is unusable or no destination connects.
    pub fn open(config_path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let table = RoutingTable::load(config_path)?;
        Self::from_table(table)
    }

    /// Build the bridge from an already-loaded routing table.
    pub fn from_table(table: RoutingTable) -> Result<Self, BridgeError> {
        let attempted = table.len();
        let mut destinations = Vec::with_capacity(attempted);

        for dest_config in table.destinations() {
            let log = OutcomeLog::open_or_stderr(&dest_config.log_path);
            match SqliteStore::connect(dest_config) {
                Ok(store) => {
                    tracing::info!(
                        "Destination ready: topic '{}' -> table '{}'",
                        dest_config.topic,
                        dest_config.table_name
                    );
                    destinations.push(Destination::new(dest_config.clone(), store, log));
                }
                Err(e) => {
                    tracing::error!("Destination offline: topic '{}': {}", dest_config.topic, e);
                    log.append(&format!("Destination offline: {}", e));
                    destinations.push(Destination::offline(
                        dest_config.clone(),
                        e.to_string(),
                        log,
                    ));
                }
            }
        }

        let dispatcher = Dispatcher::new(destinations);
        if dispatcher.available_count() == 0 {
            return Err(BridgeError::NoAvailableDestination { attempted });
        }

        Ok(Self { dispatcher })
    }

    /// Route one message.
    ///
    /// Always succeeds from the caller's point of view; per-message errors
    /// are logged to the matching destinations and swallowed.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) {
        self.dispatcher.dispatch(topic, payload);
    }

    /// Per-destination delivery counters, in routing-table order.
    pub fn stats(&self) -> Vec<(String, DestinationStatsSnapshot)> {
        self.dispatcher
            .destinations()
            .iter()
            .map(|d| (d.config().topic.clone(), d.stats()))
            .collect()
    }

    /// Tear down: log final counters, then release connections and log
    /// streams.
    pub fn close(self) {
        for dest in self.dispatcher.destinations() {
            let stats = dest.stats();
            tracing::info!(
                topic = %dest.config().topic,
                matched = stats.matched,
                persisted = stats.persisted,
                decode_failures = stats.decode_failures,
                validation_failures = stats.validation_failures,
                persist_failures = stats.persist_failures,
                offline_drops = stats.offline_drops,
                "Destination closed"
            );
        }
        // Dropping the dispatcher closes connections and flushes logs
    }
}
