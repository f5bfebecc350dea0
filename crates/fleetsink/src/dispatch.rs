// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message dispatch controller.
//!
//! Runs the per-message pipeline (match, decode, validate, persist) for
//! every destination whose topic matches. All per-message failures are
//! converted into one outcome-log line plus a stats counter and swallowed;
//! the transport never observes an error.

use crate::config::DestinationConfig;
use crate::decode::{decode, TelemetryRecord};
use crate::outcome::OutcomeLog;
use crate::store::TelemetryStore;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Payload policy violations caught after a successful decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing VIN")]
    MissingVin,

    #[error("Missing TripID")]
    MissingTripId,
}

/// Per-destination delivery counters.
#[derive(Debug, Default)]
pub struct DestinationStats {
    /// Messages matched to this destination.
    pub matched: AtomicU64,

    /// Rows committed.
    pub persisted: AtomicU64,

    /// Payloads that failed JSON decoding.
    pub decode_failures: AtomicU64,

    /// Payloads missing VIN or TripID.
    pub validation_failures: AtomicU64,

    /// Inserts that failed at some step.
    pub persist_failures: AtomicU64,

    /// Messages dropped because the destination is offline.
    pub offline_drops: AtomicU64,
}

impl DestinationStats {
    /// Take a point-in-time snapshot.
    pub fn snapshot(&self) -> DestinationStatsSnapshot {
        DestinationStatsSnapshot {
            matched: self.matched.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            offline_drops: self.offline_drops.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`DestinationStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationStatsSnapshot {
    pub matched: u64,
    pub persisted: u64,
    pub decode_failures: u64,
    pub validation_failures: u64,
    pub persist_failures: u64,
    pub offline_drops: u64,
}

#[derive(Debug)]
enum Gateway<S> {
    Ready(S),
    Offline(String),
}

/// One routing destination: config, gateway state, outcome log, counters.
///
/// A destination whose store failed to connect at startup is kept in the
/// dispatch set as offline; its traffic is dropped fail-fast with a logged
/// outcome instead of silently vanishing.
#[derive(Debug)]
pub struct Destination<S> {
    config: DestinationConfig,
    gateway: Gateway<S>,
    log: OutcomeLog,
    stats: DestinationStats,
}

impl<S: TelemetryStore> Destination<S> {
    /// Destination with a connected store.
    pub fn new(config: DestinationConfig, store: S, log: OutcomeLog) -> Self {
        Self {
            config,
            gateway: Gateway::Ready(store),
            log,
            stats: DestinationStats::default(),
        }
    }

    /// Destination whose connect failed; `reason` is replayed in every
    /// drop line.
    pub fn offline(config: DestinationConfig, reason: String, log: OutcomeLog) -> Self {
        Self {
            config,
            gateway: Gateway::Offline(reason),
            log,
            stats: DestinationStats::default(),
        }
    }

    pub fn config(&self) -> &DestinationConfig {
        &self.config
    }

    /// True when the destination's store connected at startup.
    pub fn is_available(&self) -> bool {
        matches!(self.gateway, Gateway::Ready(_))
    }

    pub fn stats(&self) -> DestinationStatsSnapshot {
        self.stats.snapshot()
    }

    fn matches(&self, topic: &str) -> bool {
        self.config.topic == topic
    }

    /// Run the pipeline for an already-matched payload.
    ///
    /// Exactly one outcome-log line per call; every failure is swallowed
    /// here.
    pub fn deliver(&self, payload: &[u8]) {
        self.stats.matched.fetch_add(1, Ordering::Relaxed);

        let store = match &self.gateway {
            Gateway::Ready(store) => store,
            Gateway::Offline(reason) => {
                self.stats.offline_drops.fetch_add(1, Ordering::Relaxed);
                self.log
                    .append(&format!("Dropped: destination offline ({})", reason));
                return;
            }
        };

        let record = match decode(payload) {
            Ok(record) => record,
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                self.log.append(&e.to_string());
                return;
            }
        };

        if let Err(e) = validate(&record) {
            self.stats.validation_failures.fetch_add(1, Ordering::Relaxed);
            self.log.append(&format!("{}: skipping insert", e));
            return;
        }

        match store.insert(&record) {
            Ok(()) => {
                self.stats.persisted.fetch_add(1, Ordering::Relaxed);
                self.log.append(&format!(
                    "Telemetry inserted for VIN {} trip {}",
                    record.vin, record.trip_id
                ));
            }
            Err(e) => {
                self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
                self.log.append(&e.to_string());
            }
        }
    }
}

/// Policy check on the decoded record: identity fields must be non-empty.
fn validate(record: &TelemetryRecord) -> Result<(), ValidationError> {
    if record.vin.is_empty() {
        return Err(ValidationError::MissingVin);
    }
    if record.trip_id.is_empty() {
        return Err(ValidationError::MissingTripId);
    }
    Ok(())
}

/// Fan-out dispatcher over all configured destinations.
///
/// # Type Parameters
///
/// - `S` -- storage backend (e.g., `SqliteStore`)
#[derive(Debug)]
pub struct Dispatcher<S> {
    destinations: Vec<Destination<S>>,
}

impl<S: TelemetryStore> Dispatcher<S> {
    pub fn new(destinations: Vec<Destination<S>>) -> Self {
        Self { destinations }
    }

    /// Route one message to every destination matching `topic`.
    ///
    /// Never fails and never panics: each matched destination runs its own
    /// pipeline, and a failure in one never affects another. A topic with
    /// no destination returns immediately with zero outcome-log entries.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) {
        for dest in self.destinations.iter().filter(|d| d.matches(topic)) {
            tracing::debug!(
                "Message on '{}' -> table '{}' ({} bytes)",
                topic,
                dest.config().table_name,
                payload.len()
            );
            dest.deliver(payload);
        }
    }

    pub fn destinations(&self) -> &[Destination<S>] {
        &self.destinations
    }

    /// Destinations whose store connected at startup.
    pub fn available_count(&self) -> usize {
        self.destinations.iter().filter(|d| d.is_available()).count()
    }
}
