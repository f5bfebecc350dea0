// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistence gateway abstraction
//!
//! Defines the storage seam the dispatcher writes through, plus the
//! step-tagged error taxonomy for the transactional insert protocol.

use crate::decode::TelemetryRecord;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The four steps of one persistence operation.
///
/// Prepare, bind, execute and commit form a single unit of work; failure at
/// any step abandons the message without retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStep {
    /// Transaction begin and statement preparation.
    Prepare,
    /// Binding a positional parameter.
    Bind,
    /// Statement execution.
    Execute,
    /// Transaction commit.
    Commit,
}

impl PersistStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistStep::Prepare => "prepare",
            PersistStep::Bind => "bind",
            PersistStep::Execute => "execute",
            PersistStep::Commit => "commit",
        }
    }
}

impl fmt::Display for PersistStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed persistence operation, tagged with the step that failed.
#[derive(Debug, Error)]
#[error("Insert failed at {step}: {source}")]
pub struct PersistError {
    /// The step that failed.
    pub step: PersistStep,

    /// Underlying store error.
    #[source]
    pub source: rusqlite::Error,
}

/// Destination connect failures.
///
/// Fatal to the destination: it is marked offline and its traffic is
/// dropped with a logged outcome. Startup aborts only when no destination
/// connects at all.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Cannot create wallet directory {path}: {source}")]
    Wallet {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open store {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cannot prepare table '{table}': {source}")]
    Schema {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Storage backend seam for the dispatch pipeline.
///
/// One implementation instance per destination, connected eagerly at
/// startup and reused for every message routed to it.
///
/// # Implementations
///
/// - `SqliteStore` -- embedded relational backend, the default
pub trait TelemetryStore {
    /// Persist one record as a single prepare/bind/execute/commit unit.
    ///
    /// The whole sequence runs under one exclusion scope, so concurrent
    /// callers interleave at transaction granularity.
    fn insert(&self, record: &TelemetryRecord) -> Result<(), PersistError>;
}
