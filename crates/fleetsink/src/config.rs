// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing table configuration.
//!
//! Loaded once at startup from a JSON document; immutable afterwards.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No destinations configured")]
    Empty,

    #[error("Invalid table name '{0}': expected a bare SQL identifier")]
    InvalidTableName(String),
}

/// Store credentials for one destination.
///
/// The embedded SQLite backend does not consult these, but the routing
/// document requires them so a networked backend can be dropped in without
/// changing the configuration shape.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// One topic-to-store binding from the routing table.
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    /// Topic this destination subscribes to (exact match, no wildcards).
    pub topic: String,

    /// Store credentials.
    pub credentials: Credentials,

    /// Directory anchoring the destination store (wallet directory).
    pub wallet: PathBuf,

    /// Connection descriptor, resolved by the backend. The SQLite backend
    /// maps it to `<wallet>/<tns_name>.db`; `:memory:` is reserved for
    /// in-memory stores.
    pub tns_name: String,

    /// Destination table. Validated as a bare identifier at load time and
    /// baked into a fixed statement at connect time.
    pub table_name: String,

    /// Outcome log file for this destination.
    pub log_path: PathBuf,
}

/// Immutable topic-to-destination routing table.
///
/// # Document format
///
/// ```json
/// [
///   {
///     "Topic": "cars/telemetry",
///     "Config": {
///       "DBUser": "fleet",
///       "DBPassword": "secret",
///       "Wallet": "/var/lib/fleetsink/wallet",
///       "TableName": "telemetry",
///       "LogPath": "/var/log/fleetsink/telemetry.log",
///       "TNSName": "fleetdb"
///     }
///   }
/// ]
/// ```
///
/// Entries keep their file order. The same topic may appear more than once;
/// every matching destination receives its own copy of each message.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    destinations: Vec<DestinationConfig>,
}

#[derive(Deserialize)]
struct RawRoute {
    #[serde(rename = "Topic")]
    topic: String,

    #[serde(rename = "Config")]
    config: RawDestination,
}

#[derive(Deserialize)]
struct RawDestination {
    #[serde(rename = "DBUser")]
    db_user: String,

    #[serde(rename = "DBPassword")]
    db_password: String,

    #[serde(rename = "Wallet")]
    wallet: PathBuf,

    #[serde(rename = "TableName")]
    table_name: String,

    #[serde(rename = "LogPath")]
    log_path: PathBuf,

    #[serde(rename = "TNSName")]
    tns_name: String,
}

impl RoutingTable {
    /// Load the routing table from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse the routing table from a JSON string.
    ///
    /// All-or-nothing: any missing key or malformed entry fails the whole
    /// load and no partial table is produced.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: Vec<RawRoute> = serde_json::from_str(text)?;
        if raw.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut destinations = Vec::with_capacity(raw.len());
        for entry in raw {
            if !is_valid_table_name(&entry.config.table_name) {
                return Err(ConfigError::InvalidTableName(entry.config.table_name));
            }
            destinations.push(DestinationConfig {
                topic: entry.topic,
                credentials: Credentials {
                    user: entry.config.db_user,
                    password: entry.config.db_password,
                },
                wallet: entry.config.wallet,
                tns_name: entry.config.tns_name,
                table_name: entry.config.table_name,
                log_path: entry.config.log_path,
            });
        }

        let mut seen = HashSet::new();
        for dest in &destinations {
            if !seen.insert(dest.topic.as_str()) {
                tracing::warn!(
                    "Topic '{}' configured more than once; each destination receives its own copy",
                    dest.topic
                );
            }
        }

        Ok(Self { destinations })
    }

    /// All destinations whose topic exactly equals `topic`, in file order.
    pub fn lookup<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a DestinationConfig> {
        self.destinations.iter().filter(move |d| d.topic == topic)
    }

    /// All configured destinations, in file order.
    pub fn destinations(&self) -> &[DestinationConfig] {
        &self.destinations
    }

    /// Number of configured destinations.
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    /// True when no destinations are configured.
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

/// Bare SQL identifier check: leading letter or underscore, then letters,
/// digits, underscores. Table names are interpolated into statement text,
/// not bound, so anything else is rejected at load time.
fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
