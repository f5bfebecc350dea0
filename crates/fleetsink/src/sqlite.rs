// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite persistence backend
//!
//! Embedded relational store, one database file per destination.

use crate::config::DestinationConfig;
use crate::decode::TelemetryRecord;
use crate::store::{ConnectError, PersistError, PersistStep, TelemetryStore};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed telemetry store.
///
/// Holds the destination's single eager connection. Thread-safe via an
/// internal Mutex (SQLite Connection is not Sync); the whole
/// prepare/bind/execute/commit sequence runs under one guard so concurrent
/// dispatchers interleave at transaction granularity, never mid-bind.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE <table> (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     vin TEXT NOT NULL,
///     trip_id TEXT NOT NULL,
///     recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
///     data TEXT NOT NULL
/// );
/// CREATE INDEX idx_<table>_vin ON <table>(vin);
/// ```
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
    insert_sql: String,
}

/// A stored telemetry row.
#[derive(Debug, Clone)]
pub struct TelemetryRow {
    pub id: i64,
    pub vin: String,
    pub trip_id: String,
    pub recorded_at: String,
    pub data: String,
}

/// Database file for a destination: `<wallet>/<tns_name>.db`.
pub fn store_path(config: &DestinationConfig) -> PathBuf {
    config.wallet.join(format!("{}.db", config.tns_name))
}

impl SqliteStore {
    /// Connect eagerly to the destination store described by `config`.
    ///
    /// Creates the wallet directory if missing, opens the database file and
    /// prepares the destination table. The insert statement text is rendered
    /// once here; message processing never builds SQL. A `tns_name` of
    /// `:memory:` opens an in-memory store instead of touching disk.
    pub fn connect(config: &DestinationConfig) -> Result<Self, ConnectError> {
        if config.tns_name == ":memory:" {
            return Self::in_memory(&config.table_name);
        }

        std::fs::create_dir_all(&config.wallet).map_err(|source| ConnectError::Wallet {
            path: config.wallet.clone(),
            source,
        })?;

        let path = store_path(config);
        let conn = Connection::open(&path).map_err(|source| ConnectError::Open {
            path: path.clone(),
            source,
        })?;

        let store = Self::with_connection(conn, &config.table_name)?;
        tracing::debug!(
            "Opened {} (table '{}')",
            path.display(),
            config.table_name
        );
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory(table: &str) -> Result<Self, ConnectError> {
        let conn = Connection::open_in_memory().map_err(|source| ConnectError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::with_connection(conn, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, ConnectError> {
        let store = Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            insert_sql: format!(
                "INSERT INTO {} (vin, trip_id, recorded_at, data)
                 VALUES (?1, ?2, CURRENT_TIMESTAMP, ?3)",
                table
            ),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the destination table and index.
    fn init_schema(&self) -> Result<(), ConnectError> {
        let conn = self.lock_conn();

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    vin TEXT NOT NULL,
                    trip_id TEXT NOT NULL,
                    recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    data TEXT NOT NULL
                )",
                self.table
            ),
            [],
        )
        .map_err(|source| ConnectError::Schema {
            table: self.table.clone(),
            source,
        })?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_vin ON {0}(vin)",
                self.table
            ),
            [],
        )
        .map_err(|source| ConnectError::Schema {
            table: self.table.clone(),
            source,
        })?;

        Ok(())
    }

    /// Number of rows in the destination table.
    pub fn count(&self) -> rusqlite::Result<usize> {
        let conn = self.lock_conn();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All rows in insertion order (tooling and tests).
    pub fn rows(&self) -> rusqlite::Result<Vec<TelemetryRow>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, vin, trip_id, recorded_at, data FROM {} ORDER BY id ASC",
            self.table
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(TelemetryRow {
                    id: row.get(0)?,
                    vin: row.get(1)?,
                    trip_id: row.get(2)?,
                    recorded_at: row.get(3)?,
                    data: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn tag(step: PersistStep) -> impl Fn(rusqlite::Error) -> PersistError {
    move |source| PersistError { step, source }
}

impl TelemetryStore for SqliteStore {
    fn insert(&self, record: &TelemetryRecord) -> Result<(), PersistError> {
        let mut conn = self.lock_conn();

        let tx = conn.transaction().map_err(tag(PersistStep::Prepare))?;

        {
            let mut stmt = tx
                .prepare(&self.insert_sql)
                .map_err(tag(PersistStep::Prepare))?;

            stmt.raw_bind_parameter(1, &record.vin)
                .map_err(tag(PersistStep::Bind))?;
            stmt.raw_bind_parameter(2, &record.trip_id)
                .map_err(tag(PersistStep::Bind))?;
            stmt.raw_bind_parameter(3, &record.telemetry_json)
                .map_err(tag(PersistStep::Bind))?;

            stmt.raw_execute().map_err(tag(PersistStep::Execute))?;
        }
        // Statement finalized on scope exit. A transaction dropped before
        // commit rolls back, so no half-written row survives an early return.

        tx.commit().map_err(tag(PersistStep::Commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use std::path::Path;
    use tempfile::TempDir;

    fn record(vin: &str, trip: &str, data: &str) -> TelemetryRecord {
        TelemetryRecord {
            vin: vin.to_string(),
            trip_id: trip.to_string(),
            telemetry_json: data.to_string(),
        }
    }

    fn file_config(wallet: &Path) -> DestinationConfig {
        DestinationConfig {
            topic: "cars/telemetry".to_string(),
            credentials: Credentials {
                user: "fleet".to_string(),
                password: "secret".to_string(),
            },
            wallet: wallet.to_path_buf(),
            tns_name: "fleetdb".to_string(),
            table_name: "telemetry".to_string(),
            log_path: wallet.join("outcome.log"),
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let store = SqliteStore::in_memory("telemetry").unwrap();

        store
            .insert(&record("V1", "T1", r#"{"speed":10}"#))
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let rows = store.rows().unwrap();
        assert_eq!(rows[0].vin, "V1");
        assert_eq!(rows[0].trip_id, "T1");
        assert_eq!(rows[0].data, r#"{"speed":10}"#);
        assert!(!rows[0].recorded_at.is_empty());
    }

    #[test]
    fn test_redelivery_inserts_second_row() {
        let store = SqliteStore::in_memory("telemetry").unwrap();
        let rec = record("V1", "T1", "null");

        store.insert(&rec).unwrap();
        store.insert(&rec).unwrap();

        // No dedup: each delivery is its own row
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_connect_creates_wallet_and_db_file() {
        let temp = TempDir::new().unwrap();
        let config = file_config(&temp.path().join("wallet"));

        let store = SqliteStore::connect(&config).unwrap();
        assert!(store_path(&config).exists());

        store.insert(&record("V2", "T9", "null")).unwrap();

        // Independent connection sees the committed row
        let check = Connection::open(store_path(&config)).unwrap();
        let count: i64 = check
            .query_row("SELECT COUNT(*) FROM telemetry", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_connect_reuses_existing_table() {
        let temp = TempDir::new().unwrap();
        let config = file_config(temp.path());

        {
            let store = SqliteStore::connect(&config).unwrap();
            store.insert(&record("V1", "T1", "null")).unwrap();
        }

        let store = SqliteStore::connect(&config).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_memory_tns_name_skips_disk() {
        let mut config = file_config(Path::new("/nonexistent/wallet"));
        config.tns_name = ":memory:".to_string();

        let store = SqliteStore::connect(&config).unwrap();
        store.insert(&record("V1", "T1", "null")).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_wallet_creation_failure() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"file, not dir").unwrap();

        let config = file_config(&blocker.join("wallet"));
        let err = SqliteStore::connect(&config).unwrap_err();
        assert!(matches!(err, ConnectError::Wallet { .. }));
    }

    #[test]
    fn test_execute_failure_commits_nothing() {
        let temp = TempDir::new().unwrap();
        let config = file_config(temp.path());
        let store = SqliteStore::connect(&config).unwrap();

        // Inject an execution-time failure through a second connection
        let side = Connection::open(store_path(&config)).unwrap();
        side.execute_batch(
            "CREATE TRIGGER telemetry_block BEFORE INSERT ON telemetry
             BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
        )
        .unwrap();
        drop(side);

        let err = store.insert(&record("V1", "T1", "null")).unwrap_err();
        assert_eq!(err.step, PersistStep::Execute);

        // The failed transaction rolled back; nothing was committed
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_store_path_layout() {
        let config = file_config(Path::new("/var/lib/fleetsink/wallet"));
        assert_eq!(
            store_path(&config),
            PathBuf::from("/var/lib/fleetsink/wallet/fleetdb.db")
        );
    }
}
