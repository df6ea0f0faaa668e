//! Store connection management and schema lifecycle.

use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Error;

/// Thread-safe store connection type. Sensors and analysis tasks run
/// their own transactions on it; the mutex serializes access.
pub type DbConnection = Arc<Mutex<Connection>>;

/// Open the store at the configured path and enable foreign keys and
/// WAL mode. The schema itself is only created by [`init_schema`]
/// (the `setup` command).
pub fn open(path: &str) -> Result<DbConnection, Error> {
    let conn = Connection::open(path)?;

    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // pragma_update instead of execute: PRAGMA journal_mode returns a row.
    conn.pragma_update(None, "journal_mode", "WAL")?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Create all tables and indices.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(include_str!("../migrations/001_schema.sql"))?;
    Ok(())
}

/// Drop all tables, discarding every gathered observation and report.
pub fn drop_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS report;
         DROP TABLE IF EXISTS flow_sample;
         DROP TABLE IF EXISTS flow;
         DROP TABLE IF EXISTS link_sample;
         DROP TABLE IF EXISTS link;
         DROP TABLE IF EXISTS port_sample;
         DROP TABLE IF EXISTS port;
         DROP TABLE IF EXISTS node_sample;
         DROP TABLE IF EXISTS internet_address_association;
         DROP TABLE IF EXISTS internet_address;
         DROP TABLE IF EXISTS node;
         DROP TABLE IF EXISTS sample_timestamp;",
    )?;
    Ok(())
}
