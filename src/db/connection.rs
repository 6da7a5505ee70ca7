// src/db/connection.rs
//
// Database connection management
//
// PRINCIPLES:
// - Explicit connection pooling
// - No hidden connection creation
// - Clear error propagation
// - One pooled connection per data context

use std::path::PathBuf;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::db::migrations::initialize_database;
use crate::error::{StoreError, StoreResult};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled connection
pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Connection settings, usually deserialized from the host's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub busy_timeout_ms: u32,
    pub connection_timeout_ms: u64,
    /// Write-ahead logging; ignored for in-memory databases.
    pub wal: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 15,
            busy_timeout_ms: 5000,
            connection_timeout_ms: 30_000,
            wal: true,
        }
    }
}

impl ConnectionConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    fn init_pragmas(&self) -> String {
        let mut pragmas = format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        );
        if self.wal && self.path.is_some() {
            pragmas.push_str(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            );
        }
        pragmas
    }
}

/// Create a connection pool and initialize the schema.
///
/// An in-memory database only lives as long as its connection, so the pool
/// is capped at one connection. Only one data context can hold it at a time.
pub fn create_connection_pool(config: &ConnectionConfig) -> StoreResult<ConnectionPool> {
    let pragmas = config.init_pragmas();

    let (manager, max_size) = match &config.path {
        Some(path) => (SqliteConnectionManager::file(path), config.max_connections.max(1)),
        None => (SqliteConnectionManager::memory(), 1),
    };
    let manager = manager.with_init(move |conn| conn.execute_batch(&pragmas));

    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
        .build(manager)
        .map_err(|e| StoreError::Pool(format!("Failed to create connection pool: {}", e)))?;

    {
        let conn = get_connection(&pool)?;
        initialize_database(&conn)?;
    }

    log::debug!(
        "Connection pool ready ({}, max {} connections)",
        config
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string()),
        max_size
    );

    Ok(pool)
}

/// Get a connection from the pool
///
/// This is a convenience wrapper that provides better error messages.
pub fn get_connection(pool: &ConnectionPool) -> StoreResult<PooledConn> {
    pool.get()
        .map_err(|e| StoreError::Pool(format!("Failed to get database connection: {}", e)))
}

/// Create a standalone in-memory connection for unit tests.
#[cfg(test)]
pub(crate) fn create_test_connection() -> StoreResult<rusqlite::Connection> {
    let conn = rusqlite::Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_in_memory() {
        let config = ConnectionConfig::default();
        assert!(config.path.is_none());
        assert_eq!(config.max_connections, 15);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{ "path": "/tmp/app.db", "busy_timeout_ms": 100 }"#).unwrap();

        assert_eq!(config.path, Some(PathBuf::from("/tmp/app.db")));
        assert_eq!(config.busy_timeout_ms, 100);
        assert_eq!(config.max_connections, 15);
        assert!(config.wal);
    }

    #[test]
    fn test_file_pool_enables_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_connection_pool(&ConnectionConfig::file(dir.path().join("app.db"))).unwrap();
        let conn = get_connection(&pool).unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);

        let journal: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");
    }

    #[test]
    fn test_memory_pool_is_single_connection() {
        let pool = create_connection_pool(&ConnectionConfig::in_memory()).unwrap();
        assert_eq!(pool.max_size(), 1);

        let conn = get_connection(&pool).unwrap();
        let result: i32 = conn.query_row("SELECT 1 + 1", [], |row| row.get(0)).unwrap();
        assert_eq!(result, 2);
    }
}
