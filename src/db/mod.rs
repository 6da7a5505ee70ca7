// src/db/mod.rs
//
// Database module
//
// Provides:
// - Connection pooling
// - Schema initialization
// - Document collection tables

pub mod connection;
pub mod migrations;

pub use connection::{create_connection_pool, get_connection, ConnectionConfig, ConnectionPool, PooledConn};

pub use migrations::{collection_exists, ensure_collection, initialize_database, validate_collection_name};
