// src/db/migrations.rs
//
// Database schema initialization and collection tables
//
// PRINCIPLES:
// - Explicit schema versions
// - No automatic migrations
// - Clear error messages
// - Idempotent operations
//
// Every entity collection is a document table:
//   key TEXT PRIMARY KEY, body TEXT (JSON), created_at, updated_at (RFC 3339)

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// Current schema version
/// Increment this when adding migrations
const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_VERSION_TABLE: &str = "schema_version";

/// Initialize the database schema
///
/// Safe to call multiple times (idempotent).
pub fn initialize_database(conn: &Connection) -> StoreResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        apply_initial_schema(conn)?;
        set_schema_version(conn, CURRENT_SCHEMA_VERSION)?;
    } else if current_version < CURRENT_SCHEMA_VERSION {
        return Err(StoreError::Schema(format!(
            "Schema version {} is outdated. Expected {}. Manual migration required.",
            current_version, CURRENT_SCHEMA_VERSION
        )));
    } else if current_version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::Schema(format!(
            "Schema version {} is newer than supported {}. Update the application.",
            current_version, CURRENT_SCHEMA_VERSION
        )));
    }

    Ok(())
}

/// Get current schema version
/// Returns 0 if schema_version table doesn't exist (fresh database)
fn get_schema_version(conn: &Connection) -> StoreResult<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> StoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [version],
    )?;

    Ok(())
}

fn apply_initial_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| StoreError::Schema(format!("Failed to apply initial schema: {}", e)))?;

    Ok(())
}

/// Reject collection names that cannot be used verbatim as a table name.
pub fn validate_collection_name(name: &str) -> StoreResult<()> {
    let starts_ok = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let chars_ok = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let reserved = name.eq_ignore_ascii_case(SCHEMA_VERSION_TABLE)
        || name.to_ascii_lowercase().starts_with("sqlite_");

    if !starts_ok || !chars_ok || reserved {
        return Err(StoreError::InvalidCollection(name.to_string()));
    }
    Ok(())
}

/// Whether the document table for `collection` exists.
///
/// Reads use this instead of `ensure_collection`: creating a table takes the
/// write lock, which a reader must never wait for.
pub fn collection_exists(conn: &Connection, collection: &str) -> StoreResult<bool> {
    validate_collection_name(collection)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
        [collection],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Create the document table for `collection` if it does not exist yet.
///
/// DDL is transactional in SQLite, so this is re-run before every write
/// rather than cached: a rolled-back transaction may have dropped the table.
pub fn ensure_collection(conn: &Connection, collection: &str) -> StoreResult<()> {
    validate_collection_name(collection)?;

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{collection}\" (
            key TEXT PRIMARY KEY NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"
    ))?;

    Ok(())
}
