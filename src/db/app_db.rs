//! App-level database — global device registry and access grants.
//!
//! Unencrypted SQLite database stored at `profiles_dir/app.db`.
//! Analogous to Android's system-level database: persists device
//! pairings and access grants across profile switches.

use std::path::Path;

use rusqlite::Connection;
use tracing;

use super::DatabaseError;

/// Open (or create) the app-level database and run migrations.
///
/// This database is **unencrypted** — it stores device metadata and
/// access grants, not patient health data. Patient data remains in
/// per-profile encrypted databases.
pub fn open_app_database(profiles_dir: &Path) -> Result<Connection, DatabaseError> {
    let db_path = profiles_dir.join("app.db");
    let conn = Connection::open(&db_path)?;
    configure_pragmas(&conn)?;
    run_app_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory app database (for testing).
pub fn open_memory_app_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_app_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Run all pending app-level migrations.
///
/// Separate migration chain from per-profile databases — the app.db
/// has its own schema_version table and migration numbering.
fn run_app_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        include_str!("../../resources/app_migrations/001_device_registry.sql"),
    )];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running app migration v{version}");
            conn.execute_batch(sql).map_err(|e| {
                DatabaseError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                }
            })?;
        }
    }

    Ok(())
}

/// Get the current app schema version (0 if no schema exists yet).
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, i64>(0),
    )
    .unwrap_or(0)
}

/// Count tables in the app database (for verification).
pub fn count_app_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}
