#![forbid(unsafe_code)]

use rusqlite::{Connection, Error as SqliteError, OptionalExtension, Transaction};
use thiserror::Error;

/// Version recorded in `stargaze_schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Initialise the tile cache schema inside an existing SQLite database.
///
/// The function creates the completion index and layer tables and records the
/// schema version. Running it again is a no-op. Existing installations must
/// already match the expected version; mismatches are rejected so migrations
/// can be applied explicitly.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use stargaze_data::store::initialise_schema;
///
/// let mut conn = Connection::open_in_memory().expect("create in-memory database");
/// initialise_schema(&mut conn).expect("create schema");
/// initialise_schema(&mut conn).expect("re-running is harmless");
///
/// let version: i64 = conn
///     .query_row("SELECT version FROM stargaze_schema_version", [], |row| row.get(0))
///     .expect("read schema version");
/// assert_eq!(version, 1);
/// ```
pub fn initialise_schema(connection: &mut Connection) -> Result<(), SchemaError> {
    let transaction = connection
        .transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin schema transaction",
            source,
        })?;

    create_index_tables(&transaction)?;
    create_layer_tables(&transaction)?;
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit schema transaction",
            source,
        })
}

fn create_index_tables(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create tiles",
        "CREATE TABLE IF NOT EXISTS tiles (
            geohash TEXT PRIMARY KEY CHECK (length(trim(geohash)) > 0),
            minlat REAL NOT NULL,
            minlon REAL NOT NULL,
            maxlat REAL NOT NULL,
            maxlon REAL NOT NULL,
            bbox TEXT NOT NULL,
            completed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create tile_layers",
        "CREATE TABLE IF NOT EXISTS tile_layers (
            geohash TEXT NOT NULL CHECK (length(trim(geohash)) > 0),
            layer TEXT NOT NULL
                CHECK (layer IN ('land', 'relief', 'road', 'residential_area')),
            loaded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            PRIMARY KEY (geohash, layer)
        ) WITHOUT ROWID",
    )
}

fn create_layer_tables(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create land",
        "CREATE TABLE IF NOT EXISTS land (
            ref INTEGER PRIMARY KEY,
            shape TEXT NOT NULL,
            type TEXT NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create roads",
        "CREATE TABLE IF NOT EXISTS roads (
            ref INTEGER PRIMARY KEY,
            shape TEXT NOT NULL,
            type TEXT NOT NULL,
            lit INTEGER CHECK (lit IN (0, 1))
        )",
    )?;
    run_migration_step(
        transaction,
        "create residential_area",
        "CREATE TABLE IF NOT EXISTS residential_area (
            ref INTEGER PRIMARY KEY,
            shape TEXT NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create relief",
        "CREATE TABLE IF NOT EXISTS relief (
            minlat REAL NOT NULL,
            minlon REAL NOT NULL,
            maxlat REAL NOT NULL,
            maxlon REAL NOT NULL,
            raster BLOB NOT NULL,
            PRIMARY KEY (minlat, minlon, maxlat, maxlon)
        ) WITHOUT ROWID",
    )
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS stargaze_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing_version: Option<i64> = transaction
        .query_row(
            "SELECT version FROM stargaze_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|source| SchemaError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing_version {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(SchemaError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
        None => transaction
            .execute(
                "INSERT INTO stargaze_schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| SchemaError::Migration {
                step: "record schema version",
                source,
            }),
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), SchemaError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| SchemaError::Migration { step, source })
}

/// Errors raised when initialising the tile cache schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A migration statement failed.
    #[error("failed to execute migration step '{step}'")]
    Migration {
        /// Label of the failing step.
        step: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The database was created by a different schema version.
    #[error(
        "expected tile cache schema version {expected} but found {found}; apply migrations before retrying"
    )]
    VersionMismatch {
        /// Version this build understands.
        expected: i64,
        /// Version recorded in the database.
        found: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn connection() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open database");
        initialise_schema(&mut conn).expect("initialise schema");
        conn
    }

    #[rstest]
    fn creates_every_table(connection: Connection) {
        for table in [
            "tiles",
            "tile_layers",
            "land",
            "roads",
            "residential_area",
            "relief",
        ] {
            let found: i64 = connection
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("query sqlite_master");
            assert_eq!(found, 1, "expected table {table}");
        }
    }

    #[rstest]
    fn rejects_unknown_layer_names(connection: Connection) {
        let outcome = connection.execute(
            "INSERT INTO tile_layers (geohash, layer) VALUES ('u2uu3', 'water')",
            [],
        );
        assert!(outcome.is_err(), "check constraint should reject layer");
    }

    #[rstest]
    fn rejects_version_mismatch(mut connection: Connection) {
        connection
            .execute("UPDATE stargaze_schema_version SET version = 99", [])
            .expect("bump version");
        let err = initialise_schema(&mut connection).expect_err("mismatch");
        assert!(matches!(
            err,
            SchemaError::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
    }
}
