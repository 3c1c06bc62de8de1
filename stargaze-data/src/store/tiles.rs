//! Tile Completion Index.
//!
//! `tile_layers` records which layers have been loaded for each geohash tile
//! and `tiles` records tiles whose every layer is present. Both are written
//! inside the same transaction as the layer rows they describe, so a tile is
//! never marked complete unless its data committed.

use std::collections::BTreeSet;

use rusqlite::{Connection, Error as SqliteError, OptionalExtension, params};
use stargaze_core::{LayerKind, Polygon, Tile, TileCell, UnknownLayer};
use thiserror::Error;

/// Errors raised while reading or writing the completion index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A query against the index failed.
    #[error("completion index query failed: {operation}")]
    Query {
        /// Operation being performed.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The index holds a layer name this build does not know.
    #[error(transparent)]
    UnknownLayer(#[from] UnknownLayer),
}

/// Layers recorded for `geohash`.
pub fn layers_present(
    connection: &Connection,
    geohash: &str,
) -> Result<BTreeSet<LayerKind>, IndexError> {
    let query_error = |source| IndexError::Query {
        operation: "read tile layers",
        source,
    };
    let mut statement = connection
        .prepare_cached("SELECT layer FROM tile_layers WHERE geohash = ?1")
        .map_err(query_error)?;
    let names = statement
        .query_map([geohash], |row| row.get::<_, String>(0))
        .map_err(query_error)?;

    let mut layers = BTreeSet::new();
    for name in names {
        layers.insert(name.map_err(query_error)?.parse::<LayerKind>()?);
    }
    Ok(layers)
}

/// `cell` together with the layers recorded for it.
pub fn load_tile(connection: &Connection, cell: &TileCell) -> Result<Tile, IndexError> {
    let mut tile = Tile::new(cell.geohash.clone(), cell.bbox);
    for layer in layers_present(connection, &cell.geohash)? {
        tile.insert_layer(layer);
    }
    Ok(tile)
}

/// Record that `layer` has been loaded for `geohash`.
///
/// Recording the same layer again refreshes its load time.
pub fn record_layer(
    connection: &Connection,
    geohash: &str,
    layer: LayerKind,
) -> Result<(), IndexError> {
    connection
        .prepare_cached(
            "INSERT INTO tile_layers (geohash, layer) VALUES (?1, ?2)
             ON CONFLICT (geohash, layer) DO UPDATE SET
                 loaded_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        )
        .and_then(|mut statement| statement.execute(params![geohash, layer.as_str()]))
        .map(|_| ())
        .map_err(|source| IndexError::Query {
            operation: "record tile layer",
            source,
        })
}

/// Mark `cell` complete if every layer is present.
///
/// Returns whether the tile is complete after the call.
pub fn complete_if_covered(connection: &Connection, cell: &TileCell) -> Result<bool, IndexError> {
    if !load_tile(connection, cell)?.is_complete() {
        return Ok(false);
    }

    let bbox = cell.bbox;
    connection
        .prepare_cached(
            "INSERT INTO tiles (geohash, minlat, minlon, maxlat, maxlon, bbox)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (geohash) DO NOTHING",
        )
        .and_then(|mut statement| {
            statement.execute(params![
                cell.geohash,
                bbox.minlat(),
                bbox.minlon(),
                bbox.maxlat(),
                bbox.maxlon(),
                Polygon::from(bbox).to_string(),
            ])
        })
        .map_err(|source| IndexError::Query {
            operation: "mark tile complete",
            source,
        })?;
    log::debug!("tile {} is complete", cell.geohash);
    Ok(true)
}

/// Report whether `geohash` has been marked complete.
pub fn is_complete(connection: &Connection, geohash: &str) -> Result<bool, IndexError> {
    connection
        .query_row(
            "SELECT 1 FROM tiles WHERE geohash = ?1",
            [geohash],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|source| IndexError::Query {
            operation: "read tile completion",
            source,
        })
}
