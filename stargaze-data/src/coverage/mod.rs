//! Tile coverage: which tiles around a point still lack data, and filling them.
//!
//! [`CoverageResolver`] overlays the tile grid on a search area and reads the
//! completion index. [`CoverageFiller`] runs the layer pipelines for whatever
//! the resolver reports missing, guarding each `(tile, layer)` pair with
//! [`ImportClaims`] so concurrent callers never import the same pair twice.

mod claims;
mod fill;

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;
use stargaze_core::{BoundingBox, Coordinates, GeohashError, LayerKind, TileCell, TileGrid};
use thiserror::Error;

use crate::store::{IndexError, PoolError, is_complete, load_tile};

pub use claims::{ClaimGuard, ImportClaims};
pub use fill::{CoverageFiller, CoverageReport, LayerFailure, LayerImport, TileLayer};

/// Errors raised while resolving or filling coverage.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// The origin cannot be placed on the grid.
    #[error("cannot place search area on the tile grid")]
    Grid(#[from] GeohashError),
    /// The completion index could not be read.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// No database session could be obtained.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Some layers failed to import; the report lists them.
    #[error("{} layer import(s) failed", report.failed.len())]
    Incomplete {
        /// Outcome of every attempted import.
        report: CoverageReport,
    },
}

/// A tile inside the search area that lacks one or more layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingTile {
    /// Grid cell of the tile.
    #[serde(flatten)]
    pub cell: TileCell,
    /// Layers not yet recorded, in [`LayerKind::ALL`] order.
    pub missing_layers: Vec<LayerKind>,
}

/// Finds tiles around a point that are not fully imported.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use stargaze_core::Coordinates;
/// use stargaze_data::coverage::CoverageResolver;
/// use stargaze_data::store::initialise_schema;
///
/// let mut conn = Connection::open_in_memory()?;
/// initialise_schema(&mut conn)?;
/// let resolver = CoverageResolver::default();
/// let missing = resolver.missing_tiles(&conn, Coordinates::new(50.0, 18.0), 1000.0)?;
/// assert_eq!(missing.len(), 1);
/// assert!(resolver.missing_tiles(&conn, Coordinates::new(50.0, 18.0), 0.0)?.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageResolver {
    grid: TileGrid,
}

impl CoverageResolver {
    /// Resolve coverage on `grid`.
    #[must_use]
    pub const fn new(grid: TileGrid) -> Self {
        Self { grid }
    }

    /// Grid the resolver overlays.
    #[must_use]
    pub const fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Tiles within `radius_m` metres of `origin` that lack any layer.
    ///
    /// Each geohash appears at most once. A non-positive radius yields no
    /// tiles.
    pub fn missing_layers(
        &self,
        connection: &Connection,
        origin: Coordinates,
        radius_m: f64,
    ) -> Result<Vec<MissingTile>, CoverageError> {
        let cells: BTreeMap<String, TileCell> = self
            .grid
            .cells_within(origin, radius_m)?
            .into_iter()
            .map(|cell| (cell.geohash.clone(), cell))
            .collect();

        let mut missing = Vec::new();
        for (geohash, cell) in cells {
            if is_complete(connection, &geohash)? {
                continue;
            }
            let absent = load_tile(connection, &cell)?.missing_layers();
            if !absent.is_empty() {
                missing.push(MissingTile {
                    cell,
                    missing_layers: absent,
                });
            }
        }
        log::debug!(
            "{} tile(s) incomplete within {radius_m} m of {origin}",
            missing.len()
        );
        Ok(missing)
    }

    /// Bounding boxes of the tiles [`Self::missing_layers`] reports.
    pub fn missing_tiles(
        &self,
        connection: &Connection,
        origin: Coordinates,
        radius_m: f64,
    ) -> Result<Vec<BoundingBox>, CoverageError> {
        Ok(self
            .missing_layers(connection, origin, radius_m)?
            .into_iter()
            .map(|tile| tile.cell.bbox)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{complete_if_covered, initialise_schema, record_layer};
    use rstest::{fixture, rstest};

    #[fixture]
    fn connection() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open database");
        initialise_schema(&mut conn).expect("initialise schema");
        conn
    }

    fn origin() -> Coordinates {
        Coordinates::new(50.0, 18.0)
    }

    #[rstest]
    fn empty_store_reports_every_layer(connection: Connection) {
        let missing = CoverageResolver::default()
            .missing_layers(&connection, origin(), 1000.0)
            .expect("resolve");
        assert_eq!(missing.len(), 1);
        let tile = missing.first().expect("tile");
        assert_eq!(tile.cell.geohash, "u2uu3");
        assert_eq!(tile.missing_layers, LayerKind::ALL);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-5.0)]
    #[case(f64::NAN)]
    fn degenerate_radius_needs_nothing(connection: Connection, #[case] radius: f64) {
        let missing = CoverageResolver::default()
            .missing_tiles(&connection, origin(), radius)
            .expect("resolve");
        assert!(missing.is_empty());
    }

    #[rstest]
    fn partially_loaded_tile_lists_remaining_layers(connection: Connection) {
        record_layer(&connection, "u2uu3", LayerKind::Land).expect("record");
        record_layer(&connection, "u2uu3", LayerKind::Relief).expect("record");

        let missing = CoverageResolver::default()
            .missing_layers(&connection, origin(), 1000.0)
            .expect("resolve");

        assert_eq!(
            missing.first().map(|tile| tile.missing_layers.clone()),
            Some(vec![LayerKind::Road, LayerKind::ResidentialArea])
        );
    }

    #[rstest]
    fn completed_tile_is_not_missing(connection: Connection) {
        let resolver = CoverageResolver::default();
        let cell = resolver.grid().cell_at(origin()).expect("cell");
        for layer in LayerKind::ALL {
            record_layer(&connection, &cell.geohash, layer).expect("record");
        }
        assert!(complete_if_covered(&connection, &cell).expect("complete"));

        let missing = resolver
            .missing_tiles(&connection, origin(), 1000.0)
            .expect("resolve");
        assert!(missing.is_empty());
    }

    #[rstest]
    fn wide_search_lists_each_tile_once(connection: Connection) {
        let missing = CoverageResolver::default()
            .missing_layers(&connection, origin(), 5000.0)
            .expect("resolve");
        let mut hashes: Vec<&str> = missing.iter().map(|t| t.cell.geohash.as_str()).collect();
        let total = hashes.len();
        hashes.dedup();
        assert_eq!(hashes.len(), total);
        assert!(total > 1);
    }

    #[rstest]
    fn invalid_origin_is_an_error(connection: Connection) {
        let err = CoverageResolver::default()
            .missing_tiles(&connection, Coordinates::new(91.0, 0.0), 1000.0)
            .expect_err("latitude out of range");
        assert!(matches!(err, CoverageError::Grid(_)));
    }
}
