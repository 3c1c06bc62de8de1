//! Fetch, transform and load pipelines, one per map layer.
//!
//! Every importer implements [`Importer`]: `fetch` talks to a remote source,
//! `transform` turns the extract into records without touching the store,
//! and `load` upserts the records through the caller's transaction as one
//! multi-row statement (split only past SQLite's parameter limit). The
//! object-safe [`LayerPipeline`] runs the three steps in order and is what
//! the coverage filler holds.
//!
//! # Example
//!
//! ```
//! use rusqlite::Connection;
//! use stargaze_core::BoundingBox;
//! use stargaze_data::importer::{LayerPipeline, RoadImporter};
//! use stargaze_data::overpass::test_support::StubFeatureSource;
//! use stargaze_data::store::initialise_schema;
//!
//! let source = StubFeatureSource::with_json(
//!     r#"{"elements": [{"type": "way", "id": 7, "nodes": [1, 2],
//!         "geometry": [{"lat": 50.0, "lon": 18.0}, {"lat": 50.01, "lon": 18.01}],
//!         "tags": {"highway": "track"}}]}"#,
//! );
//! let mut conn = Connection::open_in_memory()?;
//! initialise_schema(&mut conn)?;
//! let tx = conn.transaction()?;
//! let bounds = BoundingBox::new(49.99, 17.99, 50.02, 18.02)?;
//! let loaded = RoadImporter::new(source).run(&bounds, &tx)?;
//! tx.commit()?;
//! assert_eq!(loaded, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod land;
mod polygons;
mod relief;
mod residential;
mod road;

use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Connection, Error as SqliteError, Transaction, params_from_iter};
use stargaze_core::{BoundingBox, LayerKind};
use thiserror::Error;

use crate::http::SourceError;
use crate::overpass::FeatureSource;
use crate::raster::{ConvertError, RasterConverter, RasterSource};

pub use land::{LandImporter, LandRecord};
pub use relief::{RasterExtract, ReliefImporter};
pub use residential::{ResidentialAreaImporter, ResidentialAreaRecord};
pub use road::{RoadImporter, RoadRecord};

/// Errors raised while importing one layer for one tile.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The remote source failed.
    #[error("failed to fetch {layer} data")]
    Fetch {
        /// Layer being imported.
        layer: LayerKind,
        /// Source failure.
        #[source]
        source: SourceError,
    },
    /// The raster could not be converted into a load statement.
    #[error("failed to convert {layer} raster")]
    Convert {
        /// Layer being imported.
        layer: LayerKind,
        /// Converter failure.
        #[source]
        source: ConvertError,
    },
    /// Writing records failed.
    #[error("failed to load {layer} records: {operation}")]
    Load {
        /// Layer being imported.
        layer: LayerKind,
        /// Statement being executed.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A feature identifier does not fit the store's integer keys.
    #[error("{layer} feature reference {reference} exceeds the supported range")]
    ReferenceOutOfRange {
        /// Layer being imported.
        layer: LayerKind,
        /// Offending reference.
        reference: u64,
    },
}

impl ImportError {
    /// Layer whose import failed.
    #[must_use]
    pub const fn layer(&self) -> LayerKind {
        match self {
            Self::Fetch { layer, .. }
            | Self::Convert { layer, .. }
            | Self::Load { layer, .. }
            | Self::ReferenceOutOfRange { layer, .. } => *layer,
        }
    }
}

/// Three-step import contract for one layer.
///
/// `fetch` and `transform` must not touch the store. `load` writes every
/// record through `connection`, which the caller supplies inside an open
/// transaction so a failing batch leaves nothing behind.
pub trait Importer {
    /// Layer this importer fills.
    const LAYER: LayerKind;

    /// Raw data returned by `fetch`.
    type Extract;

    /// Normalised row written by `load`.
    type Record;

    /// Retrieve raw data covering `bounds`.
    fn fetch(&self, bounds: &BoundingBox) -> Result<Self::Extract, ImportError>;

    /// Turn raw data into records.
    fn transform(&self, extract: Self::Extract) -> Result<Vec<Self::Record>, ImportError>;

    /// Upsert `records`, returning how many were written.
    fn load(&self, records: &[Self::Record], connection: &Connection)
    -> Result<usize, ImportError>;
}

/// Object-safe view of an importer used by orchestration code.
pub trait LayerPipeline: Send + Sync {
    /// Layer this pipeline fills.
    fn layer(&self) -> LayerKind;

    /// Fetch, transform and load `bounds` inside `transaction`.
    fn run(&self, bounds: &BoundingBox, transaction: &Transaction<'_>)
    -> Result<usize, ImportError>;
}

impl<T> LayerPipeline for T
where
    T: Importer + Send + Sync,
{
    fn layer(&self) -> LayerKind {
        T::LAYER
    }

    fn run(
        &self,
        bounds: &BoundingBox,
        transaction: &Transaction<'_>,
    ) -> Result<usize, ImportError> {
        let extract = self.fetch(bounds)?;
        let records = self.transform(extract)?;
        let loaded = self.load(&records, transaction)?;
        log::info!("loaded {loaded} {} record(s) for {bounds}", T::LAYER);
        Ok(loaded)
    }
}

/// Pipelines for every layer, in [`LayerKind::ALL`] order.
///
/// The feature source is shared by the three Overpass-backed importers.
#[must_use]
pub fn standard_pipelines<F, S, C>(
    features: Arc<F>,
    rasters: S,
    converter: C,
) -> Vec<Box<dyn LayerPipeline>>
where
    F: FeatureSource + 'static,
    S: RasterSource + 'static,
    C: RasterConverter + 'static,
{
    vec![
        Box::new(LandImporter::new(Arc::clone(&features))),
        Box::new(ReliefImporter::new(rasters, converter)),
        Box::new(RoadImporter::new(Arc::clone(&features))),
        Box::new(ResidentialAreaImporter::new(features)),
    ]
}

/// Host parameters one statement may bind, SQLite's default limit.
const MAX_STATEMENT_PARAMS: usize = 32_766;

/// Multi-row upsert into a layer table keyed by `ref`.
///
/// The first column must be `ref`; every other column is overwritten on
/// conflict, so the last write wins.
struct Upsert {
    table: &'static str,
    columns: &'static [&'static str],
    operation: &'static str,
}

impl Upsert {
    fn statement(&self, rows: usize) -> String {
        let row = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![row.as_str(); rows].join(", ");
        let updates = self
            .columns
            .iter()
            .skip(1)
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {values} ON CONFLICT (ref) DO UPDATE SET {updates}",
            self.table,
            self.columns.join(", ")
        )
    }

    /// Write `rows`, one statement per parameter-limit chunk.
    fn execute(
        &self,
        connection: &Connection,
        layer: LayerKind,
        rows: &[Vec<Value>],
    ) -> Result<usize, ImportError> {
        let per_statement = (MAX_STATEMENT_PARAMS / self.columns.len()).max(1);
        for chunk in rows.chunks(per_statement) {
            connection
                .execute(
                    &self.statement(chunk.len()),
                    params_from_iter(chunk.iter().flatten()),
                )
                .map_err(load_error(layer, self.operation))?;
        }
        Ok(rows.len())
    }
}

/// Convert an OSM identifier into a store key.
fn store_key(layer: LayerKind, reference: u64) -> Result<i64, ImportError> {
    i64::try_from(reference).map_err(|_| ImportError::ReferenceOutOfRange { layer, reference })
}

/// Map a `rusqlite` failure during `operation` into an [`ImportError`].
fn load_error(layer: LayerKind, operation: &'static str) -> impl FnOnce(SqliteError) -> ImportError {
    move |source| ImportError::Load {
        layer,
        operation,
        source,
    }
}

/// Run a query through `source`, tagging failures with `layer`.
fn fetch_features(
    source: &dyn FeatureSource,
    layer: LayerKind,
    query: &str,
) -> Result<crate::overpass::OverpassResponse, ImportError> {
    source
        .query(query)
        .map_err(|source| ImportError::Fetch { layer, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overpass::test_support::StubFeatureSource;
    use crate::raster::test_support::{FixedStatementConverter, StubRasterSource};
    use rstest::rstest;

    #[rstest]
    fn standard_pipelines_cover_every_layer() {
        let pipelines = standard_pipelines(
            Arc::new(StubFeatureSource::with_elements(Vec::new())),
            StubRasterSource::with_payload(b"raster".to_vec()),
            FixedStatementConverter::new("SELECT 1;"),
        );
        let layers: Vec<LayerKind> = pipelines.iter().map(|pipeline| pipeline.layer()).collect();
        assert_eq!(layers, LayerKind::ALL);
    }

    #[rstest]
    fn upsert_binds_every_row_in_one_statement() {
        let upsert = Upsert {
            table: "land",
            columns: &["ref", "shape", "type"],
            operation: "upsert land",
        };
        assert_eq!(
            upsert.statement(2),
            "INSERT INTO land (ref, shape, type) VALUES (?, ?, ?), (?, ?, ?) \
             ON CONFLICT (ref) DO UPDATE SET shape = excluded.shape, type = excluded.type"
        );
    }

    #[rstest]
    fn oversized_reference_is_rejected() {
        let err = store_key(LayerKind::Road, u64::MAX).expect_err("overflow");
        assert!(matches!(
            err,
            ImportError::ReferenceOutOfRange {
                layer: LayerKind::Road,
                reference: u64::MAX
            }
        ));
        assert_eq!(err.layer(), LayerKind::Road);
    }
}
