//! Land cover areas classified by `landuse` or `natural`.

use rusqlite::Connection;
use rusqlite::types::Value;
use stargaze_core::{BoundingBox, LayerKind, Polygon};

use super::polygons::area_candidates;
use super::{ImportError, Importer, Upsert, fetch_features, store_key};
use crate::overpass::{FeatureSource, OverpassQuery, OverpassResponse, Tags};

const LANDUSE_CLASSES: [&str; 4] = ["construction", "farmyard", "forest", "military"];
const NATURAL_CLASSES: [&str; 2] = ["water", "wood"];

/// A classified land area.
#[derive(Debug, Clone, PartialEq)]
pub struct LandRecord {
    /// OSM way identifier.
    pub reference: i64,
    /// Outer ring of the area. Holes are not kept.
    pub shape: Polygon,
    /// `landuse` value, or `natural` when `landuse` is absent.
    pub kind: String,
}

/// Imports land cover into the `land` table.
#[derive(Debug)]
pub struct LandImporter<S> {
    source: S,
}

impl<S: FeatureSource> LandImporter<S> {
    /// Create an importer backed by `source`.
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    /// Query selecting every recognised land class inside `bounds`.
    #[must_use]
    pub fn query(bounds: BoundingBox) -> OverpassQuery {
        let with_landuse = LANDUSE_CLASSES
            .iter()
            .fold(OverpassQuery::new(bounds), |query, class| {
                query.area("landuse", class)
            });
        NATURAL_CLASSES
            .iter()
            .fold(with_landuse, |query, class| query.area("natural", class))
    }
}

const LAND_UPSERT: Upsert = Upsert {
    table: "land",
    columns: &["ref", "shape", "type"],
    operation: "upsert land",
};

fn classify(tags: &Tags) -> Option<&str> {
    tags.get("landuse")
        .or_else(|| tags.get("natural"))
        .map(String::as_str)
}

impl<S: FeatureSource> Importer for LandImporter<S> {
    const LAYER: LayerKind = LayerKind::Land;

    type Extract = OverpassResponse;
    type Record = LandRecord;

    fn fetch(&self, bounds: &BoundingBox) -> Result<Self::Extract, ImportError> {
        let query = Self::query(*bounds).to_string();
        fetch_features(&self.source, Self::LAYER, &query)
    }

    fn transform(&self, extract: Self::Extract) -> Result<Vec<Self::Record>, ImportError> {
        let mut records = Vec::new();
        for candidate in area_candidates(&extract.elements) {
            let Some(kind) = classify(candidate.tags) else {
                log::debug!("skipping unclassified area {}", candidate.reference);
                continue;
            };
            records.push(LandRecord {
                reference: store_key(Self::LAYER, candidate.reference)?,
                shape: Polygon::new(candidate.ring.to_vec()),
                kind: kind.to_owned(),
            });
        }
        Ok(records)
    }

    fn load(&self, records: &[Self::Record], connection: &Connection) -> Result<usize, ImportError> {
        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|record| {
                vec![
                    record.reference.into(),
                    record.shape.to_string().into(),
                    record.kind.clone().into(),
                ]
            })
            .collect();
        LAND_UPSERT.execute(connection, Self::LAYER, &rows)
    }
}
