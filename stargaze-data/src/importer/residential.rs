//! Residential areas.

use rusqlite::Connection;
use rusqlite::types::Value;
use stargaze_core::{BoundingBox, LayerKind, Polygon};

use super::polygons::area_candidates;
use super::{ImportError, Importer, Upsert, fetch_features, store_key};
use crate::overpass::{FeatureSource, OverpassQuery, OverpassResponse};

const RESIDENTIAL_UPSERT: Upsert = Upsert {
    table: "residential_area",
    columns: &["ref", "shape"],
    operation: "upsert residential area",
};

/// A residential area outline.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidentialAreaRecord {
    /// OSM way identifier.
    pub reference: i64,
    /// Outer ring of the area.
    pub shape: Polygon,
}

/// Imports `landuse=residential` areas into the `residential_area` table.
#[derive(Debug)]
pub struct ResidentialAreaImporter<S> {
    source: S,
}

impl<S: FeatureSource> ResidentialAreaImporter<S> {
    /// Create an importer backed by `source`.
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    /// Query selecting residential ways and multipolygons inside `bounds`.
    #[must_use]
    pub fn query(bounds: BoundingBox) -> OverpassQuery {
        OverpassQuery::new(bounds).area("landuse", "residential")
    }
}

impl<S: FeatureSource> Importer for ResidentialAreaImporter<S> {
    const LAYER: LayerKind = LayerKind::ResidentialArea;

    type Extract = OverpassResponse;
    type Record = ResidentialAreaRecord;

    fn fetch(&self, bounds: &BoundingBox) -> Result<Self::Extract, ImportError> {
        let query = Self::query(*bounds).to_string();
        fetch_features(&self.source, Self::LAYER, &query)
    }

    fn transform(&self, extract: Self::Extract) -> Result<Vec<Self::Record>, ImportError> {
        area_candidates(&extract.elements)
            .into_iter()
            .map(|candidate| {
                Ok(ResidentialAreaRecord {
                    reference: store_key(Self::LAYER, candidate.reference)?,
                    shape: Polygon::new(candidate.ring.to_vec()),
                })
            })
            .collect()
    }

    fn load(&self, records: &[Self::Record], connection: &Connection) -> Result<usize, ImportError> {
        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|record| vec![record.reference.into(), record.shape.to_string().into()])
            .collect();
        RESIDENTIAL_UPSERT.execute(connection, Self::LAYER, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::polygons::fixtures::{closed_way, member, multipolygon};
    use crate::overpass::MemberRole;
    use crate::overpass::test_support::StubFeatureSource;
    use rstest::rstest;

    #[rstest]
    fn query_selects_residential_areas() {
        let bounds = BoundingBox::new(49.98, 19.88, 50.02, 19.92).expect("valid box");
        let rendered = ResidentialAreaImporter::<StubFeatureSource>::query(bounds).to_string();
        assert_eq!(
            rendered,
            "[out:json][bbox:49.98,19.88,50.02,19.92];\n(\n    way[landuse=residential];\n    \
             rel[landuse=residential][type=multipolygon];\n);\nout geom;"
        );
    }

    #[rstest]
    fn shared_outer_reference_yields_one_record() {
        let importer = ResidentialAreaImporter::new(StubFeatureSource::with_elements(Vec::new()));
        let extract = OverpassResponse {
            version: 0.6,
            generator: "test".to_owned(),
            elements: vec![
                closed_way(8, &[("landuse", "residential")]),
                multipolygon(
                    20,
                    vec![
                        member(8, MemberRole::Outer, 0.0),
                        member(9, MemberRole::Outer, 0.2),
                    ],
                    &[("landuse", "residential")],
                ),
                multipolygon(
                    21,
                    vec![member(9, MemberRole::Outer, 0.2)],
                    &[("landuse", "residential")],
                ),
            ],
        };

        let records = importer.transform(extract).expect("transform");

        let refs: Vec<i64> = records.iter().map(|r| r.reference).collect();
        assert_eq!(refs, [8, 9]);
    }
}
