//! Road centre lines tagged with a recognised `highway` class.

use rusqlite::Connection;
use rusqlite::types::Value;
use stargaze_core::{BoundingBox, Geometry, LayerKind};

use super::{ImportError, Importer, Upsert, fetch_features, store_key};
use crate::overpass::{Element, FeatureSource, OverpassQuery, OverpassResponse};

const HIGHWAY_CLASSES: [&str; 9] = [
    "motorway",
    "trunk",
    "primary",
    "secondary",
    "tertiary",
    "unclassified",
    "residential",
    "track",
    "road",
];

const ROAD_UPSERT: Upsert = Upsert {
    table: "roads",
    columns: &["ref", "shape", "type", "lit"],
    operation: "upsert road",
};

/// A road segment.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadRecord {
    /// OSM way identifier.
    pub reference: i64,
    /// Centre line as a `LINESTRING`.
    pub shape: Geometry,
    /// `highway` value.
    pub kind: String,
    /// Whether the road is lit, when tagged.
    pub lit: Option<bool>,
}

/// Imports roads into the `roads` table.
#[derive(Debug)]
pub struct RoadImporter<S> {
    source: S,
}

impl<S: FeatureSource> RoadImporter<S> {
    /// Create an importer backed by `source`.
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    /// Query selecting every recognised highway class inside `bounds`.
    #[must_use]
    pub fn query(bounds: BoundingBox) -> OverpassQuery {
        HIGHWAY_CLASSES
            .iter()
            .fold(OverpassQuery::new(bounds), |query, class| {
                query.way("highway", class)
            })
    }
}

/// Any `lit` value other than `no` or `disused` (`24/7`, `automatic`,
/// `sunset-sunrise`, ...) means the road has working lights.
fn parse_lit(value: Option<&String>) -> Option<bool> {
    match value.map(|lit| lit.trim()) {
        None | Some("") => None,
        Some("no" | "disused") => Some(false),
        Some(_) => Some(true),
    }
}

impl<S: FeatureSource> Importer for RoadImporter<S> {
    const LAYER: LayerKind = LayerKind::Road;

    type Extract = OverpassResponse;
    type Record = RoadRecord;

    fn fetch(&self, bounds: &BoundingBox) -> Result<Self::Extract, ImportError> {
        let query = Self::query(*bounds).to_string();
        fetch_features(&self.source, Self::LAYER, &query)
    }

    fn transform(&self, extract: Self::Extract) -> Result<Vec<Self::Record>, ImportError> {
        let mut records = Vec::new();
        for element in extract.elements {
            let Element::Way(way) = element else {
                continue;
            };
            let Some(kind) = way.tags.get("highway").cloned() else {
                log::debug!("skipping way {} without a highway tag", way.id);
                continue;
            };
            if way.geometry.len() < 2 {
                log::debug!("skipping way {} with fewer than two points", way.id);
                continue;
            }
            records.push(RoadRecord {
                reference: store_key(Self::LAYER, way.id)?,
                lit: parse_lit(way.tags.get("lit")),
                shape: Geometry::LineString(way.geometry),
                kind,
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
                    record.lit.into(),
                ]
            })
            .collect();
        ROAD_UPSERT.execute(connection, Self::LAYER, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::LayerPipeline;
    use crate::overpass::test_support::StubFeatureSource;
    use crate::store::initialise_schema;
    use rstest::{fixture, rstest};

    const ROADS: &str = r#"{
        "elements": [
            {"type": "way", "id": 1, "nodes": [10, 11],
             "geometry": [{"lat": 50.0, "lon": 18.0}, {"lat": 50.005, "lon": 18.005}],
             "tags": {"highway": "primary", "lit": "yes"}},
            {"type": "way", "id": 2, "nodes": [12, 13],
             "geometry": [{"lat": 50.0, "lon": 18.0}, {"lat": 50.001, "lon": 18.002}],
             "tags": {"highway": "track", "lit": "no"}},
            {"type": "way", "id": 3, "nodes": [14, 15],
             "geometry": [{"lat": 50.0, "lon": 18.0}, {"lat": 50.002, "lon": 18.0}],
             "tags": {"highway": "residential", "lit": "24/7"}},
            {"type": "way", "id": 4, "nodes": [16],
             "geometry": [{"lat": 50.0, "lon": 18.0}],
             "tags": {"highway": "road"}},
            {"type": "way", "id": 5, "nodes": [17, 18],
             "geometry": [{"lat": 50.0, "lon": 18.0}, {"lat": 50.1, "lon": 18.1}],
             "tags": {"waterway": "river"}},
            {"type": "node", "id": 19, "lat": 50.0, "lon": 18.0}
        ]
    }"#;

    #[fixture]
    fn bounds() -> BoundingBox {
        BoundingBox::new(50.0, 18.0, 50.01, 18.01).expect("valid box")
    }

    #[fixture]
    fn connection() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open database");
        initialise_schema(&mut conn).expect("initialise schema");
        conn
    }

    #[rstest]
    fn query_selects_ways_only(bounds: BoundingBox) {
        let rendered = RoadImporter::<StubFeatureSource>::query(bounds).to_string();
        for class in HIGHWAY_CLASSES {
            assert!(rendered.contains(&format!("way[highway={class}];")));
        }
        assert!(!rendered.contains("rel["));
    }

    #[rstest]
    #[case(Some("yes"), Some(true))]
    #[case(Some("no"), Some(false))]
    #[case(Some("24/7"), Some(true))]
    #[case(Some("automatic"), Some(true))]
    #[case(Some("sunset-sunrise"), Some(true))]
    #[case(Some("limited"), Some(true))]
    #[case(Some("disused"), Some(false))]
    #[case(Some(""), None)]
    #[case(None, None)]
    fn lit_tag_is_tristate(#[case] value: Option<&str>, #[case] expected: Option<bool>) {
        let owned = value.map(str::to_owned);
        assert_eq!(parse_lit(owned.as_ref()), expected);
    }

    #[rstest]
    fn transform_keeps_tagged_lines(bounds: BoundingBox) {
        let importer = RoadImporter::new(StubFeatureSource::with_json(ROADS));
        let extract = importer.fetch(&bounds).expect("fetch");
        let records = importer.transform(extract).expect("transform");

        let summary: Vec<(i64, &str, Option<bool>)> = records
            .iter()
            .map(|r| (r.reference, r.kind.as_str(), r.lit))
            .collect();
        assert_eq!(
            summary,
            [
                (1, "primary", Some(true)),
                (2, "track", Some(false)),
                (3, "residential", Some(true)),
            ]
        );
        assert_eq!(
            records.first().map(|r| r.shape.to_string()),
            Some("LINESTRING (18 50, 18.005 50.005)".to_owned())
        );
    }

    #[rstest]
    fn run_twice_leaves_one_row_per_way(bounds: BoundingBox, mut connection: Connection) {
        let importer = RoadImporter::new(StubFeatureSource::with_json(ROADS));
        for _ in 0..2 {
            let tx = connection.transaction().expect("begin");
            assert_eq!(importer.run(&bounds, &tx).expect("run"), 3);
            tx.commit().expect("commit");
        }

        let rows: i64 = connection
            .query_row("SELECT COUNT(*) FROM roads", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, 3);
        let lit: Option<i64> = connection
            .query_row("SELECT lit FROM roads WHERE ref = 3", [], |row| row.get(0))
            .expect("read lit");
        assert_eq!(lit, Some(1));
    }
}
