//! Behavioural tests for the Overpass-backed importers.

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use rusqlite::{Connection, OptionalExtension};
use stargaze_core::BoundingBox;
use stargaze_data::importer::{LandImporter, LayerPipeline};
use stargaze_data::overpass::test_support::StubFeatureSource;
use stargaze_data::overpass::{OverpassResponse, Tags, Way};
use stargaze_data::store::initialise_schema;
use std::cell::RefCell;

fn ring(offset: f64) -> String {
    format!(
        r#"[{{"lat": {a}, "lon": 18.0}}, {{"lat": {a}, "lon": 18.01}},
            {{"lat": {b}, "lon": 18.01}}, {{"lat": {a}, "lon": 18.0}}]"#,
        a = 50.0 + offset,
        b = 50.01 + offset,
    )
}

#[fixture]
fn response() -> RefCell<Option<OverpassResponse>> {
    RefCell::new(None)
}

#[fixture]
fn database() -> RefCell<Option<Connection>> {
    RefCell::new(None)
}

#[fixture]
fn way() -> RefCell<Option<Way>> {
    RefCell::new(None)
}

fn decode(json: &str) -> OverpassResponse {
    serde_json::from_str(json).expect("valid Overpass response")
}

#[given("an Overpass response with a closed forest way {id}")]
fn forest_way(#[from(response)] response: &RefCell<Option<OverpassResponse>>, id: u64) {
    let json = format!(
        r#"{{"elements": [{{"type": "way", "id": {id}, "nodes": [1, 2, 3, 1],
            "geometry": {}, "tags": {{"landuse": "forest"}}}}]}}"#,
        ring(0.0)
    );
    *response.borrow_mut() = Some(decode(&json));
}

#[given("an Overpass response where way {id} is also an outer member of a relation")]
fn shared_member(#[from(response)] response: &RefCell<Option<OverpassResponse>>, id: u64) {
    let json = format!(
        r#"{{"elements": [
            {{"type": "way", "id": {id}, "nodes": [1, 2, 3, 1],
              "geometry": {way}, "tags": {{"landuse": "forest"}}}},
            {{"type": "relation", "id": 900,
              "members": [
                {{"type": "way", "ref": {id}, "role": "outer", "geometry": {way}}},
                {{"type": "way", "ref": {other}, "role": "outer", "geometry": {second}}},
                {{"type": "way", "ref": 7, "role": "inner", "geometry": {third}}}
              ],
              "tags": {{"type": "multipolygon", "landuse": "military"}}}}
        ]}}"#,
        way = ring(0.0),
        other = id + 1,
        second = ring(0.1),
        third = ring(0.2),
    );
    *response.borrow_mut() = Some(decode(&json));
}

#[when("the land importer runs {times} times")]
fn run_land(
    #[from(response)] response: &RefCell<Option<OverpassResponse>>,
    #[from(database)] database: &RefCell<Option<Connection>>,
    times: usize,
) {
    let canned = response.borrow().clone().expect("response prepared");
    let importer = LandImporter::new(StubFeatureSource::with_response(canned));
    let bounds = BoundingBox::new(49.9, 17.9, 50.3, 18.1).expect("valid box");

    let mut connection = Connection::open_in_memory().expect("open database");
    initialise_schema(&mut connection).expect("initialise schema");
    for _ in 0..times {
        let tx = connection.transaction().expect("begin");
        importer.run(&bounds, &tx).expect("import succeeds");
        tx.commit().expect("commit");
    }
    *database.borrow_mut() = Some(connection);
}

#[then("the land table row count is {count}")]
fn land_rows(#[from(database)] database: &RefCell<Option<Connection>>, count: i64) {
    let guard = database.borrow();
    let connection = guard.as_ref().expect("import ran");
    let rows: i64 = connection
        .query_row("SELECT COUNT(*) FROM land", [], |row| row.get(0))
        .expect("count land");
    assert_eq!(rows, count);
}

#[then("land reference {reference} is classified as {kind}")]
fn land_kind(
    #[from(database)] database: &RefCell<Option<Connection>>,
    reference: i64,
    kind: String,
) {
    let guard = database.borrow();
    let connection = guard.as_ref().expect("import ran");
    let stored: Option<String> = connection
        .query_row("SELECT type FROM land WHERE ref = ?1", [reference], |row| {
            row.get(0)
        })
        .optional()
        .expect("query land");
    assert_eq!(stored.as_deref(), Some(kind.trim_matches('"')));
}

#[given("a way with nodes {nodes}")]
fn way_with_nodes(#[from(way)] way: &RefCell<Option<Way>>, nodes: String) {
    let ids = nodes
        .trim_matches('"')
        .split(',')
        .map(|id| id.trim().parse().expect("numeric node id"))
        .collect();
    *way.borrow_mut() = Some(Way {
        id: 1,
        bounds: None,
        nodes: ids,
        geometry: Vec::new(),
        tags: Tags::new(),
    });
}

#[then("the way is closed")]
fn way_closed(#[from(way)] way: &RefCell<Option<Way>>) {
    assert!(way.borrow().as_ref().expect("way built").is_closed());
}

#[then("the way is not closed")]
fn way_open(#[from(way)] way: &RefCell<Option<Way>>) {
    assert!(!way.borrow().as_ref().expect("way built").is_closed());
}

#[scenario(path = "tests/features/import.feature", index = 0)]
fn rerun_is_idempotent(
    response: RefCell<Option<OverpassResponse>>,
    database: RefCell<Option<Connection>>,
) {
    let _ = (response, database);
}

#[scenario(path = "tests/features/import.feature", index = 1)]
fn shared_member_deduplicated(
    response: RefCell<Option<OverpassResponse>>,
    database: RefCell<Option<Connection>>,
) {
    let _ = (response, database);
}

#[scenario(path = "tests/features/import.feature", index = 2)]
fn closed_way(way: RefCell<Option<Way>>) {
    let _ = way;
}

#[scenario(path = "tests/features/import.feature", index = 3)]
fn open_way(way: RefCell<Option<Way>>) {
    let _ = way;
}
