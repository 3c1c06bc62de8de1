//! Overpass API response types for `[out:json]` queries with `out geom`.
//!
//! See: <https://wiki.openstreetmap.org/wiki/Overpass_API/Output_Formats#JSON>

use std::collections::HashMap;

use serde::Deserialize;
use stargaze_core::{BoundingBox, Coordinates};

/// OpenStreetMap tag map.
pub type Tags = HashMap<String, String>;

/// A complete Overpass response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OverpassResponse {
    /// API version reported by the server.
    #[serde(default)]
    pub version: f64,
    /// Server software identifier.
    #[serde(default)]
    pub generator: String,
    /// Matching features in server order.
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// A feature returned by Overpass.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    /// A single point.
    Node(Node),
    /// An ordered list of nodes.
    Way(Way),
    /// A group of members, usually a multipolygon.
    Relation(Relation),
    /// Any element type the importers do not consume, such as `area`.
    #[serde(other)]
    Other,
}

impl Element {
    /// Identifier of the element, if it carries one.
    #[must_use]
    pub const fn id(&self) -> Option<u64> {
        match self {
            Self::Node(node) => Some(node.id),
            Self::Way(way) => Some(way.id),
            Self::Relation(relation) => Some(relation.id),
            Self::Other => None,
        }
    }
}

/// A point feature.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Node {
    /// OSM identifier.
    pub id: u64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Feature tags.
    #[serde(default)]
    pub tags: Tags,
}

impl Node {
    /// Position of the node.
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// A way with its resolved geometry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Way {
    /// OSM identifier.
    pub id: u64,
    /// Extent reported by the server.
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
    /// Node identifiers in path order.
    #[serde(default)]
    pub nodes: Vec<u64>,
    /// Node positions in path order.
    #[serde(default)]
    pub geometry: Vec<Coordinates>,
    /// Feature tags.
    #[serde(default)]
    pub tags: Tags,
}

impl Way {
    /// A way is closed when its first and last nodes coincide.
    ///
    /// Node identifiers decide when present; otherwise the geometry does.
    /// Empty ways are never closed.
    ///
    /// # Examples
    /// ```
    /// use stargaze_data::overpass::Way;
    ///
    /// let way: Way = serde_json::from_str(r#"{"id": 1, "nodes": [1, 2, 3, 1]}"#)?;
    /// assert!(way.is_closed());
    /// # Ok::<(), serde_json::Error>(())
    /// ```
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match (self.nodes.first(), self.nodes.last()) {
            (Some(first), Some(last)) => self.nodes.len() > 1 && first == last,
            _ => ring_is_closed(&self.geometry),
        }
    }
}

/// A relation with its member geometries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Relation {
    /// OSM identifier.
    pub id: u64,
    /// Extent reported by the server.
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
    /// Members in relation order.
    #[serde(default)]
    pub members: Vec<Member>,
    /// Relation tags. Members carry none of their own.
    #[serde(default)]
    pub tags: Tags,
}

/// Element type of a relation member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    /// A node member.
    Node,
    /// A way member.
    Way,
    /// A nested relation.
    Relation,
}

/// Role of a member inside a multipolygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Hole ring.
    Inner,
    /// Boundary ring.
    Outer,
    /// Any other role, including the empty one.
    #[serde(other)]
    Other,
}

/// A member of a relation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Member {
    /// Element type of the member.
    #[serde(rename = "type")]
    pub kind: MemberKind,
    /// Identifier of the referenced element.
    #[serde(rename = "ref")]
    pub reference: u64,
    /// Multipolygon role.
    pub role: MemberRole,
    /// Positions of the member way.
    #[serde(default)]
    pub geometry: Vec<Coordinates>,
}

impl Member {
    /// Members have no node list, so closure is decided by geometry.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        ring_is_closed(&self.geometry)
    }
}

fn ring_is_closed(geometry: &[Coordinates]) -> bool {
    match (geometry.first(), geometry.last()) {
        (Some(first), Some(last)) => geometry.len() > 1 && first == last,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SAMPLE: &str = r#"{
        "version": 0.6,
        "generator": "Overpass API 0.7.62",
        "osm3s": {"timestamp_osm_base": "2024-01-01T00:00:00Z"},
        "elements": [
            {"type": "node", "id": 10, "lat": 50.0, "lon": 18.0},
            {
                "type": "way",
                "id": 20,
                "bounds": {"minlat": 50.0, "minlon": 18.0, "maxlat": 50.1, "maxlon": 18.1},
                "nodes": [1, 2, 3, 1],
                "geometry": [
                    {"lat": 50.0, "lon": 18.0},
                    {"lat": 50.1, "lon": 18.0},
                    {"lat": 50.1, "lon": 18.1},
                    {"lat": 50.0, "lon": 18.0}
                ],
                "tags": {"landuse": "forest"}
            },
            {
                "type": "relation",
                "id": 30,
                "members": [
                    {"type": "way", "ref": 21, "role": "outer", "geometry": []},
                    {"type": "node", "ref": 11, "role": "label"}
                ],
                "tags": {"type": "multipolygon", "natural": "water"}
            },
            {"type": "area", "id": 40}
        ]
    }"#;

    #[rstest]
    fn deserialises_mixed_elements() {
        let response: OverpassResponse = serde_json::from_str(SAMPLE).expect("should deserialise");

        assert_eq!(response.generator, "Overpass API 0.7.62");
        assert_eq!(response.elements.len(), 4);
        assert!(matches!(response.elements[0], Element::Node(ref node) if node.tags.is_empty()));
        let Element::Way(ref way) = response.elements[1] else {
            panic!("expected a way");
        };
        assert_eq!(way.tags.get("landuse").map(String::as_str), Some("forest"));
        assert_eq!(way.geometry.len(), 4);
        let Element::Relation(ref relation) = response.elements[2] else {
            panic!("expected a relation");
        };
        assert_eq!(relation.members[0].role, MemberRole::Outer);
        assert_eq!(relation.members[1].role, MemberRole::Other);
        assert_eq!(relation.members[1].kind, MemberKind::Node);
        assert_eq!(response.elements[3], Element::Other);
        assert_eq!(response.elements[3].id(), None);
    }

    #[rstest]
    #[case(vec![1, 2, 3, 1], true)]
    #[case(vec![1, 2, 3], false)]
    #[case(vec![1], false)]
    fn way_closure_follows_node_ids(#[case] nodes: Vec<u64>, #[case] expected: bool) {
        let way = Way {
            id: 1,
            bounds: None,
            nodes,
            geometry: Vec::new(),
            tags: Tags::new(),
        };
        assert_eq!(way.is_closed(), expected);
    }

    #[rstest]
    fn way_without_nodes_falls_back_to_geometry() {
        let way = Way {
            id: 1,
            bounds: None,
            nodes: Vec::new(),
            geometry: vec![
                Coordinates::new(0.0, 0.0),
                Coordinates::new(1.0, 0.0),
                Coordinates::new(0.0, 0.0),
            ],
            tags: Tags::new(),
        };
        assert!(way.is_closed());
    }

    #[rstest]
    fn empty_member_is_not_closed() {
        let member = Member {
            kind: MemberKind::Way,
            reference: 1,
            role: MemberRole::Outer,
            geometry: Vec::new(),
        };
        assert!(!member.is_closed());
    }
}
