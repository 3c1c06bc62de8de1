//! Core domain types for the Stargaze tile cache.
//!
//! Everything here is pure: coordinates and bounding boxes, the layer set a
//! tile needs, the geohash grid that defines tiles, and the well-known text
//! encoding used to persist layer shapes. I/O lives in `stargaze-data`.

pub mod coordinates;
pub mod geohash;
pub mod grid;
pub mod layer;
pub mod spots;
pub mod wkt;

pub use coordinates::{BoundingBox, BoundingBoxError, Coordinates};
pub use geohash::GeohashError;
pub use grid::{TileCell, TileGrid, search_area};
pub use layer::{LayerKind, Tile, UnknownLayer};
pub use spots::{NoSpots, SpotFinder, SpotQueryError};
pub use wkt::{Geometry, Polygon, WktError};
