//! Facade crate for the Stargaze tile cache.
//!
//! This crate re-exports the core domain types and, behind the `data`
//! feature, the store, importers and coverage filler.

#![forbid(unsafe_code)]

pub use stargaze_core::{
    BoundingBox, Coordinates, Geometry, LayerKind, NoSpots, Polygon, SpotFinder, SpotQueryError,
    Tile, TileCell, TileGrid,
};

#[cfg(feature = "data")]
pub use stargaze_data::{
    CoverageError, CoverageFiller, CoverageReport, CoverageResolver, ImportError, LayerPipeline,
    MissingTile, PoolConfig, PoolError, SessionPool, SourceError, standard_pipelines,
};
