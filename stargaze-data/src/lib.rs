//! Data access, import pipelines and tile coverage for stargaze.
//!
//! Responsibilities:
//! - Talk to the remote sources: Overpass, OpenTopography and Nominatim.
//! - Transform their payloads into layer records and load them into SQLite.
//! - Track which tiles are fully imported and fill the ones that are not.
//!
//! Boundaries:
//! - Grid geometry, geohashes and WKT encoding live in `stargaze-core`.
//! - Remote clients expose synchronous traits and block on their own runtime.
//!
//! Invariants:
//! - A tile is marked complete only in the transaction that loads its last
//!   missing layer.
//! - No global mutable state; the session pool is created and closed by the
//!   caller.

pub mod coverage;
pub mod geocoding;
pub mod http;
pub mod importer;
pub mod overpass;
pub mod raster;
pub mod store;

pub use coverage::{CoverageError, CoverageFiller, CoverageReport, CoverageResolver, MissingTile};
pub use http::{ClientBuildError, HttpSourceConfig, SourceError};
pub use importer::{ImportError, Importer, LayerPipeline, standard_pipelines};
pub use store::{PoolConfig, PoolError, SessionPool};
