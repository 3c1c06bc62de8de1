//! Overpass API data source.
//!
//! This module provides [`FeatureSource`], the seam importers use to fetch
//! OpenStreetMap features, together with [`HttpOverpassClient`], which sends
//! Overpass QL to an interpreter endpoint, and the typed response model.
//!
//! # Architecture
//!
//! Queries are plain Overpass QL text built with [`OverpassQuery`]. They are
//! always rendered with `out geom`, so ways and relation members arrive with
//! their coordinates resolved and no follow-up node lookups are needed.

mod client;
mod model;
mod query;

#[doc(hidden)]
pub mod test_support;

pub use client::{DEFAULT_OVERPASS_ENDPOINT, HttpOverpassClient};
pub use model::{
    Element, Member, MemberKind, MemberRole, Node, OverpassResponse, Relation, Tags, Way,
};
pub use query::OverpassQuery;

use crate::http::SourceError;

/// Something that answers Overpass QL queries.
pub trait FeatureSource: Send + Sync {
    /// Run `query` and return the decoded response.
    fn query(&self, query: &str) -> Result<OverpassResponse, SourceError>;
}

impl<T: FeatureSource + ?Sized> FeatureSource for std::sync::Arc<T> {
    fn query(&self, query: &str) -> Result<OverpassResponse, SourceError> {
        (**self).query(query)
    }
}
