//! Offline collaborators for exercising the search commands.

use std::sync::Arc;

use stargaze_core::{Coordinates, SpotFinder, SpotQueryError};
use stargaze_data::geocoding::FormatRegistry;
use stargaze_data::importer::{LayerPipeline, standard_pipelines};
use stargaze_data::overpass::test_support::StubFeatureSource;
use stargaze_data::raster::SqliteBlobConverter;
use stargaze_data::raster::test_support::StubRasterSource;

use crate::CliError;
use crate::search::{SearchBackend, SearchConfig};

/// One residential way and one track inside tile `u2uu3`.
pub(super) const FEATURES: &str = r#"{
    "elements": [
        {"type": "way", "id": 100, "nodes": [1, 2, 3, 1],
         "geometry": [{"lat": 50.0, "lon": 18.0}, {"lat": 50.0, "lon": 18.002},
                      {"lat": 50.002, "lon": 18.002}, {"lat": 50.0, "lon": 18.0}],
         "tags": {"landuse": "residential"}},
        {"type": "way", "id": 200, "nodes": [4, 5],
         "geometry": [{"lat": 50.0, "lon": 18.0}, {"lat": 50.003, "lon": 18.004}],
         "tags": {"highway": "track"}}
    ]
}"#;

/// Finder that proposes the search origin itself.
struct OriginFinder;

impl SpotFinder for OriginFinder {
    fn find_spots(
        &self,
        origin: Coordinates,
        _radius_m: f64,
        _azimuth: Option<f64>,
    ) -> Result<Vec<Coordinates>, SpotQueryError> {
        Ok(vec![origin])
    }
}

/// Decimal degrees only, canned Overpass and raster payloads.
pub(super) struct OfflineBackend;

impl SearchBackend for OfflineBackend {
    fn whereabouts(&self, _config: &SearchConfig) -> Result<FormatRegistry, CliError> {
        let mut registry = FormatRegistry::new();
        registry
            .register_decimal_degrees()
            .expect("decimal degrees pattern compiles");
        Ok(registry)
    }

    fn pipelines(&self, _config: &SearchConfig) -> Result<Vec<Box<dyn LayerPipeline>>, CliError> {
        Ok(standard_pipelines(
            Arc::new(StubFeatureSource::with_json(FEATURES)),
            StubRasterSource::with_payload(b"II*\0dem".to_vec()),
            SqliteBlobConverter,
        ))
    }

    fn spot_finder(&self, _config: &SearchConfig) -> Box<dyn SpotFinder> {
        Box::new(OriginFinder)
    }
}
