//! Seam for the spatial query that ranks stargazing spots.
//!
//! The query itself runs outside this workspace. Callers fill coverage first
//! and then hand the area to a [`SpotFinder`].

use thiserror::Error;

use crate::Coordinates;

/// Errors surfaced by a [`SpotFinder`].
#[derive(Debug, Error)]
pub enum SpotQueryError {
    /// The query backend failed.
    #[error("spot query failed: {message}")]
    Backend {
        /// Description supplied by the backend.
        message: String,
    },
}

/// Find candidate observation points around an origin.
pub trait SpotFinder {
    /// Return candidates within `radius_m` metres of `origin`, optionally
    /// constrained to face `azimuth` degrees.
    fn find_spots(
        &self,
        origin: Coordinates,
        radius_m: f64,
        azimuth: Option<f64>,
    ) -> Result<Vec<Coordinates>, SpotQueryError>;
}

/// Finder that never reports candidates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpots;

impl SpotFinder for NoSpots {
    fn find_spots(
        &self,
        _origin: Coordinates,
        _radius_m: f64,
        _azimuth: Option<f64>,
    ) -> Result<Vec<Coordinates>, SpotQueryError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn default_finder_returns_nothing() {
        let spots = NoSpots
            .find_spots(Coordinates::new(50.0, 18.0), 1_000.0, Some(90.0))
            .expect("query");
        assert!(spots.is_empty());
    }
}
