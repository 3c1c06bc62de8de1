//! Test utilities for Overpass-backed importers.
//!
//! [`StubFeatureSource`] answers every query with a canned response or error
//! and records the query text it was given.

use std::sync::Mutex;
use std::sync::PoisonError;

use super::{Element, FeatureSource, OverpassResponse};
use crate::http::SourceError;

/// Deterministic [`FeatureSource`] for tests.
///
/// # Example
///
/// ```
/// use stargaze_data::overpass::FeatureSource;
/// use stargaze_data::overpass::test_support::StubFeatureSource;
///
/// let source = StubFeatureSource::with_elements(Vec::new());
/// let response = source.query("[out:json];").expect("stub answers");
/// assert!(response.elements.is_empty());
/// assert_eq!(source.queries(), vec!["[out:json];".to_owned()]);
/// ```
#[derive(Debug)]
pub struct StubFeatureSource {
    response: Result<OverpassResponse, SourceError>,
    queries: Mutex<Vec<String>>,
}

impl StubFeatureSource {
    /// Answer every query with `elements`.
    #[must_use]
    pub fn with_elements(elements: Vec<Element>) -> Self {
        Self::with_response(OverpassResponse {
            version: 0.6,
            generator: "stub".to_owned(),
            elements,
        })
    }

    /// Answer every query with `response`.
    #[must_use]
    pub fn with_response(response: OverpassResponse) -> Self {
        Self {
            response: Ok(response),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Decode `json` as the canned response.
    ///
    /// # Panics
    ///
    /// Panics when `json` is not a valid Overpass response.
    #[must_use]
    pub fn with_json(json: &str) -> Self {
        let response = serde_json::from_str(json)
            .unwrap_or_else(|err| panic!("invalid stub Overpass response: {err}"));
        Self::with_response(response)
    }

    /// Fail every query with `error`.
    #[must_use]
    pub fn with_error(error: SourceError) -> Self {
        Self {
            response: Err(error),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Query texts received so far.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FeatureSource for StubFeatureSource {
    fn query(&self, query: &str) -> Result<OverpassResponse, SourceError> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_owned());
        self.response.clone()
    }
}
