//! Test utilities for the relief importer.

use std::sync::{Mutex, PoisonError};

use stargaze_core::BoundingBox;

use super::{ConvertError, RasterConverter, RasterSource};
use crate::http::SourceError;

/// Deterministic [`RasterSource`] returning a canned payload or error.
#[derive(Debug)]
pub struct StubRasterSource {
    response: Result<Vec<u8>, SourceError>,
    requests: Mutex<Vec<BoundingBox>>,
}

impl StubRasterSource {
    /// Answer every request with `payload`.
    #[must_use]
    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            response: Ok(payload.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request with `error`.
    #[must_use]
    pub fn with_error(error: SourceError) -> Self {
        Self {
            response: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Bounding boxes requested so far.
    #[must_use]
    pub fn requests(&self) -> Vec<BoundingBox> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RasterSource for StubRasterSource {
    fn fetch_raster(&self, bounds: &BoundingBox) -> Result<Vec<u8>, SourceError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*bounds);
        self.response.clone()
    }
}

/// Converter that always yields a fixed statement, or nothing.
#[derive(Debug, Clone)]
pub struct FixedStatementConverter {
    statement: String,
}

impl FixedStatementConverter {
    /// Always return `statement`.
    #[must_use]
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
        }
    }
}

impl RasterConverter for FixedStatementConverter {
    fn to_statement(&self, _raster: &[u8], _bounds: &BoundingBox) -> Result<String, ConvertError> {
        if self.statement.trim().is_empty() {
            return Err(ConvertError::EmptyOutput {
                program: "fixed".to_owned(),
            });
        }
        Ok(self.statement.clone())
    }
}
