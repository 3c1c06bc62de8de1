//! Elevation rasters loaded through an external converter.

use rusqlite::Connection;
use stargaze_core::{BoundingBox, LayerKind};

use super::{ImportError, Importer, load_error};
use crate::raster::{ConvertError, RasterConverter, RasterSource};

/// Raster payload and the extent it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterExtract {
    /// Extent requested from the source.
    pub bounds: BoundingBox,
    /// Raw raster bytes.
    pub payload: Vec<u8>,
}

/// Imports elevation rasters into the `relief` table.
///
/// The converter's statement is executed verbatim, so the statement decides
/// which table and columns receive the raster.
#[derive(Debug)]
pub struct ReliefImporter<S, C> {
    source: S,
    converter: C,
}

impl<S: RasterSource, C: RasterConverter> ReliefImporter<S, C> {
    /// Create an importer that downloads from `source` and loads through
    /// `converter`.
    pub const fn new(source: S, converter: C) -> Self {
        Self { source, converter }
    }
}

impl<S: RasterSource, C: RasterConverter> Importer for ReliefImporter<S, C> {
    const LAYER: LayerKind = LayerKind::Relief;

    type Extract = RasterExtract;
    type Record = String;

    fn fetch(&self, bounds: &BoundingBox) -> Result<Self::Extract, ImportError> {
        let payload = self
            .source
            .fetch_raster(bounds)
            .map_err(|source| ImportError::Fetch {
                layer: Self::LAYER,
                source,
            })?;
        Ok(RasterExtract {
            bounds: *bounds,
            payload,
        })
    }

    fn transform(&self, extract: Self::Extract) -> Result<Vec<Self::Record>, ImportError> {
        let convert_error = |source| ImportError::Convert {
            layer: Self::LAYER,
            source,
        };
        if extract.payload.is_empty() {
            return Err(convert_error(ConvertError::EmptyRaster));
        }
        let statement = self
            .converter
            .to_statement(&extract.payload, &extract.bounds)
            .map_err(convert_error)?;
        Ok(vec![statement])
    }

    fn load(&self, records: &[Self::Record], connection: &Connection) -> Result<usize, ImportError> {
        for statement in records {
            connection
                .execute_batch(statement)
                .map_err(load_error(Self::LAYER, "execute raster statement"))?;
        }
        Ok(records.len())
    }
}
