//! Elevation rasters and their conversion into load statements.
//!
//! A [`RasterSource`] downloads a raster covering a bounding box and a
//! [`RasterConverter`] turns that payload into SQL that the relief importer
//! executes verbatim. The default converter stores the raw payload as a blob
//! keyed by tile extent; [`CommandRasterConverter`] delegates to an external
//! program such as `raster2pgsql`.

mod opentopo;

#[doc(hidden)]
pub mod test_support;

use std::fmt::Write as _;
use std::io::Write as _;
use std::process::{Command, Stdio};

use stargaze_core::BoundingBox;
use thiserror::Error;

use crate::http::SourceError;

pub use opentopo::{DEFAULT_OPENTOPO_ENDPOINT, HttpOpenTopoClient, OpenTopoConfig};

/// Something that downloads elevation rasters.
pub trait RasterSource: Send + Sync {
    /// Fetch the raster covering `bounds`.
    fn fetch_raster(&self, bounds: &BoundingBox) -> Result<Vec<u8>, SourceError>;
}

/// Turns a raster payload into an SQL script that loads it.
pub trait RasterConverter: Send + Sync {
    /// Produce the load statement for `raster` covering `bounds`.
    fn to_statement(&self, raster: &[u8], bounds: &BoundingBox) -> Result<String, ConvertError>;
}

/// Errors raised while converting a raster.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The raster payload was empty.
    #[error("raster payload is empty")]
    EmptyRaster,
    /// The temporary raster file could not be written.
    #[error("failed to stage raster in a temporary file")]
    TempFile {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The converter program could not be started.
    #[error("failed to run raster converter `{program}`")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The converter exited unsuccessfully.
    #[error("raster converter `{program}` exited with status {status:?}")]
    Failed {
        /// Program name.
        program: String,
        /// Exit code, if the process exited normally.
        status: Option<i32>,
    },
    /// The converter produced no statement.
    #[error("raster converter `{program}` produced no output")]
    EmptyOutput {
        /// Program name.
        program: String,
    },
    /// The converter output was not UTF-8.
    #[error("raster converter `{program}` produced non UTF-8 output")]
    Encoding {
        /// Program name.
        program: String,
    },
}

/// Stores the raw raster in the `relief` table keyed by tile extent.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBlobConverter;

impl RasterConverter for SqliteBlobConverter {
    fn to_statement(&self, raster: &[u8], bounds: &BoundingBox) -> Result<String, ConvertError> {
        if raster.is_empty() {
            return Err(ConvertError::EmptyRaster);
        }
        let mut hex = String::with_capacity(raster.len() * 2);
        for byte in raster {
            let _ = write!(hex, "{byte:02X}");
        }
        Ok(format!(
            "INSERT INTO relief (minlat, minlon, maxlat, maxlon, raster) \
             VALUES ({}, {}, {}, {}, X'{hex}') \
             ON CONFLICT (minlat, minlon, maxlat, maxlon) DO UPDATE SET raster = excluded.raster;",
            bounds.minlat(),
            bounds.minlon(),
            bounds.maxlat(),
            bounds.maxlon(),
        ))
    }
}

/// Placeholder replaced by the staged raster path in converter arguments.
pub const RASTER_PATH_PLACEHOLDER: &str = "{raster}";

/// Runs an external program over a staged copy of the raster.
///
/// The program's standard output is the statement. Arguments equal to
/// [`RASTER_PATH_PLACEHOLDER`] are replaced with the raster path; without a
/// placeholder the path is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRasterConverter {
    program: String,
    args: Vec<String>,
    suffix: String,
}

impl CommandRasterConverter {
    /// Run `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            suffix: ".tif".to_owned(),
        }
    }

    /// Append rows to `table.column` with PostGIS `raster2pgsql`.
    #[must_use]
    pub fn raster2pgsql(table: &str, column: &str) -> Self {
        Self::new(
            "raster2pgsql",
            vec![
                "-f".to_owned(),
                column.to_owned(),
                "-a".to_owned(),
                RASTER_PATH_PLACEHOLDER.to_owned(),
                table.to_owned(),
            ],
        )
    }

    /// Use `suffix` for the staged raster file name.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    fn arguments(&self, path: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg == RASTER_PATH_PLACEHOLDER {
                    path.to_owned()
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !self.args.iter().any(|arg| arg == RASTER_PATH_PLACEHOLDER) {
            args.push(path.to_owned());
        }
        args
    }
}

impl RasterConverter for CommandRasterConverter {
    fn to_statement(&self, raster: &[u8], _bounds: &BoundingBox) -> Result<String, ConvertError> {
        if raster.is_empty() {
            return Err(ConvertError::EmptyRaster);
        }
        let mut staged = tempfile::Builder::new()
            .prefix("stargaze-relief")
            .suffix(&self.suffix)
            .tempfile()
            .map_err(|source| ConvertError::TempFile { source })?;
        staged
            .write_all(raster)
            .and_then(|()| staged.flush())
            .map_err(|source| ConvertError::TempFile { source })?;
        let path = staged.path().to_string_lossy().into_owned();

        let output = Command::new(&self.program)
            .args(self.arguments(&path))
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ConvertError::Failed {
                program: self.program.clone(),
                status: output.status.code(),
            });
        }
        let statement = String::from_utf8(output.stdout).map_err(|_| ConvertError::Encoding {
            program: self.program.clone(),
        })?;
        if statement.trim().is_empty() {
            return Err(ConvertError::EmptyOutput {
                program: self.program.clone(),
            });
        }
        Ok(statement)
    }
}
