//! Error types emitted by the Stargaze CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use stargaze_core::SpotQueryError;
use stargaze_data::ClientBuildError;
use stargaze_data::coverage::CoverageError;
use stargaze_data::geocoding::GeocodeError;
use stargaze_data::store::PoolError;
use thiserror::Error;

use crate::parsing::{DirectionError, LengthError};

/// Errors emitted by the Stargaze CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// The search radius could not be parsed.
    #[error("invalid --within value: {0}")]
    InvalidRadius(#[source] LengthError),
    /// The observation direction could not be parsed.
    #[error("invalid --head value: {0}")]
    InvalidDirection(#[source] DirectionError),
    /// Building an HTTP client failed.
    #[error("failed to build {service} client: {source}")]
    BuildClient {
        service: &'static str,
        #[source]
        source: ClientBuildError,
    },
    /// The whereabouts could not be turned into coordinates.
    #[error("failed to resolve whereabouts {input:?}: {source}")]
    Whereabouts {
        input: String,
        #[source]
        source: GeocodeError,
    },
    /// Opening the tile store failed.
    #[error("failed to open tile store at {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: PoolError,
    },
    /// Resolving or filling coverage failed outright.
    #[error("coverage check failed: {0}")]
    Coverage(#[from] CoverageError),
    /// Some layer imports failed; rerunning retries only those.
    #[error("{failed} layer import(s) failed; rerun to retry them")]
    IncompleteCoverage { failed: usize },
    /// The spot query failed.
    #[error(transparent)]
    Spots(#[from] SpotQueryError),
    /// Serializing command output failed.
    #[error("failed to serialize output: {0}")]
    SerializeOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
