//! The `missing`, `fill` and `find` commands.
//!
//! All three share [`SearchArgs`]: where to look, how far, which way, and
//! the store and endpoints to use.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use stargaze_core::{Coordinates, NoSpots, SpotFinder};
use stargaze_data::coverage::{
    CoverageError, CoverageFiller, CoverageReport, CoverageResolver, MissingTile,
};
use stargaze_data::geocoding::{DEFAULT_NOMINATIM_ENDPOINT, FormatRegistry, NominatimClient};
use stargaze_data::http::HttpSourceConfig;
use stargaze_data::importer::{LayerPipeline, standard_pipelines};
use stargaze_data::overpass::{DEFAULT_OVERPASS_ENDPOINT, HttpOverpassClient};
use stargaze_data::raster::{
    DEFAULT_OPENTOPO_ENDPOINT, HttpOpenTopoClient, OpenTopoConfig, SqliteBlobConverter,
};
use stargaze_data::store::{PoolConfig, SessionPool};

use crate::parsing::{parse_direction, parse_radius};
use crate::{
    ARG_ACQUIRE_TIMEOUT, ARG_DATABASE, ARG_HEAD, ARG_MAX_SESSIONS, ARG_MIN_SESSIONS, ARG_NEAR,
    ARG_NOMINATIM_ENDPOINT, ARG_OPENTOPO_API_KEY, ARG_OPENTOPO_ENDPOINT, ARG_OVERPASS_ENDPOINT,
    ARG_WITHIN, CliError, ENV_NEAR,
};

/// Radius used when `--within` is not given.
pub(crate) const DEFAULT_RADIUS: &str = "1km";

/// Database used when `--database` is not given.
pub(crate) const DEFAULT_DATABASE: &str = "stargaze.db";

/// CLI arguments shared by the search commands.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Describe the search area and the tile store. Values can \
                 come from CLI flags, configuration files, or environment \
                 variables.",
    about = "Search around a place for observation spots"
)]
#[ortho_config(prefix = "STARGAZE")]
pub(crate) struct SearchArgs {
    /// Coordinates such as "50.0, 18.0" or a locality name.
    #[arg(long = ARG_NEAR, value_name = "whereabouts")]
    #[serde(default)]
    pub(crate) near: Option<String>,
    /// Search radius, e.g. "10km" (default "1km").
    #[arg(long = ARG_WITHIN, value_name = "radius")]
    #[serde(default)]
    pub(crate) within: Option<String>,
    /// Observation direction, either a compass point or an azimuth, e.g.
    /// "south", "SE", "120.3".
    #[arg(long = ARG_HEAD, value_name = "direction")]
    #[serde(default)]
    pub(crate) head: Option<String>,
    /// SQLite tile store (default "stargaze.db").
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Connections opened up front.
    #[arg(long = ARG_MIN_SESSIONS, value_name = "count")]
    #[serde(default)]
    pub(crate) min_sessions: Option<usize>,
    /// Upper bound on open connections.
    #[arg(long = ARG_MAX_SESSIONS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_sessions: Option<usize>,
    /// Seconds to wait for a free connection.
    #[arg(long = ARG_ACQUIRE_TIMEOUT, value_name = "seconds")]
    #[serde(default)]
    pub(crate) acquire_timeout_secs: Option<u64>,
    /// Overpass interpreter URL.
    #[arg(long = ARG_OVERPASS_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) overpass_endpoint: Option<String>,
    /// OpenTopography global DEM URL.
    #[arg(long = ARG_OPENTOPO_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) opentopo_endpoint: Option<String>,
    /// OpenTopography API key.
    #[arg(long = ARG_OPENTOPO_API_KEY, value_name = "key")]
    #[serde(default)]
    pub(crate) opentopo_api_key: Option<String>,
    /// Nominatim search URL.
    #[arg(long = ARG_NOMINATIM_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) nominatim_endpoint: Option<String>,
}

impl SearchArgs {
    pub(crate) fn into_config(self) -> Result<SearchConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SearchConfig::try_from(merged)
    }
}

/// Resolved search configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SearchConfig {
    /// Whereabouts as typed; resolved when the command runs.
    pub(crate) near: String,
    /// Search radius in metres.
    pub(crate) radius_m: f64,
    /// Observation azimuth in degrees.
    pub(crate) azimuth: Option<f64>,
    /// Tile store settings.
    pub(crate) pool: PoolConfig,
    pub(crate) overpass_endpoint: String,
    pub(crate) opentopo_endpoint: String,
    pub(crate) opentopo_api_key: Option<String>,
    pub(crate) nominatim_endpoint: String,
}

impl TryFrom<SearchArgs> for SearchConfig {
    type Error = CliError;

    fn try_from(args: SearchArgs) -> Result<Self, Self::Error> {
        let near = args.near.ok_or(CliError::MissingArgument {
            field: ARG_NEAR,
            env: ENV_NEAR,
        })?;
        let within = args.within.as_deref().unwrap_or(DEFAULT_RADIUS);
        let radius_m = parse_radius(within).map_err(CliError::InvalidRadius)?;
        let azimuth = args
            .head
            .as_deref()
            .map(parse_direction)
            .transpose()
            .map_err(CliError::InvalidDirection)?;

        let database = args
            .database
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE));
        let defaults = PoolConfig::new(database);
        let min_sessions = args.min_sessions.unwrap_or(defaults.min_sessions);
        let max_sessions = args
            .max_sessions
            .unwrap_or_else(|| defaults.max_sessions.max(min_sessions));
        let acquire_timeout = args
            .acquire_timeout_secs
            .map_or(defaults.acquire_timeout, Duration::from_secs);
        let pool = defaults
            .with_sessions(min_sessions, max_sessions)
            .with_acquire_timeout(acquire_timeout);

        Ok(Self {
            near,
            radius_m,
            azimuth,
            pool,
            overpass_endpoint: args
                .overpass_endpoint
                .unwrap_or_else(|| DEFAULT_OVERPASS_ENDPOINT.to_owned()),
            opentopo_endpoint: args
                .opentopo_endpoint
                .unwrap_or_else(|| DEFAULT_OPENTOPO_ENDPOINT.to_owned()),
            opentopo_api_key: args.opentopo_api_key,
            nominatim_endpoint: args
                .nominatim_endpoint
                .unwrap_or_else(|| DEFAULT_NOMINATIM_ENDPOINT.to_owned()),
        })
    }
}

/// What a search command does once coverage is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchCommand {
    /// Report the tiles lacking layers.
    Missing,
    /// Import missing layers and report what happened.
    Fill,
    /// Import missing layers, then list candidate spots.
    Find,
}

/// Builds the collaborators a search command needs.
pub(super) trait SearchBackend {
    fn whereabouts(&self, config: &SearchConfig) -> Result<FormatRegistry, CliError>;
    fn pipelines(&self, config: &SearchConfig) -> Result<Vec<Box<dyn LayerPipeline>>, CliError>;
    fn spot_finder(&self, config: &SearchConfig) -> Box<dyn SpotFinder>;
}

/// Network-backed collaborators.
pub(super) struct DefaultSearchBackend;

impl SearchBackend for DefaultSearchBackend {
    fn whereabouts(&self, config: &SearchConfig) -> Result<FormatRegistry, CliError> {
        let geocoder =
            NominatimClient::with_config(&HttpSourceConfig::new(config.nominatim_endpoint.clone()))
                .map_err(|source| CliError::BuildClient {
                    service: "Nominatim",
                    source,
                })?;
        FormatRegistry::standard(geocoder).map_err(|source| CliError::Whereabouts {
            input: config.near.clone(),
            source,
        })
    }

    fn pipelines(&self, config: &SearchConfig) -> Result<Vec<Box<dyn LayerPipeline>>, CliError> {
        let features =
            HttpOverpassClient::with_config(&HttpSourceConfig::new(config.overpass_endpoint.clone()))
                .map_err(|source| CliError::BuildClient {
                    service: "Overpass",
                    source,
                })?;
        let mut relief = OpenTopoConfig::new(config.opentopo_endpoint.clone());
        if let Some(key) = &config.opentopo_api_key {
            relief = relief.with_api_key(key.clone());
        }
        let rasters =
            HttpOpenTopoClient::with_config(relief).map_err(|source| CliError::BuildClient {
                service: "OpenTopography",
                source,
            })?;
        Ok(standard_pipelines(
            Arc::new(features),
            rasters,
            SqliteBlobConverter,
        ))
    }

    fn spot_finder(&self, _config: &SearchConfig) -> Box<dyn SpotFinder> {
        Box::new(NoSpots)
    }
}

#[derive(Debug, Serialize)]
struct MissingOutput<'a> {
    origin: Coordinates,
    radius_m: f64,
    tiles: &'a [MissingTile],
}

#[derive(Debug, Serialize)]
struct FillOutput<'a> {
    origin: Coordinates,
    radius_m: f64,
    report: &'a CoverageReport,
}

#[derive(Debug, Serialize)]
struct FindOutput<'a> {
    origin: Coordinates,
    radius_m: f64,
    azimuth: Option<f64>,
    spots: &'a [Coordinates],
}

pub(super) fn run_search(command: SearchCommand, args: SearchArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_search_with(command, args, &DefaultSearchBackend, &mut stdout)
}

pub(super) fn run_search_with(
    command: SearchCommand,
    args: SearchArgs,
    backend: &dyn SearchBackend,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let origin = backend
        .whereabouts(&config)?
        .resolve(&config.near)
        .map_err(|source| CliError::Whereabouts {
            input: config.near.clone(),
            source,
        })?;
    log::info!(
        "searching within {} m of {origin} for {command:?}",
        config.radius_m
    );

    let pool = SessionPool::open(config.pool.clone()).map_err(|source| CliError::OpenStore {
        path: config.pool.database.clone(),
        source,
    })?;
    let outcome = execute(command, &pool, backend, &config, origin, writer);
    pool.close();
    outcome
}

fn execute(
    command: SearchCommand,
    pool: &SessionPool,
    backend: &dyn SearchBackend,
    config: &SearchConfig,
    origin: Coordinates,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let radius_m = config.radius_m;
    match command {
        SearchCommand::Missing => {
            let session = pool.acquire().map_err(CoverageError::from)?;
            let tiles = CoverageResolver::default().missing_layers(&session, origin, radius_m)?;
            write_json(
                writer,
                &MissingOutput {
                    origin,
                    radius_m,
                    tiles: &tiles,
                },
            )
        }
        SearchCommand::Fill => {
            let report = fill(pool, backend, config, origin)?;
            write_json(
                writer,
                &FillOutput {
                    origin,
                    radius_m,
                    report: &report,
                },
            )
        }
        SearchCommand::Find => {
            fill(pool, backend, config, origin)?;
            let spots = backend
                .spot_finder(config)
                .find_spots(origin, radius_m, config.azimuth)?;
            write_json(
                writer,
                &FindOutput {
                    origin,
                    radius_m,
                    azimuth: config.azimuth,
                    spots: &spots,
                },
            )
        }
    }
}

fn fill(
    pool: &SessionPool,
    backend: &dyn SearchBackend,
    config: &SearchConfig,
    origin: Coordinates,
) -> Result<CoverageReport, CliError> {
    let filler = CoverageFiller::new(
        pool.clone(),
        CoverageResolver::default(),
        backend.pipelines(config)?,
    );
    match filler.ensure_coverage(origin, config.radius_m) {
        Ok(report) => Ok(report),
        Err(CoverageError::Incomplete { report }) => {
            for failure in &report.failed {
                log::warn!(
                    "{} layer of tile {} failed: {}",
                    failure.layer,
                    failure.geohash,
                    failure.error
                );
            }
            Err(CliError::IncompleteCoverage {
                failed: report.failed.len(),
            })
        }
        Err(other) => Err(other.into()),
    }
}

fn write_json<T: Serialize>(writer: &mut dyn Write, output: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(output).map_err(CliError::SerializeOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SearchConfig, CliError> {
    let merged = SearchArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SearchConfig::try_from(merged)
}
