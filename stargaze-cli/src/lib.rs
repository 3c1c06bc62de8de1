//! Command-line interface for finding stargazing spots.
//!
//! Every command resolves `--near` to coordinates and works on the tiles
//! within `--within` of it. `missing` reports tiles still lacking layers,
//! `fill` imports them, and `find` fills and then lists candidate spots.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
pub mod parsing;
mod search;

pub use error::CliError;

use search::{SearchArgs, SearchCommand};

const ARG_NEAR: &str = "near";
const ARG_WITHIN: &str = "within";
const ARG_HEAD: &str = "head";
const ARG_DATABASE: &str = "database";
const ARG_MIN_SESSIONS: &str = "min-sessions";
const ARG_MAX_SESSIONS: &str = "max-sessions";
const ARG_ACQUIRE_TIMEOUT: &str = "acquire-timeout-secs";
const ARG_OVERPASS_ENDPOINT: &str = "overpass-endpoint";
const ARG_OPENTOPO_ENDPOINT: &str = "opentopo-endpoint";
const ARG_OPENTOPO_API_KEY: &str = "opentopo-api-key";
const ARG_NOMINATIM_ENDPOINT: &str = "nominatim-endpoint";
const ENV_NEAR: &str = "STARGAZE_CMDS_SEARCH_NEAR";

/// Run the Stargaze CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let (command, args) = cli.command.into_search();
    search::run_search(command, args)
}

#[derive(Debug, Parser)]
#[command(
    name = "stargaze",
    about = "stargaze helps you find the best spot for astronomical observations",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the tiles around a place that still lack data.
    Missing(SearchArgs),
    /// Import whatever data is missing around a place.
    Fill(SearchArgs),
    /// Fill coverage, then list candidate observation spots.
    Find(SearchArgs),
}

impl Command {
    fn into_search(self) -> (SearchCommand, SearchArgs) {
        match self {
            Self::Missing(args) => (SearchCommand::Missing, args),
            Self::Fill(args) => (SearchCommand::Fill, args),
            Self::Find(args) => (SearchCommand::Find, args),
        }
    }
}

#[cfg(test)]
mod tests;
