//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use stargaze_cli::CliError;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match stargaze_cli::run() {
        Ok(()) => {}
        // Clap renders help, version and usage errors itself.
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("stargaze: {err}");
            std::process::exit(1);
        }
    }
}
