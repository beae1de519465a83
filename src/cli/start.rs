use anyhow::Result;
use clap::ArgMatches;

use crate::cli::{actions::Action, commands, dispatch, telemetry};

/// Parse the command line, set up logging and resolve the action to run.
///
/// # Errors
///
/// Returns an error if telemetry cannot be initialized or the arguments do
/// not describe a runnable action.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();
    start_with(&matches)
}

fn start_with(matches: &ArgMatches) -> Result<Action> {
    let logging = commands::logging::Options::parse(matches);
    telemetry::init(logging.level, logging.format)?;
    dispatch::handler(matches)
}
