use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_PERMISSION_CACHE_TTL_SECONDS: &str = "permission-cache-ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub permission_cache_ttl: Duration,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let seconds = matches
            .get_one::<u64>(ARG_PERMISSION_CACHE_TTL_SECONDS)
            .copied()
            .unwrap_or(300);
        Self {
            permission_cache_ttl: Duration::from_secs(seconds),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_PERMISSION_CACHE_TTL_SECONDS)
            .long(ARG_PERMISSION_CACHE_TTL_SECONDS)
            .help("Lifetime of cached user permission sets, in seconds")
            .default_value("300")
            .env("PERMESI_TRUST_PERMISSION_CACHE_TTL_SECONDS")
            .global(true)
            .value_parser(clap::value_parser!(u64).range(1..)),
    )
}
