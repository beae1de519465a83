use clap::{Arg, ArgMatches, Command};
use std::time::Duration;
use url::Url;

pub const ARG_IP_REPUTATION_URL: &str = "ip-reputation-url";
pub const ARG_IP_REPUTATION_TIMEOUT_MS: &str = "ip-reputation-timeout-ms";
pub const ARG_BAD_IP_RANGES: &str = "bad-ip-ranges";
pub const ARG_VELOCITY_MAX_PER_MINUTE: &str = "velocity-max-per-minute";
pub const ARG_VELOCITY_MAX_PER_HOUR: &str = "velocity-max-per-hour";

#[derive(Debug, Clone)]
pub struct Options {
    pub reputation_url: Option<Url>,
    pub reputation_timeout: Duration,
    pub bad_ip_ranges: Vec<String>,
    pub velocity_max_per_minute: u32,
    pub velocity_max_per_hour: u32,
}

impl Options {
    /// Parse risk scoring arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the reputation URL is not a valid URL.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let reputation_url = matches
            .get_one::<String>(ARG_IP_REPUTATION_URL)
            .filter(|v| !v.trim().is_empty())
            .map(|v| Url::parse(v))
            .transpose()
            .map_err(|err| anyhow::anyhow!("invalid --{ARG_IP_REPUTATION_URL}: {err}"))?;

        let bad_ip_ranges = matches
            .get_many::<String>(ARG_BAD_IP_RANGES)
            .map(|values| {
                values
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            reputation_url,
            reputation_timeout: Duration::from_millis(
                matches
                    .get_one::<u64>(ARG_IP_REPUTATION_TIMEOUT_MS)
                    .copied()
                    .unwrap_or(300),
            ),
            bad_ip_ranges,
            velocity_max_per_minute: matches
                .get_one::<u32>(ARG_VELOCITY_MAX_PER_MINUTE)
                .copied()
                .unwrap_or(5),
            velocity_max_per_hour: matches
                .get_one::<u32>(ARG_VELOCITY_MAX_PER_HOUR)
                .copied()
                .unwrap_or(20),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IP_REPUTATION_URL)
                .long(ARG_IP_REPUTATION_URL)
                .help("Base URL of the IP reputation service")
                .long_help(
                    "Base URL of the IP reputation service. The address is appended as the last path segment and the response must be `{\"score\": <0..1>}`.\n\nWhen unset, the built-in table is used: private ranges score 0, --bad-ip-ranges score 0.8, everything else 0.1.",
                )
                .env("PERMESI_TRUST_IP_REPUTATION_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_IP_REPUTATION_TIMEOUT_MS)
                .long(ARG_IP_REPUTATION_TIMEOUT_MS)
                .help("Timeout for IP reputation lookups, in milliseconds")
                .default_value("300")
                .env("PERMESI_TRUST_IP_REPUTATION_TIMEOUT_MS")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_BAD_IP_RANGES)
                .long(ARG_BAD_IP_RANGES)
                .help("Comma separated CIDR ranges with bad reputation")
                .env("PERMESI_TRUST_BAD_IP_RANGES")
                .global(true)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_VELOCITY_MAX_PER_MINUTE)
                .long(ARG_VELOCITY_MAX_PER_MINUTE)
                .help("Login attempts per minute that count as full velocity")
                .default_value("5")
                .env("PERMESI_TRUST_VELOCITY_MAX_PER_MINUTE")
                .global(true)
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_VELOCITY_MAX_PER_HOUR)
                .long(ARG_VELOCITY_MAX_PER_HOUR)
                .help("Login attempts per hour that count as full velocity")
                .default_value("20")
                .env("PERMESI_TRUST_VELOCITY_MAX_PER_HOUR")
                .global(true)
                .value_parser(clap::value_parser!(u32)),
        )
}
