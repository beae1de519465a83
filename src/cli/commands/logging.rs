//! Diagnostic output settings.
//!
//! Command results always go to stdout as JSON. These arguments only shape
//! the log stream on stderr: how much is logged and whether each line is
//! plain text or a JSON object for log shippers.

use clap::{Arg, ArgAction, ArgMatches, Command, builder::PossibleValuesParser};
use tracing::Level;

use crate::cli::telemetry::LogFormat;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_LEVEL: &str = "log-level";
pub const ARG_LOG_FORMAT: &str = "log-format";

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// `None` leaves the default (errors only) in place.
    pub level: Option<Level>,
    pub format: LogFormat,
}

impl Options {
    /// An explicit `--log-level` wins over the `-v` count.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let named = matches
            .get_one::<String>(ARG_LOG_LEVEL)
            .and_then(|level| level.parse::<Level>().ok());
        let counted = level_from_count(matches.get_count(ARG_VERBOSITY));

        let format = match matches.get_one::<String>(ARG_LOG_FORMAT).map(String::as_str) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            level: named.or(counted),
            format,
        }
    }
}

const fn level_from_count(count: u8) -> Option<Level> {
    match count {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Raise log verbosity: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE")
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long(ARG_LOG_LEVEL)
                .help("Log level, overrides -v")
                .env("PERMESI_TRUST_LOG_LEVEL")
                .global(true)
                .ignore_case(true)
                .value_parser(PossibleValuesParser::new(LEVELS)),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long(ARG_LOG_FORMAT)
                .help("Log line format on stderr")
                .env("PERMESI_TRUST_LOG_FORMAT")
                .global(true)
                .default_value("text")
                .value_parser(PossibleValuesParser::new(["text", "json"])),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str], level: Option<&str>, format: Option<&str>) -> Options {
        temp_env::with_vars(
            [
                ("PERMESI_TRUST_LOG_LEVEL", level),
                ("PERMESI_TRUST_LOG_FORMAT", format),
            ],
            || {
                let mut argv = vec!["permesi-trust"];
                argv.extend_from_slice(args);
                let matches = with_args(Command::new("permesi-trust")).get_matches_from(argv);
                Options::parse(&matches)
            },
        )
    }

    #[test]
    fn defaults_to_quiet_text() {
        let options = parse(&[], None, None);
        assert_eq!(options.level, None);
        assert_eq!(options.format, LogFormat::Text);
    }

    #[test]
    fn counts_verbose_flags() {
        assert_eq!(parse(&["-v"], None, None).level, Some(Level::WARN));
        assert_eq!(parse(&["-vv"], None, None).level, Some(Level::INFO));
        assert_eq!(parse(&["-vvv"], None, None).level, Some(Level::DEBUG));
        assert_eq!(parse(&["-vvvvvv"], None, None).level, Some(Level::TRACE));
    }

    #[test]
    fn env_level_overrides_count() {
        let options = parse(&["-v"], Some("DEBUG"), None);
        assert_eq!(options.level, Some(Level::DEBUG));
    }

    #[test]
    fn json_format_from_env() {
        let options = parse(&[], None, Some("json"));
        assert_eq!(options.format, LogFormat::Json);
    }

    #[test]
    fn unknown_level_is_rejected() {
        temp_env::with_vars([("PERMESI_TRUST_LOG_LEVEL", None::<&str>)], || {
            let result = with_args(Command::new("permesi-trust")).try_get_matches_from(vec![
                "permesi-trust",
                "--log-level",
                "loud",
            ]);
            assert!(result.is_err());
        });
    }
}
