use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_DSN: &str = "dsn";

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: SecretString,
}

impl Options {
    /// Parse database arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the DSN is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        match matches.get_one::<String>(ARG_DSN) {
            Some(dsn) if !dsn.trim().is_empty() => Ok(Self {
                dsn: SecretString::from(dsn.clone()),
            }),
            _ => anyhow::bail!("missing required argument: --{ARG_DSN}"),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_DSN)
            .short('d')
            .long(ARG_DSN)
            .help("Database connection string")
            .long_help(
                "Postgres connection string. The database holds the role tables, the session and login-attempt history, and the cache tables created by `schema`.",
            )
            .env("PERMESI_TRUST_DSN")
            .global(true),
    )
}
