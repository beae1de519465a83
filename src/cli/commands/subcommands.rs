//! Operator subcommands. Each maps to one `Action`.

use clap::{Arg, ArgAction, ArgGroup, Command};
use uuid::Uuid;

pub const CMD_PERMISSIONS: &str = "permissions";
pub const CMD_ROLES: &str = "roles";
pub const CMD_RATE_LIMIT: &str = "rate-limit";
pub const CMD_RISK: &str = "risk";
pub const CMD_TRUST: &str = "trust";
pub const CMD_SCHEMA: &str = "schema";

pub const ARG_USER: &str = "user";
pub const ARG_ROLE: &str = "role";
pub const ARG_ASSIGNED_BY: &str = "assigned-by";
pub const ARG_RESOURCE: &str = "resource";
pub const ARG_ACTION: &str = "action";
pub const ARG_ALL: &str = "all";
pub const ARG_IDENTIFIER: &str = "identifier";
pub const ARG_ENDPOINT: &str = "endpoint";
pub const ARG_TRUST_SCORE: &str = "trust-score";
pub const ARG_IP: &str = "ip";
pub const ARG_DEVICE: &str = "device";
pub const ARG_LOCATION: &str = "location";
pub const ARG_LATITUDE: &str = "lat";
pub const ARG_LONGITUDE: &str = "lon";
pub const ARG_SESSION: &str = "session";

fn uuid_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .value_parser(clap::value_parser!(Uuid))
}

fn user_arg() -> Arg {
    uuid_arg(ARG_USER, "User id").required(true)
}

fn text_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).help(help).required(true)
}

fn permissions() -> Command {
    Command::new(CMD_PERMISSIONS)
        .about("Inspect and invalidate resolved permissions")
        .subcommand_required(true)
        .subcommand(
            Command::new("show")
                .about("Print the effective permission set of a user")
                .arg(user_arg()),
        )
        .subcommand(
            Command::new("check")
                .about("Check whether a user may perform an action on a resource")
                .arg(user_arg())
                .arg(text_arg(ARG_RESOURCE, "Resource name"))
                .arg(text_arg(ARG_ACTION, "Action name")),
        )
        .subcommand(
            Command::new("invalidate")
                .about("Drop cached permission sets")
                .arg(uuid_arg(ARG_USER, "Invalidate a single user"))
                .arg(
                    Arg::new(ARG_ALL)
                        .long(ARG_ALL)
                        .help("Invalidate every user")
                        .action(ArgAction::SetTrue),
                )
                .group(
                    ArgGroup::new("target")
                        .args([ARG_USER, ARG_ALL])
                        .required(true),
                ),
        )
}

fn roles() -> Command {
    Command::new(CMD_ROLES)
        .about("Manage role assignments")
        .subcommand_required(true)
        .subcommand(
            Command::new("assign")
                .about("Assign a role to a user")
                .arg(user_arg())
                .arg(uuid_arg(ARG_ROLE, "Role id").required(true))
                .arg(uuid_arg(ARG_ASSIGNED_BY, "Id of the administrator making the change")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove a role from a user")
                .arg(user_arg())
                .arg(uuid_arg(ARG_ROLE, "Role id").required(true)),
        )
}

fn rate_limit() -> Command {
    Command::new(CMD_RATE_LIMIT)
        .about("Inspect and reset rate-limit windows")
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Count one request against the window and print the result")
                .arg(text_arg(ARG_IDENTIFIER, "Rate-limit subject, e.g. an IP or user id"))
                .arg(text_arg(ARG_ENDPOINT, "Endpoint class, e.g. login"))
                .arg(
                    Arg::new(ARG_TRUST_SCORE)
                        .long(ARG_TRUST_SCORE)
                        .help("Session trust score used to relax the limit")
                        .default_value("0")
                        .value_parser(clap::value_parser!(u8).range(0..=100)),
                ),
        )
        .subcommand(
            Command::new("reset")
                .about("Clear the window for an identifier and endpoint")
                .arg(text_arg(ARG_IDENTIFIER, "Rate-limit subject"))
                .arg(text_arg(ARG_ENDPOINT, "Endpoint class")),
        )
}

fn risk() -> Command {
    Command::new(CMD_RISK)
        .about("Assess login risk")
        .subcommand_required(true)
        .subcommand(
            Command::new("assess")
                .about("Score a login against the user's history")
                .arg(user_arg())
                .arg(text_arg(ARG_IP, "Client IP address"))
                .arg(text_arg(ARG_DEVICE, "Device fingerprint"))
                .arg(
                    Arg::new(ARG_LOCATION)
                        .long(ARG_LOCATION)
                        .help("Location label, e.g. \"Berlin, DE\""),
                )
                .arg(
                    Arg::new(ARG_LATITUDE)
                        .long(ARG_LATITUDE)
                        .help("Latitude of the location")
                        .requires_all([ARG_LONGITUDE, ARG_LOCATION])
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new(ARG_LONGITUDE)
                        .long(ARG_LONGITUDE)
                        .help("Longitude of the location")
                        .requires_all([ARG_LATITUDE, ARG_LOCATION])
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(f64)),
                ),
        )
}

fn trust() -> Command {
    Command::new(CMD_TRUST)
        .about("Session trust scoring")
        .subcommand_required(true)
        .subcommand(
            Command::new("recompute")
                .about("Recompute and store the trust score of a session")
                .arg(uuid_arg(ARG_SESSION, "Session id").required(true)),
        )
}

fn schema() -> Command {
    Command::new(CMD_SCHEMA).about("Create the cache and rate-limit tables")
}

#[must_use]
pub fn with_subcommands(command: Command) -> Command {
    command
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(permissions())
        .subcommand(roles())
        .subcommand(rate_limit())
        .subcommand(risk())
        .subcommand(trust())
        .subcommand(schema())
}
