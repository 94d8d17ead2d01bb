pub mod images;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_SUBJECT_HEADER: &str = "subject-header";

pub const DEFAULT_SUBJECT_HEADER: &str = "x-subject-id";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("pictogate")
        .about("Graphical image-sequence authentication")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("PICTOGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "Postgres connection string for the credential store. When absent, credentials are kept in memory and lost on restart.",
                )
                .env("PICTOGATE_DSN"),
        )
        .arg(
            Arg::new(ARG_SUBJECT_HEADER)
                .long(ARG_SUBJECT_HEADER)
                .help("Header carrying the authenticated subject id, set by the gateway")
                .default_value(DEFAULT_SUBJECT_HEADER)
                .env("PICTOGATE_SUBJECT_HEADER")
                .value_parser(|value: &str| -> std::result::Result<String, String> {
                    axum::http::HeaderName::from_bytes(value.as_bytes())
                        .map(|name| name.as_str().to_string())
                        .map_err(|_| format!("invalid header name: {value}"))
                }),
        );

    let command = images::with_args(command);
    logging::with_args(command)
}
