//! Command-line argument dispatch.
//!
//! Maps validated CLI arguments to the action to run, resolving the image
//! service settings once so nothing downstream reads the environment again.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{images, ARG_DSN, ARG_PORT, ARG_SUBJECT_HEADER, DEFAULT_SUBJECT_HEADER};
use crate::cli::globals::GlobalArgs;
use anyhow::Result;
use std::time::Duration;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let dsn = matches.get_one::<String>(ARG_DSN).cloned();

    let subject_header = matches
        .get_one::<String>(ARG_SUBJECT_HEADER)
        .cloned()
        .unwrap_or_else(|| DEFAULT_SUBJECT_HEADER.to_string());

    let image_opts = images::Options::parse(matches)?;

    let globals = GlobalArgs::new(image_opts.url, image_opts.api_key, image_opts.model)
        .with_timeout_seconds(image_opts.timeout_seconds);

    Ok(Action::Server(Args {
        port,
        dsn,
        subject_header,
        globals,
        batch_size: image_opts.batch_size,
        batch_delay: Duration::from_millis(image_opts.batch_delay_ms),
        max_attempts: image_opts.max_attempts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars(
            [
                ("PICTOGATE_DSN", None::<&str>),
                ("PICTOGATE_PORT", Some("8443")),
                ("PICTOGATE_IMAGE_API_KEY", Some("sk-dispatch")),
                ("PICTOGATE_BATCH_DELAY_MS", Some("250")),
                ("PICTOGATE_SUBJECT_HEADER", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["pictogate"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                let Ok(Action::Server(args)) = result else {
                    return;
                };
                assert_eq!(args.port, 8443);
                assert_eq!(args.dsn, None);
                assert_eq!(args.subject_header, "x-subject-id");
                assert_eq!(args.batch_delay, Duration::from_millis(250));
                assert_eq!(args.globals.image_api_key.expose_secret(), "sk-dispatch");
            },
        );
    }

    #[test]
    fn handler_args_debug_redacts_key() {
        temp_env::with_vars(
            [("PICTOGATE_IMAGE_API_KEY", Some("sk-hidden"))],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["pictogate"]);
                let rendered = format!("{:?}", handler(&matches).ok());
                assert!(!rendered.contains("sk-hidden"));
            },
        );
    }
}
