use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

use crate::cli::globals::DEFAULT_IMAGE_TIMEOUT_SECONDS;
use crate::pipeline::{MAX_BATCH_SIZE, MIN_BATCH_SIZE};

pub const ARG_IMAGE_API_URL: &str = "image-api-url";
pub const ARG_IMAGE_API_KEY: &str = "image-api-key";
pub const ARG_IMAGE_MODEL: &str = "image-model";
pub const ARG_IMAGE_TIMEOUT_SECONDS: &str = "image-timeout-seconds";
pub const ARG_BATCH_SIZE: &str = "batch-size";
pub const ARG_BATCH_DELAY_MS: &str = "batch-delay-ms";
pub const ARG_MAX_ATTEMPTS: &str = "max-attempts";

pub const DEFAULT_IMAGE_API_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_IMAGE_MODEL: &str = "google/gemini-2.5-flash-image-preview";

#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub api_key: SecretString,
    pub model: String,
    pub timeout_seconds: u64,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_attempts: u32,
}

impl Options {
    /// Parse image service and pipeline options from CLI matches.
    ///
    /// # Errors
    /// Returns an error if the API key is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let url = matches
            .get_one::<String>(ARG_IMAGE_API_URL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_IMAGE_API_URL.to_string());
        let api_key = matches
            .get_one::<String>(ARG_IMAGE_API_KEY)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --image-api-key")?;
        let model = matches
            .get_one::<String>(ARG_IMAGE_MODEL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());

        Ok(Self {
            url,
            api_key,
            model,
            timeout_seconds: matches
                .get_one::<u64>(ARG_IMAGE_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_IMAGE_TIMEOUT_SECONDS),
            batch_size: matches
                .get_one::<usize>(ARG_BATCH_SIZE)
                .copied()
                .unwrap_or(MAX_BATCH_SIZE),
            batch_delay_ms: matches
                .get_one::<u64>(ARG_BATCH_DELAY_MS)
                .copied()
                .unwrap_or(1000),
            max_attempts: matches
                .get_one::<u32>(ARG_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(3),
        })
    }
}

/// Accept absolute http(s) URLs only.
#[must_use]
pub fn validator_url() -> clap::builder::ValueParser {
    clap::builder::ValueParser::from(move |value: &str| -> std::result::Result<String, String> {
        let url = Url::parse(value).map_err(|err| format!("invalid URL: {err}"))?;
        match url.scheme() {
            "http" | "https" => Ok(value.to_string()),
            scheme => Err(format!("unsupported URL scheme: {scheme}")),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IMAGE_API_URL)
                .long(ARG_IMAGE_API_URL)
                .help("Chat completions endpoint of the image generation service")
                .default_value(DEFAULT_IMAGE_API_URL)
                .env("PICTOGATE_IMAGE_API_URL")
                .value_parser(validator_url()),
        )
        .arg(
            Arg::new(ARG_IMAGE_API_KEY)
                .long(ARG_IMAGE_API_KEY)
                .help("API key for the image generation service")
                .env("PICTOGATE_IMAGE_API_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_IMAGE_MODEL)
                .long(ARG_IMAGE_MODEL)
                .help("Image generation model")
                .default_value(DEFAULT_IMAGE_MODEL)
                .env("PICTOGATE_IMAGE_MODEL"),
        )
        .arg(
            Arg::new(ARG_IMAGE_TIMEOUT_SECONDS)
                .long(ARG_IMAGE_TIMEOUT_SECONDS)
                .help("HTTP timeout for one image generation call")
                .default_value("60")
                .env("PICTOGATE_IMAGE_TIMEOUT_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_BATCH_SIZE)
                .long(ARG_BATCH_SIZE)
                .help("Concurrent image generation calls per batch (3-5)")
                .default_value("5")
                .env("PICTOGATE_BATCH_SIZE")
                .value_parser(|value: &str| -> std::result::Result<usize, String> {
                    match value.parse::<usize>() {
                        Ok(size) if (MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) => Ok(size),
                        _ => Err(format!(
                            "batch size must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}"
                        )),
                    }
                }),
        )
        .arg(
            Arg::new(ARG_BATCH_DELAY_MS)
                .long(ARG_BATCH_DELAY_MS)
                .help("Pause between batches in milliseconds")
                .default_value("1000")
                .env("PICTOGATE_BATCH_DELAY_MS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS)
                .long(ARG_MAX_ATTEMPTS)
                .help("Attempts per image when the service is rate limiting")
                .default_value("3")
                .env("PICTOGATE_MAX_ATTEMPTS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}
