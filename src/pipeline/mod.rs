//! Resilient image supply pipeline.
//!
//! A request for `count` themed images is split into batches of at most
//! `batch_size` items. Items in a batch run concurrently on the calling task and
//! the batch is joined before the next one starts, with a fixed pause in between.
//! Rate-limited items are retried with exponential backoff; quota exhaustion and
//! any other upstream failure end the request at once. The caller gets every
//! image in submission order or a single classified error, never a partial grid.

pub mod upstream;

pub use upstream::{HttpImageGenerator, ImageGenerator, UpstreamFailure};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::credential::ImageReference;

pub const MAX_IMAGE_COUNT: usize = 40;
pub const MAX_THEME_CHARS: usize = 50;
pub const MIN_BATCH_SIZE: usize = 3;
pub const MAX_BATCH_SIZE: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),
    #[error("image service rate limit exceeded")]
    RateLimited,
    #[error("image service quota exhausted")]
    QuotaExhausted,
    #[error("image service failed")]
    UpstreamError,
}

impl GenerationError {
    /// Message safe to show to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidRequest(reason) => reason.clone(),
            Self::RateLimited => {
                "The image service is busy right now. Please try again later.".to_string()
            }
            Self::QuotaExhausted => {
                "Image generation credits are exhausted. Add credits to the image service account to continue."
                    .to_string()
            }
            Self::UpstreamError => "Failed to generate images".to_string(),
        }
    }
}

impl From<UpstreamFailure> for GenerationError {
    fn from(failure: UpstreamFailure) -> Self {
        match failure {
            UpstreamFailure::RateLimited => Self::RateLimited,
            UpstreamFailure::QuotaExhausted => Self::QuotaExhausted,
            UpstreamFailure::Status(_)
            | UpstreamFailure::Malformed
            | UpstreamFailure::Transport(_) => Self::UpstreamError,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub theme: String,
    pub count: usize,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(theme: impl Into<String>, count: usize) -> Self {
        Self {
            theme: theme.into(),
            count,
        }
    }

    /// Check the request and return the theme as it may be used in a prompt.
    ///
    /// # Errors
    /// Returns `GenerationError::InvalidRequest` for a blank theme, a theme with
    /// nothing left after sanitizing, or a count outside `1..=40`.
    pub fn validate(&self) -> Result<String, GenerationError> {
        if self.theme.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "Theme is required and must be a non-empty string".to_string(),
            ));
        }
        if !(1..=MAX_IMAGE_COUNT).contains(&self.count) {
            return Err(GenerationError::InvalidRequest(format!(
                "Count must be a number between 1 and {MAX_IMAGE_COUNT}"
            )));
        }
        let theme = sanitize_theme(&self.theme);
        if theme.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "Theme must contain letters or numbers".to_string(),
            ));
        }
        Ok(theme)
    }
}

/// Generated images in submission order, before any display shuffle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationResult {
    images: Vec<ImageReference>,
}

impl GenerationResult {
    #[must_use]
    pub fn from_images(images: Vec<ImageReference>) -> Self {
        Self { images }
    }

    #[must_use]
    pub fn images(&self) -> &[ImageReference] {
        &self.images
    }

    #[must_use]
    pub fn into_images(self) -> Vec<ImageReference> {
        self.images
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Keep ASCII letters, digits and whitespace, trim, and cap at 50 characters.
#[must_use]
pub fn sanitize_theme(theme: &str) -> String {
    let stripped: String = theme
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .take(MAX_THEME_CHARS)
        .collect();
    stripped.trim().to_string()
}

fn build_prompt(theme: &str, index: usize) -> String {
    format!(
        "A simple, recognizable icon-style image of a {theme}, variation {}. Clean, minimalist design suitable for authentication. High quality, clear details.",
        index + 1
    )
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    batch_size: usize,
    batch_delay: Duration,
    max_attempts: u32,
    backoff_unit: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    /// Default config: batches of 5, 1s between batches, 3 attempts per item and
    /// a 2^attempt second backoff on rate limiting.
    #[must_use]
    pub fn new() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            batch_delay: Duration::from_secs(1),
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Base of the exponential backoff; the wait after attempt `n` is `unit * 2^n`.
    #[must_use]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            batch_size: self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
            max_attempts: self.max_attempts.max(1),
            ..self
        }
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Clone)]
pub struct Pipeline {
    generator: Arc<dyn ImageGenerator>,
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(generator: Arc<dyn ImageGenerator>, config: PipelineConfig) -> Self {
        Self {
            generator,
            config: config.normalize(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce `request.count` images for `request.theme`.
    ///
    /// # Errors
    /// Returns the classified failure of the first item that failed; no images
    /// are returned in that case.
    #[instrument(skip(self, request), fields(count = request.count))]
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let theme = request.validate()?;

        info!("Generating {} images for theme: {}", request.count, theme);

        let indices: Vec<usize> = (0..request.count).collect();
        let mut images = Vec::with_capacity(request.count);

        for (batch, chunk) in indices.chunks(self.config.batch_size).enumerate() {
            if batch > 0 && !self.config.batch_delay.is_zero() {
                sleep(self.config.batch_delay).await;
            }

            debug!(batch, size = chunk.len(), "starting batch");

            let calls = chunk
                .iter()
                .map(|&index| self.generate_item(&theme, index, request.count));
            images.extend(try_join_all(calls).await?);
        }

        Ok(GenerationResult { images })
    }

    async fn generate_item(
        &self,
        theme: &str,
        index: usize,
        count: usize,
    ) -> Result<ImageReference, GenerationError> {
        let prompt = build_prompt(theme, index);
        let mut attempt = 1;

        loop {
            match self.generator.generate(&prompt).await {
                Ok(image) => {
                    debug!("Generated image {}/{}", index + 1, count);
                    return Ok(image);
                }
                Err(UpstreamFailure::RateLimited) if attempt < self.config.max_attempts => {
                    let backoff = self.config.backoff(attempt);
                    warn!(
                        theme,
                        index, attempt, "Rate limited, backing off for {:?}", backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(failure) => {
                    error!(theme, index, attempt, "Image generation failed: {}", failure);
                    return Err(failure.into());
                }
            }
        }
    }
}
