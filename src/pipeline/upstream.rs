//! Generative image service adapter.
//!
//! One call produces one image through an OpenAI-compatible chat completions
//! gateway. The image URL is read from
//! `choices[0].message.images[0].image_url.url`.

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::{future::Future, pin::Pin, time::Duration};
use thiserror::Error;
use tracing::{error, instrument};

use crate::{cli::globals::GlobalArgs, credential::ImageReference, APP_USER_AGENT};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamFailure {
    #[error("rate limited (429)")]
    RateLimited,
    #[error("payment required (402)")]
    QuotaExhausted,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("no image URL in response")]
    Malformed,
    #[error("transport error: {0}")]
    Transport(String),
}

pub type UpstreamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ImageReference, UpstreamFailure>> + Send + 'a>>;

/// One-image generation call toward the upstream service.
pub trait ImageGenerator: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> UpstreamFuture<'a>;
}

pub struct HttpImageGenerator {
    client: Client,
    url: String,
    api_key: SecretString,
    model: String,
}

impl std::fmt::Debug for HttpImageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpImageGenerator")
            .field("url", &self.url)
            .field("api_key", &"***")
            .field("model", &self.model)
            .finish()
    }
}

impl HttpImageGenerator {
    /// Build the client from the process-wide image service settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(globals: &GlobalArgs) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(globals.image_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            url: globals.image_api_url.clone(),
            api_key: globals.image_api_key.clone(),
            model: globals.image_model.clone(),
        })
    }

    #[instrument(skip(self, prompt))]
    async fn request(&self, prompt: &str) -> Result<ImageReference, UpstreamFailure> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "modalities": ["image", "text"]
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Error calling image service: {}", e);
                UpstreamFailure::Transport(e.to_string())
            })?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(UpstreamFailure::RateLimited),
            StatusCode::PAYMENT_REQUIRED => return Err(UpstreamFailure::QuotaExhausted),
            _ if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                error!("Image service error: {} - {}", status, body);
                return Err(UpstreamFailure::Status(status.as_u16()));
            }
            _ => {}
        }

        let json_response: Value = response.json().await.map_err(|e| {
            error!("Error parsing image service response: {}", e);
            UpstreamFailure::Malformed
        })?;

        json_response["choices"][0]["message"]["images"][0]["image_url"]["url"]
            .as_str()
            .filter(|url| !url.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                error!("Image service response has no image URL");
                UpstreamFailure::Malformed
            })
    }
}

impl ImageGenerator for HttpImageGenerator {
    fn generate<'a>(&'a self, prompt: &'a str) -> UpstreamFuture<'a> {
        Box::pin(self.request(prompt))
    }
}
