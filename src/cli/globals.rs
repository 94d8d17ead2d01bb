use secrecy::SecretString;

pub const DEFAULT_IMAGE_TIMEOUT_SECONDS: u64 = 60;

/// Image service settings resolved once at startup.
#[derive(Clone)]
pub struct GlobalArgs {
    pub image_api_url: String,
    pub image_api_key: SecretString,
    pub image_model: String,
    pub image_timeout_seconds: u64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(url: String, api_key: SecretString, model: String) -> Self {
        Self {
            image_api_url: url,
            image_api_key: api_key,
            image_model: model,
            image_timeout_seconds: DEFAULT_IMAGE_TIMEOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.image_timeout_seconds = seconds.max(1);
        self
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("image_api_url", &self.image_api_url)
            .field("image_api_key", &"***")
            .field("image_model", &self.image_model)
            .field("image_timeout_seconds", &self.image_timeout_seconds)
            .finish()
    }
}
