use std::env;
use std::time::Duration;

use studio_contracts::options::{AspectRatio, ResolutionTier};

use crate::retry::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";

#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: ResolutionTier,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            aspect_ratio: AspectRatio::PORTRAIT,
            resolution: ResolutionTier::FourK,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(90),
        }
    }
}

impl StudioConfig {
    /// Defaults overridden by `GEMINI_API_BASE`, `STUDIO_IMAGE_MODEL`,
    /// `STUDIO_TEXT_MODEL` and `STUDIO_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(base) = non_empty("GEMINI_API_BASE") {
            self.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty("STUDIO_IMAGE_MODEL") {
            self.image_model = model;
        }
        if let Some(model) = non_empty("STUDIO_TEXT_MODEL") {
            self.text_model = model;
        }
        match non_empty("STUDIO_REQUEST_TIMEOUT_SECS").map(|raw| raw.parse::<f64>()) {
            Some(Ok(secs)) if secs > 0.0 => {
                self.request_timeout = Duration::from_secs_f64(secs.clamp(5.0, 600.0));
            }
            Some(_) => tracing::warn!("ignoring invalid STUDIO_REQUEST_TIMEOUT_SECS"),
            None => {}
        }
        self
    }
}
