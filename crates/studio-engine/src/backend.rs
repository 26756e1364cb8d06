use async_trait::async_trait;
use serde_json::{json, Value};
use studio_contracts::credentials::Credential;
use studio_contracts::options::{AspectRatio, ResolutionTier};

use crate::error::StudioError;
use crate::prompts::Part;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Per-category safety threshold overrides sent with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyPolicy {
    settings: Vec<SafetySetting>,
}

impl SafetyPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// `BLOCK_NONE` for all four harm categories.
    pub fn try_on() -> Self {
        Self::block_none(&[
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ])
    }

    pub fn background() -> Self {
        Self::block_none(&["HARM_CATEGORY_SEXUALLY_EXPLICIT"])
    }

    fn block_none(categories: &[&str]) -> Self {
        Self {
            settings: categories
                .iter()
                .map(|category| SafetySetting {
                    category: (*category).to_string(),
                    threshold: "BLOCK_NONE".to_string(),
                })
                .collect(),
        }
    }

    pub fn settings(&self) -> &[SafetySetting] {
        &self.settings
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Image,
    Text,
    Json { schema: Value },
}

impl ResponseFormat {
    /// `{ prompts: string[] }`
    pub fn prompt_list() -> Self {
        Self::Json {
            schema: json!({
                "type": "OBJECT",
                "properties": {
                    "prompts": {
                        "type": "ARRAY",
                        "items": { "type": "STRING" }
                    }
                }
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<ResolutionTier>,
    pub safety: SafetyPolicy,
    pub response_format: ResponseFormat,
}

impl RequestOptions {
    pub fn image(aspect_ratio: AspectRatio, resolution: ResolutionTier, safety: SafetyPolicy) -> Self {
        Self {
            aspect_ratio: Some(aspect_ratio),
            resolution: Some(resolution),
            safety,
            response_format: ResponseFormat::Image,
        }
    }

    pub fn text(response_format: ResponseFormat) -> Self {
        Self {
            aspect_ratio: None,
            resolution: None,
            safety: SafetyPolicy::none(),
            response_format,
        }
    }
}

/// Multimodal request: ordered parts plus options.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub model_id: String,
    pub parts: Vec<Part>,
    pub system_instruction: Option<String>,
    pub options: RequestOptions,
}

/// Text-only request for models that return a direct generated-image list.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagesRequest {
    pub model_id: String,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: ResolutionTier,
    pub sample_count: u32,
}

/// The hosted generation service.
///
/// Implementations return the raw JSON reply; failures must already be
/// classified into the [`StudioError`] taxonomy.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_content(
        &self,
        credential: &Credential,
        request: &ContentRequest,
    ) -> Result<Value, StudioError>;

    async fn generate_images(
        &self,
        credential: &Credential,
        request: &ImagesRequest,
    ) -> Result<Value, StudioError>;
}
