use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Map, Value};
use studio_contracts::credentials::Credential;
use studio_contracts::options::ResolutionTier;

use crate::backend::{
    ContentRequest, GenerationBackend, ImagesRequest, ResponseFormat, SafetyPolicy,
};
use crate::config::StudioConfig;
use crate::error::{classify_failure, StudioError};
use crate::prompts::Part;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// REST client for the hosted Gemini / Imagen endpoints.
pub struct GeminiBackend {
    api_base: String,
    http: HttpClient,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
            timeout,
        }
    }

    pub fn from_config(config: &StudioConfig) -> Self {
        Self::new(config.api_base.clone(), config.request_timeout)
    }

    fn endpoint(&self, model: &str, operation: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, operation)
    }

    async fn post(
        &self,
        endpoint: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<Value, StudioError> {
        tracing::debug!(%endpoint, "backend request");
        let response = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, credential.secret())
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            let message = error_message(status.as_u16(), &body);
            tracing::debug!(status = status.as_u16(), %message, "backend rejected request");
            return Err(classify_failure(Some(status.as_u16()), &message));
        }
        serde_json::from_str(&body).map_err(|err| {
            StudioError::Backend(format!("backend returned invalid JSON payload: {err}"))
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate_content(
        &self,
        credential: &Credential,
        request: &ContentRequest,
    ) -> Result<Value, StudioError> {
        let endpoint = self.endpoint(&request.model_id, "generateContent");
        self.post(&endpoint, credential, &content_payload(request))
            .await
    }

    async fn generate_images(
        &self,
        credential: &Credential,
        request: &ImagesRequest,
    ) -> Result<Value, StudioError> {
        let endpoint = self.endpoint(&request.model_id, "predict");
        self.post(&endpoint, credential, &images_payload(request))
            .await
    }
}

pub(crate) fn content_payload(request: &ContentRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            Part::Image { payload, .. } => json!({
                "inlineData": {
                    "mimeType": payload.media_type,
                    "data": payload.data,
                }
            }),
            Part::Text(text) => json!({ "text": text }),
        })
        .collect();

    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": parts }]),
    );
    if let Some(instruction) = request
        .system_instruction
        .as_deref()
        .filter(|value| !value.trim().is_empty())
    {
        payload.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": instruction }] }),
        );
    }

    let options = &request.options;
    let mut generation_config = Map::new();
    match &options.response_format {
        ResponseFormat::Image => {
            let mut image_config = Map::new();
            if let Some(ratio) = options.aspect_ratio {
                image_config.insert("aspectRatio".to_string(), json!(ratio.as_str()));
            }
            if let Some(resolution) = options.resolution {
                image_config.insert("imageSize".to_string(), json!(resolution.as_str()));
            }
            if !image_config.is_empty() {
                generation_config.insert("imageConfig".to_string(), Value::Object(image_config));
            }
        }
        ResponseFormat::Text => {}
        ResponseFormat::Json { schema } => {
            generation_config.insert("responseMimeType".to_string(), json!("application/json"));
            generation_config.insert("responseSchema".to_string(), schema.clone());
        }
    }
    if !generation_config.is_empty() {
        payload.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config),
        );
    }
    if !options.safety.is_empty() {
        payload.insert(
            "safetySettings".to_string(),
            safety_settings(&options.safety),
        );
    }
    Value::Object(payload)
}

pub(crate) fn images_payload(request: &ImagesRequest) -> Value {
    let resolution = match request.resolution {
        ResolutionTier::FourK => {
            tracing::warn!(model = %request.model_id, "Imagen does not support 4K; using 2K");
            ResolutionTier::TwoK
        }
        other => other,
    };
    json!({
        "instances": [{ "prompt": request.prompt }],
        "parameters": {
            "sampleCount": request.sample_count.max(1),
            "aspectRatio": request.aspect_ratio.as_str(),
            "imageSize": resolution.as_str(),
        }
    })
}

fn safety_settings(policy: &SafetyPolicy) -> Value {
    Value::Array(
        policy
            .settings()
            .iter()
            .map(|setting| {
                json!({
                    "category": setting.category,
                    "threshold": setting.threshold,
                })
            })
            .collect(),
    )
}

/// `"{code} {STATUS}: {message}"` from a Google error envelope, or the raw body.
fn error_message(code: u16, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));
    let status = error
        .and_then(|err| err.get("status"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = error
        .and_then(|err| err.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_text(body.trim(), 512));
    if status.is_empty() {
        format!("{code}: {message}")
    } else {
        format!("{code} {status}: {message}")
    }
}

fn transport_error(err: reqwest::Error) -> StudioError {
    if err.is_timeout() {
        return StudioError::TransientBackendError(format!("deadline expired: {err}"));
    }
    if err.is_connect() || err.is_request() {
        return StudioError::TransientBackendError(err.to_string());
    }
    StudioError::Backend(err.to_string())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
