//! Normalization of raw backend replies.
//!
//! A reply is parsed once into [`BackendResponse`]; extraction then matches
//! exhaustively on the shape instead of probing optional JSON fields.

use serde::Deserialize;
use serde_json::Value;

use crate::encoder::{to_data_uri, FALLBACK_MEDIA_TYPE};
use crate::error::StudioError;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    /// Text-only image models return generated bytes directly.
    DirectImageList(Vec<GeneratedImage>),
    Candidates(Vec<Candidate>),
    Text(String),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes_base64: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, alias = "finish_reason")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default, alias = "safety_ratings")]
    pub safety_ratings: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    #[serde(default, alias = "inline_data")]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FinishReason {
    Stop,
    Safety,
    ImageSafety,
    ImageOther,
    Other(String),
}

impl From<String> for FinishReason {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "STOP" => Self::Stop,
            "SAFETY" => Self::Safety,
            "IMAGE_SAFETY" => Self::ImageSafety,
            "IMAGE_OTHER" => Self::ImageOther,
            _ => Self::Other(raw),
        }
    }
}

impl BackendResponse {
    pub fn from_value(value: &Value) -> Self {
        let Some(root) = value.as_object() else {
            return Self::Malformed(format!("expected a JSON object, got {}", json_kind(value)));
        };

        let direct = direct_images(root.get("generatedImages"), |row| {
            row.get("image")
                .and_then(|image| image.get("imageBytes"))
                .or_else(|| row.get("imageBytes"))
        })
        .or_else(|| {
            direct_images(root.get("predictions"), |row| {
                row.get("bytesBase64Encoded")
                    .or_else(|| row.get("bytes_base64_encoded"))
            })
        });
        if let Some(images) = direct {
            return Self::DirectImageList(images);
        }

        if let Some(raw) = root.get("candidates") {
            return match serde_json::from_value::<Vec<Candidate>>(raw.clone()) {
                Ok(candidates) => Self::Candidates(candidates),
                Err(err) => Self::Malformed(format!("unreadable candidates: {err}")),
            };
        }

        if let Some(text) = root.get("text").and_then(Value::as_str) {
            return Self::Text(text.to_string());
        }

        Self::Candidates(Vec::new())
    }
}

fn direct_images<'a>(
    list: Option<&'a Value>,
    bytes_of: impl Fn(&'a Value) -> Option<&'a Value>,
) -> Option<Vec<GeneratedImage>> {
    let images: Vec<GeneratedImage> = list?
        .as_array()?
        .iter()
        .filter_map(|row| bytes_of(row).and_then(Value::as_str))
        .filter(|bytes| !bytes.is_empty())
        .map(|bytes| GeneratedImage {
            bytes_base64: bytes.to_string(),
        })
        .collect();
    if images.is_empty() {
        None
    } else {
        Some(images)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Extracts exactly one generated image as a data URI, or the reason there is none.
pub fn extract_image(response: &BackendResponse) -> Result<String, StudioError> {
    let candidates = match response {
        BackendResponse::DirectImageList(images) => {
            let first = images.first().ok_or(StudioError::NoResult)?;
            return Ok(to_data_uri(FALLBACK_MEDIA_TYPE, &first.bytes_base64));
        }
        BackendResponse::Candidates(candidates) => candidates,
        BackendResponse::Text(_) => {
            tracing::debug!("text-only reply where an image was expected");
            return Err(StudioError::NoResult);
        }
        BackendResponse::Malformed(reason) => {
            tracing::debug!(%reason, "malformed image reply");
            return Err(StudioError::NoResult);
        }
    };

    let candidate = candidates.first().ok_or(StudioError::NoResult)?;
    match &candidate.finish_reason {
        Some(FinishReason::Safety | FinishReason::ImageSafety) => {
            tracing::debug!(ratings = ?candidate.safety_ratings, "candidate blocked by safety filter");
            return Err(StudioError::SafetyBlocked);
        }
        Some(FinishReason::ImageOther) => return Err(StudioError::GenerationInterrupted),
        Some(FinishReason::Stop | FinishReason::Other(_)) | None => {}
    }

    let parts = candidate
        .content
        .as_ref()
        .map(|content| content.parts.as_slice())
        .unwrap_or_default();

    let inline = parts.iter().find_map(|part| {
        let inline = part.inline_data.as_ref()?;
        let data = inline.data.as_deref().filter(|data| !data.is_empty())?;
        Some((inline.mime_type.as_deref(), data))
    });
    if let Some((mime_type, data)) = inline {
        let mime_type = mime_type
            .filter(|value| !value.is_empty())
            .unwrap_or(FALLBACK_MEDIA_TYPE);
        return Ok(to_data_uri(mime_type, data));
    }

    let text = parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .find(|text| !text.trim().is_empty());
    if let Some(text) = text {
        return Err(StudioError::GenerationReturnedText(text.trim().to_string()));
    }

    Err(StudioError::NoImageData)
}

/// Plain text of a reply; empty when there is none.
pub fn extract_text(response: &BackendResponse) -> String {
    match response {
        BackendResponse::Text(text) => text.clone(),
        BackendResponse::Candidates(candidates) => candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default(),
        BackendResponse::DirectImageList(_) | BackendResponse::Malformed(_) => String::new(),
    }
}
