use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// A user-supplied or library-stored image.
///
/// `data` is the transportable string form of the encoded bytes, usually a
/// `data:<mime>;base64,<payload>` URL. Assets are never mutated after creation;
/// replacing an input means building a new asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    pub id: String,
    pub data: String,
    pub mime_type: String,
    pub preview_url: String,
}

impl ImageAsset {
    pub fn new(
        id: impl Into<String>,
        data: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        let data = data.into();
        Self {
            id: id.into(),
            preview_url: data.clone(),
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Wraps raw file bytes as a data URL asset with a fresh identifier.
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        let data = format!("data:{mime_type};base64,{}", BASE64.encode(bytes));
        Self::new(uuid::Uuid::new_v4().to_string(), data, mime_type)
    }
}

/// Role an input image plays in a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Subject,
    Garment,
    GarmentDetail,
    Accessory,
    CustomBackground,
}
