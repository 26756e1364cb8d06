use studio_contracts::assets::ImageAsset;

/// Media type used when the backend does not declare one.
pub const FALLBACK_MEDIA_TYPE: &str = "image/png";

/// Wire form of an image: declared media type plus the bare base64 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub media_type: String,
    pub data: String,
}

/// Encodes an asset for transmission, dropping any data-URL envelope.
pub fn encode(asset: &ImageAsset) -> EncodedPayload {
    let media_type = if asset.mime_type.trim().is_empty() {
        FALLBACK_MEDIA_TYPE.to_string()
    } else {
        asset.mime_type.clone()
    };
    EncodedPayload {
        media_type,
        data: strip_transport_prefix(&asset.data).to_string(),
    }
}

/// Removes everything up to and including the first `,`; idempotent on bare payloads.
pub fn strip_transport_prefix(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, payload)) => payload,
        None => data,
    }
}

pub fn to_data_uri(media_type: &str, payload: &str) -> String {
    format!("data:{media_type};base64,{payload}")
}

/// Splits a `data:<mime>;base64,<payload>` URI into its media type and payload.
pub fn parse_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64").unwrap_or(header);
    Some((media_type, payload))
}
