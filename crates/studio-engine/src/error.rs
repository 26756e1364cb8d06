use thiserror::Error;

/// Failure of a studio operation, carrying a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("No API credential is configured. Set a key before generating.")]
    MissingCredential,

    #[error("A subject photo is required.")]
    MissingSubject,

    #[error("A garment or accessory image is required.")]
    MissingGarment,

    #[error("The backend returned no result.")]
    NoResult,

    #[error("The image was blocked by the safety filter. Retry with a different, less sensitive image.")]
    SafetyBlocked,

    #[error("Image generation was interrupted (IMAGE_OTHER). The model struggled with the details or hit a hidden policy; retry with a clearer image.")]
    GenerationInterrupted,

    #[error("The model replied with text instead of an image: {0}")]
    GenerationReturnedText(String),

    #[error("No image data was found in the backend response.")]
    NoImageData,

    #[error("Permission denied (403): this model needs a key from a billed project, or the quota is exhausted. {0}")]
    PermissionDenied(String),

    #[error("Model not found (404): check that the API key has access to this model. {0}")]
    ModelNotFound(String),

    #[error("The API key is invalid. {0}")]
    InvalidCredential(String),

    #[error("The backend is temporarily unavailable: {0}")]
    TransientBackendError(String),

    #[error("The structured response could not be parsed: {0}")]
    MalformedStructuredResponse(String),

    #[error("Backend request failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingCredential,
    MissingSubject,
    MissingGarment,
    NoResult,
    SafetyBlocked,
    GenerationInterrupted,
    GenerationReturnedText,
    NoImageData,
    PermissionDenied,
    ModelNotFound,
    InvalidCredential,
    TransientBackendError,
    MalformedStructuredResponse,
    Backend,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MissingSubject => "missing_subject",
            Self::MissingGarment => "missing_garment",
            Self::NoResult => "no_result",
            Self::SafetyBlocked => "safety_blocked",
            Self::GenerationInterrupted => "generation_interrupted",
            Self::GenerationReturnedText => "generation_returned_text",
            Self::NoImageData => "no_image_data",
            Self::PermissionDenied => "permission_denied",
            Self::ModelNotFound => "model_not_found",
            Self::InvalidCredential => "invalid_credential",
            Self::TransientBackendError => "transient_backend_error",
            Self::MalformedStructuredResponse => "malformed_structured_response",
            Self::Backend => "backend",
        }
    }
}

impl StudioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::MissingSubject => ErrorKind::MissingSubject,
            Self::MissingGarment => ErrorKind::MissingGarment,
            Self::NoResult => ErrorKind::NoResult,
            Self::SafetyBlocked => ErrorKind::SafetyBlocked,
            Self::GenerationInterrupted => ErrorKind::GenerationInterrupted,
            Self::GenerationReturnedText(_) => ErrorKind::GenerationReturnedText,
            Self::NoImageData => ErrorKind::NoImageData,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::ModelNotFound(_) => ErrorKind::ModelNotFound,
            Self::InvalidCredential(_) => ErrorKind::InvalidCredential,
            Self::TransientBackendError(_) => ErrorKind::TransientBackendError,
            Self::MalformedStructuredResponse(_) => ErrorKind::MalformedStructuredResponse,
            Self::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Whether the retry controller may try the call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientBackendError(_))
    }

    /// Auth failures after which the host should drop the key and ask for a new one.
    pub fn requires_credential_refresh(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::ModelNotFound(_) | Self::InvalidCredential(_)
        )
    }
}

const TRANSIENT_MARKERS: [&str; 5] = [
    "500",
    "503",
    "overloaded",
    "deadline expired",
    "internal error",
];

/// True when a raw failure message names a condition worth retrying.
pub fn is_transient_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Maps a raw backend failure onto the error taxonomy.
///
/// A known HTTP status decides first. Message markers are consulted for
/// transient conditions only when there is no status or the status is 5xx,
/// so digits inside a 4xx message never make it retryable.
pub fn classify_failure(status: Option<u16>, message: &str) -> StudioError {
    let message = message.trim().to_string();
    match status {
        Some(500 | 503) => return StudioError::TransientBackendError(message),
        Some(403) => return StudioError::PermissionDenied(message),
        Some(404) => return StudioError::ModelNotFound(message),
        _ => {}
    }
    let server_side = status.map_or(true, |code| code >= 500);
    if server_side && is_transient_message(&message) {
        return StudioError::TransientBackendError(message);
    }
    let lowered = message.to_ascii_lowercase();
    if message.contains("PERMISSION_DENIED") || (status.is_none() && message.contains("403")) {
        return StudioError::PermissionDenied(message);
    }
    if lowered.contains("not found") || (status.is_none() && message.contains("404")) {
        return StudioError::ModelNotFound(message);
    }
    if message.contains("API key") {
        return StudioError::InvalidCredential(message);
    }
    StudioError::Backend(message)
}
