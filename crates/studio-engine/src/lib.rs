pub mod backend;
pub mod config;
pub mod encoder;
pub mod error;
pub mod fanout;
pub mod http;
pub mod prompts;
pub mod response;
pub mod retry;
pub mod studio;

pub use backend::{ContentRequest, GenerationBackend, ImagesRequest};
pub use config::StudioConfig;
pub use error::{ErrorKind, StudioError};
pub use http::GeminiBackend;
pub use retry::RetryPolicy;
pub use studio::{BackgroundRequest, Studio, TryOnRequest, VideoPrompts};
pub use studio_contracts::events::{StudioEvent, TaskKind};
