mod registry;

pub use registry::{ModelRegistry, ModelRoute, ModelSpec};
