use indexmap::IndexMap;

/// Which backend operation a model is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRoute {
    /// Multimodal `generateContent`: ordered image and text parts in, candidates out.
    Content,
    /// Text-only `predict`: a prompt in, a direct generated-image list out.
    Images,
}

impl ModelRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Images => "images",
        }
    }

    /// Route for a model id the registry does not know.
    pub fn infer(model_id: &str) -> Self {
        let trimmed = model_id.trim().trim_start_matches("models/");
        if trimmed.to_ascii_lowercase().starts_with("imagen") {
            Self::Images
        } else {
            Self::Content
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub route: ModelRoute,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim().trim_start_matches("models/"))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn route_for(&self, model_id: &str) -> ModelRoute {
        self.get(model_id)
            .map(|spec| spec.route)
            .unwrap_or_else(|| ModelRoute::infer(model_id))
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, route: ModelRoute, capabilities: &[&str]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                route,
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
            },
        );
    };

    insert(
        "gemini-3-pro-image-preview",
        "gemini",
        ModelRoute::Content,
        &["image"],
    );
    insert(
        "gemini-2.5-flash-image",
        "gemini",
        ModelRoute::Content,
        &["image"],
    );
    insert(
        "imagen-4.0-generate-001",
        "imagen",
        ModelRoute::Images,
        &["image"],
    );
    insert(
        "imagen-4.0-ultra-generate-001",
        "imagen",
        ModelRoute::Images,
        &["image"],
    );
    insert(
        "gemini-3-pro-preview",
        "gemini",
        ModelRoute::Content,
        &["text", "vision"],
    );
    insert(
        "gemini-2.5-flash",
        "gemini",
        ModelRoute::Content,
        &["text", "vision"],
    );

    map
}
