use std::sync::Arc;

use crate::assets::ImageAsset;
use crate::store::KeyValueStore;

/// Storage key holding the saved model library.
pub const LIBRARY_STORAGE_KEY: &str = "swapnet_saved_models";

/// Number of leading payload characters compared when detecting duplicates.
const DEDUP_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    AlreadyPresent,
}

/// Saved reference photos, newest first.
///
/// Loaded once at construction and rewritten in full on every save or delete.
pub struct ModelLibrary {
    store: Arc<dyn KeyValueStore>,
    models: Vec<ImageAsset>,
}

impl ModelLibrary {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let models = match store.get(LIBRARY_STORAGE_KEY) {
            Some(raw) => serde_json::from_value::<Vec<ImageAsset>>(raw).unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to parse saved model library; starting empty");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self { store, models }
    }

    pub fn models(&self) -> &[ImageAsset] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ImageAsset> {
        self.models.iter().find(|model| model.id == id)
    }

    pub fn contains_payload(&self, asset: &ImageAsset) -> bool {
        let prefix = payload_prefix(&asset.data);
        self.models
            .iter()
            .any(|model| payload_prefix(&model.data) == prefix)
    }

    pub fn save(&mut self, asset: ImageAsset) -> anyhow::Result<SaveOutcome> {
        if self.contains_payload(&asset) {
            return Ok(SaveOutcome::AlreadyPresent);
        }
        self.models.insert(0, asset);
        self.persist()?;
        Ok(SaveOutcome::Saved)
    }

    pub fn delete(&mut self, id: &str) -> anyhow::Result<bool> {
        let before = self.models.len();
        self.models.retain(|model| model.id != id);
        if self.models.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&self) -> anyhow::Result<()> {
        self.store
            .set(LIBRARY_STORAGE_KEY, serde_json::to_value(&self.models)?)
    }
}

fn payload_prefix(data: &str) -> &str {
    match data.char_indices().nth(DEDUP_PREFIX_CHARS) {
        Some((idx, _)) => &data[..idx],
        None => data,
    }
}
