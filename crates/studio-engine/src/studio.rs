use std::sync::Arc;

use serde::Deserialize;
use studio_contracts::assets::ImageAsset;
use studio_contracts::credentials::{Credential, CredentialStore};
use studio_contracts::events::{EventJournal, StudioEvent, TaskKind};
use studio_contracts::models::{ModelRegistry, ModelRoute};
use studio_contracts::options::{AspectRatio, ResolutionTier};

use crate::backend::{
    ContentRequest, GenerationBackend, ImagesRequest, RequestOptions, ResponseFormat, SafetyPolicy,
};
use crate::config::StudioConfig;
use crate::error::StudioError;
use crate::fanout::{fan_out, Aggregation};
use crate::prompts::{
    compose_background_change, compose_outfit_analysis, compose_text_only_try_on, compose_try_on,
    prompt_list_instruction, Part,
};
use crate::response::{extract_image, extract_text, BackendResponse};
use crate::retry::with_retry;

pub const DEFAULT_BACKGROUND_PROMPT: &str = "Clean studio background";

/// Inputs for a virtual try-on. Unset options fall back to [`StudioConfig`].
#[derive(Debug, Clone, Default)]
pub struct TryOnRequest {
    pub subject: Option<ImageAsset>,
    pub garment: Option<ImageAsset>,
    pub garment_detail: Option<ImageAsset>,
    pub accessory: Option<ImageAsset>,
    pub instructions: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<ResolutionTier>,
    pub model_id: Option<String>,
    pub variant_count: usize,
}

/// Inputs for a background change. Unset options fall back to [`StudioConfig`].
#[derive(Debug, Clone)]
pub struct BackgroundRequest {
    pub image: ImageAsset,
    pub prompt: String,
    pub detail: Option<ImageAsset>,
    pub custom_background: Option<ImageAsset>,
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<ResolutionTier>,
    pub model_id: Option<String>,
}

impl BackgroundRequest {
    pub fn new(image: ImageAsset, prompt: impl Into<String>) -> Self {
        Self {
            image,
            prompt: prompt.into(),
            detail: None,
            custom_background: None,
            aspect_ratio: None,
            resolution: None,
            model_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPrompts {
    pub analysis: String,
    pub prompts: Vec<String>,
}

/// Resolved model and output options for one image task.
struct ImageTarget {
    model_id: String,
    route: ModelRoute,
    aspect_ratio: AspectRatio,
    resolution: ResolutionTier,
}

/// Entry points the presentation layer calls.
///
/// Holds no per-task state: every call builds its requests, runs them, and
/// returns an outcome. The credential is read, never written.
pub struct Studio {
    backend: Arc<dyn GenerationBackend>,
    credentials: Arc<dyn CredentialStore>,
    models: ModelRegistry,
    config: StudioConfig,
    journal: Option<EventJournal>,
}

impl Studio {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        credentials: Arc<dyn CredentialStore>,
        config: StudioConfig,
    ) -> Self {
        Self {
            backend,
            credentials,
            models: ModelRegistry::default(),
            config,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: EventJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    /// Models this studio knows, with the route each one is reached through.
    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Runs `variant_count` independent try-on attempts concurrently.
    ///
    /// Returns every produced image in completion order; fails only when no
    /// attempt succeeded, with the last settled failure.
    pub async fn generate_virtual_try_on(
        &self,
        request: &TryOnRequest,
    ) -> Result<Vec<String>, StudioError> {
        let subject = request.subject.as_ref().ok_or(StudioError::MissingSubject)?;
        if request.garment.is_none() && request.accessory.is_none() {
            return Err(StudioError::MissingGarment);
        }
        let credential = self.credential()?;
        let target = self.image_target(
            request.model_id.as_deref(),
            request.aspect_ratio,
            request.resolution,
        );
        let variants = request.variant_count.max(1);
        self.record_started(TaskKind::TryOn, &target.model_id, variants);

        let credential = &credential;
        let target = &target;
        let attempts = (0..variants)
            .map(move |index| self.try_on_attempt(credential, request, subject, target, index));
        let outcome = fan_out(attempts, Aggregation::AnyOfN).await;
        self.settle(TaskKind::TryOn, outcome, Vec::len)
    }

    pub async fn change_image_background(
        &self,
        request: &BackgroundRequest,
    ) -> Result<String, StudioError> {
        let credential = self.credential()?;
        let target = self.image_target(
            request.model_id.as_deref(),
            request.aspect_ratio,
            request.resolution,
        );
        self.record_started(TaskKind::BackgroundChange, &target.model_id, 1);
        let outcome = self
            .background_attempt(
                &credential,
                request,
                TaskKind::BackgroundChange,
                0,
                &request.prompt,
                &target,
            )
            .await;
        self.settle(TaskKind::BackgroundChange, outcome, |_| 1)
    }

    /// One background change per prompt, run concurrently. Failed prompts are
    /// dropped; the result may be empty.
    pub async fn change_image_background_batch(
        &self,
        request: &BackgroundRequest,
        prompts: &[String],
    ) -> Result<Vec<String>, StudioError> {
        let credential = self.credential()?;
        let target = self.image_target(
            request.model_id.as_deref(),
            request.aspect_ratio,
            request.resolution,
        );
        self.record_started(TaskKind::BackgroundBatch, &target.model_id, prompts.len());

        let credential = &credential;
        let target = &target;
        let attempts = prompts.iter().enumerate().map(move |(index, prompt)| {
            self.background_attempt(
                credential,
                request,
                TaskKind::BackgroundBatch,
                index,
                prompt,
                target,
            )
        });
        let outcome = fan_out(attempts, Aggregation::BestEffort).await;
        self.settle(TaskKind::BackgroundBatch, outcome, Vec::len)
    }

    pub async fn analyze_outfit(
        &self,
        image: &ImageAsset,
        detail: Option<&ImageAsset>,
    ) -> Result<String, StudioError> {
        let credential = self.credential()?;
        let model_id = self.config.text_model.clone();
        self.record_started(TaskKind::OutfitAnalysis, &model_id, 1);
        let request = ContentRequest {
            model_id,
            parts: compose_outfit_analysis(image, detail),
            system_instruction: None,
            options: RequestOptions::text(ResponseFormat::Text),
        };
        let outcome = self
            .call_content(&credential, &request)
            .await
            .map(|response| extract_text(&response));
        self.settle(TaskKind::OutfitAnalysis, outcome, |_| 1)
    }

    /// Asks for `count` motion prompts as `{ "prompts": [...] }`.
    ///
    /// Transport failures are retried; a reply that is not valid JSON is not.
    pub async fn generate_prompts_from_analysis(
        &self,
        analysis: &str,
        count: usize,
    ) -> Result<Vec<String>, StudioError> {
        let credential = self.credential()?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let model_id = self.config.text_model.clone();
        self.record_started(TaskKind::PromptGeneration, &model_id, count);
        let request = ContentRequest {
            model_id,
            parts: vec![Part::Text(analysis.to_string())],
            system_instruction: Some(prompt_list_instruction(count)),
            options: RequestOptions::text(ResponseFormat::prompt_list()),
        };
        let outcome = match self.call_content(&credential, &request).await {
            Ok(response) => parse_prompt_list(&extract_text(&response)),
            Err(err) => Err(err),
        };
        if let Ok(prompts) = &outcome {
            if prompts.len() != count {
                tracing::warn!(requested = count, received = prompts.len(), "prompt count mismatch");
            }
        }
        self.settle(TaskKind::PromptGeneration, outcome, Vec::len)
    }

    /// Outfit analysis followed by prompt generation, reusing a cached analysis when given.
    pub async fn video_prompts(
        &self,
        image: &ImageAsset,
        detail: Option<&ImageAsset>,
        count: usize,
        cached_analysis: Option<&str>,
    ) -> Result<VideoPrompts, StudioError> {
        let analysis = match cached_analysis.filter(|text| !text.trim().is_empty()) {
            Some(text) => text.to_string(),
            None => self.analyze_outfit(image, detail).await?,
        };
        let prompts = self.generate_prompts_from_analysis(&analysis, count).await?;
        Ok(VideoPrompts { analysis, prompts })
    }

    fn credential(&self) -> Result<Credential, StudioError> {
        self.credentials
            .resolve()
            .ok_or(StudioError::MissingCredential)
    }

    fn image_target(
        &self,
        model_id: Option<&str>,
        aspect_ratio: Option<AspectRatio>,
        resolution: Option<ResolutionTier>,
    ) -> ImageTarget {
        let model_id = model_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.config.image_model.as_str())
            .to_string();
        ImageTarget {
            route: self.models.route_for(&model_id),
            model_id,
            aspect_ratio: aspect_ratio.unwrap_or(self.config.aspect_ratio),
            resolution: resolution.unwrap_or(self.config.resolution),
        }
    }

    async fn try_on_attempt(
        &self,
        credential: &Credential,
        request: &TryOnRequest,
        subject: &ImageAsset,
        target: &ImageTarget,
        index: usize,
    ) -> Result<String, StudioError> {
        tracing::debug!(index, model = %target.model_id, "try-on attempt");
        let outcome = match target.route {
            ModelRoute::Content => {
                let content = ContentRequest {
                    model_id: target.model_id.clone(),
                    parts: compose_try_on(
                        subject,
                        request.garment.as_ref(),
                        request.garment_detail.as_ref(),
                        request.accessory.as_ref(),
                        &request.instructions,
                        target.aspect_ratio,
                    ),
                    system_instruction: None,
                    options: RequestOptions::image(
                        target.aspect_ratio,
                        target.resolution,
                        SafetyPolicy::try_on(),
                    ),
                };
                self.call_content(credential, &content).await
            }
            ModelRoute::Images => {
                let images = self.images_request(target, compose_text_only_try_on(&request.instructions));
                self.call_images(credential, &images).await
            }
        };
        let image = outcome.and_then(|response| extract_image(&response));
        if let Err(err) = &image {
            self.record_attempt_failed(TaskKind::TryOn, index, err);
        }
        image
    }

    async fn background_attempt(
        &self,
        credential: &Credential,
        request: &BackgroundRequest,
        task: TaskKind,
        index: usize,
        prompt: &str,
        target: &ImageTarget,
    ) -> Result<String, StudioError> {
        tracing::debug!(index, model = %target.model_id, "background attempt");
        let prompt = match prompt.trim() {
            "" => DEFAULT_BACKGROUND_PROMPT,
            trimmed => trimmed,
        };
        let outcome = match target.route {
            ModelRoute::Content => {
                let content = ContentRequest {
                    model_id: target.model_id.clone(),
                    parts: compose_background_change(
                        &request.image,
                        request.detail.as_ref(),
                        request.custom_background.as_ref(),
                        prompt,
                        target.aspect_ratio,
                    ),
                    system_instruction: None,
                    options: RequestOptions::image(
                        target.aspect_ratio,
                        target.resolution,
                        SafetyPolicy::background(),
                    ),
                };
                self.call_content(credential, &content).await
            }
            ModelRoute::Images => {
                let images = self.images_request(target, prompt.to_string());
                self.call_images(credential, &images).await
            }
        };
        let image = outcome.and_then(|response| extract_image(&response));
        if let Err(err) = &image {
            self.record_attempt_failed(task, index, err);
        }
        image
    }

    fn images_request(&self, target: &ImageTarget, prompt: String) -> ImagesRequest {
        ImagesRequest {
            model_id: target.model_id.clone(),
            prompt,
            aspect_ratio: target.aspect_ratio,
            resolution: target.resolution,
            sample_count: 1,
        }
    }

    async fn call_content(
        &self,
        credential: &Credential,
        request: &ContentRequest,
    ) -> Result<BackendResponse, StudioError> {
        let backend = self.backend.as_ref();
        let raw = with_retry(&self.config.retry, move || {
            backend.generate_content(credential, request)
        })
        .await?;
        Ok(BackendResponse::from_value(&raw))
    }

    async fn call_images(
        &self,
        credential: &Credential,
        request: &ImagesRequest,
    ) -> Result<BackendResponse, StudioError> {
        let backend = self.backend.as_ref();
        let raw = with_retry(&self.config.retry, move || {
            backend.generate_images(credential, request)
        })
        .await?;
        Ok(BackendResponse::from_value(&raw))
    }

    fn settle<T>(
        &self,
        task: TaskKind,
        outcome: Result<T, StudioError>,
        count: impl Fn(&T) -> usize,
    ) -> Result<T, StudioError> {
        match &outcome {
            Ok(value) => {
                let results = count(value);
                tracing::info!(task = task.as_str(), results, "task finished");
                self.record(StudioEvent::TaskFinished { task, results });
            }
            Err(err) => {
                tracing::warn!(task = task.as_str(), kind = err.kind().as_str(), error = %err, "task failed");
                self.record(StudioEvent::TaskFailed {
                    task,
                    kind: err.kind().as_str().to_string(),
                    message: err.to_string(),
                });
            }
        }
        outcome
    }

    fn record_started(&self, task: TaskKind, model_id: &str, attempts: usize) {
        self.record(StudioEvent::TaskStarted {
            task,
            model: model_id.to_string(),
            attempts,
        });
    }

    fn record_attempt_failed(&self, task: TaskKind, attempt: usize, err: &StudioError) {
        self.record(StudioEvent::AttemptFailed {
            task,
            attempt,
            kind: err.kind().as_str().to_string(),
            message: err.to_string(),
        });
    }

    fn record(&self, event: StudioEvent) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(err) = journal.record(event) {
            tracing::warn!(error = %err, "failed to write journal event");
        }
    }
}

#[derive(Debug, Deserialize)]
struct PromptList {
    #[serde(default)]
    prompts: Option<Vec<String>>,
}

/// Empty text counts as `{}`; anything else must be a JSON object.
fn parse_prompt_list(text: &str) -> Result<Vec<String>, StudioError> {
    let trimmed = text.trim();
    let source = if trimmed.is_empty() { "{}" } else { trimmed };
    serde_json::from_str::<PromptList>(source)
        .map(|list| list.prompts.unwrap_or_default())
        .map_err(|err| StudioError::MalformedStructuredResponse(err.to_string()))
}
