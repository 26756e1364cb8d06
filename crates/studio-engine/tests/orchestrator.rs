use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use studio_contracts::assets::{ImageAsset, ImageRole};
use studio_contracts::credentials::{Credential, HostCredentialStore};
use studio_contracts::events::{read_journal, EventJournal, StudioEvent, TaskKind};
use studio_contracts::store::MemoryStore;
use studio_engine::backend::ResponseFormat;
use studio_engine::{
    BackgroundRequest, ContentRequest, ErrorKind, GenerationBackend, ImagesRequest, Studio,
    StudioConfig, StudioError, TryOnRequest,
};

struct Scripted {
    delay_ms: u64,
    outcome: Result<Value, StudioError>,
}

#[derive(Default)]
struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    content_calls: Mutex<Vec<ContentRequest>>,
    images_calls: Mutex<Vec<ImagesRequest>>,
}

impl ScriptedBackend {
    fn with(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    fn content_calls(&self) -> Vec<ContentRequest> {
        self.content_calls.lock().unwrap().clone()
    }

    fn images_calls(&self) -> Vec<ImagesRequest> {
        self.images_calls.lock().unwrap().clone()
    }

    async fn next(&self) -> Result<Value, StudioError> {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("backend called more often than scripted");
        tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        step.outcome
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate_content(
        &self,
        _credential: &Credential,
        request: &ContentRequest,
    ) -> Result<Value, StudioError> {
        self.content_calls.lock().unwrap().push(request.clone());
        self.next().await
    }

    async fn generate_images(
        &self,
        _credential: &Credential,
        request: &ImagesRequest,
    ) -> Result<Value, StudioError> {
        self.images_calls.lock().unwrap().push(request.clone());
        self.next().await
    }
}

fn image_reply(data: &str) -> Value {
    json!({
        "candidates": [{
            "finishReason": "STOP",
            "content": { "parts": [{ "inlineData": { "mimeType": "image/png", "data": data } }] }
        }]
    })
}

fn text_reply(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

fn ok(delay_ms: u64, reply: Value) -> Scripted {
    Scripted {
        delay_ms,
        outcome: Ok(reply),
    }
}

fn fail(delay_ms: u64, err: StudioError) -> Scripted {
    Scripted {
        delay_ms,
        outcome: Err(err),
    }
}

fn asset(id: &str) -> ImageAsset {
    ImageAsset::new(id, format!("data:image/png;base64,{id}"), "image/png")
}

fn studio(backend: Arc<ScriptedBackend>, key: Option<&str>) -> Studio {
    let credentials = HostCredentialStore::new(
        Arc::new(MemoryStore::new()),
        key.map(str::to_string),
    );
    Studio::new(backend, Arc::new(credentials), StudioConfig::default())
}

fn try_on(variants: usize) -> TryOnRequest {
    TryOnRequest {
        subject: Some(asset("subject")),
        garment: Some(asset("garment")),
        instructions: "tucked in".to_string(),
        variant_count: variants,
        ..TryOnRequest::default()
    }
}

#[tokio::test(start_paused = true)]
async fn try_on_keeps_successful_variants_in_completion_order() {
    let backend = ScriptedBackend::with(vec![
        ok(30, image_reply("QQ==")),
        ok(10, image_reply("Qg==")),
        ok(20, image_reply("Qw==")),
    ]);
    let studio = studio(backend.clone(), Some("key"));

    let images = studio.generate_virtual_try_on(&try_on(3)).await.unwrap();

    assert_eq!(
        images,
        vec![
            "data:image/png;base64,Qg==".to_string(),
            "data:image/png;base64,Qw==".to_string(),
            "data:image/png;base64,QQ==".to_string(),
        ]
    );
    let calls = backend.content_calls();
    assert_eq!(calls.len(), 3);
    let roles: Vec<_> = calls[0].parts.iter().filter_map(|part| part.role()).collect();
    assert_eq!(roles, vec![ImageRole::Subject, ImageRole::Garment]);
    assert_eq!(calls[0].options.safety.settings().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn try_on_succeeds_when_one_of_three_variants_produces_an_image() {
    let backend = ScriptedBackend::with(vec![
        fail(5, StudioError::PermissionDenied("denied".to_string())),
        ok(10, image_reply("Qg==")),
        ok(15, json!({ "candidates": [{ "finishReason": "SAFETY" }] })),
    ]);
    let studio = studio(backend, Some("key"));

    let images = studio.generate_virtual_try_on(&try_on(3)).await.unwrap();

    assert_eq!(images, vec!["data:image/png;base64,Qg==".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn try_on_reports_last_settled_failure_when_every_variant_fails() {
    let backend = ScriptedBackend::with(vec![
        fail(10, StudioError::PermissionDenied("denied".to_string())),
        fail(30, StudioError::ModelNotFound("gone".to_string())),
        ok(20, json!({ "candidates": [{ "finishReason": "SAFETY" }] })),
    ]);
    let studio = studio(backend, Some("key"));

    let err = studio.generate_virtual_try_on(&try_on(3)).await.unwrap_err();

    assert_eq!(err, StudioError::ModelNotFound("gone".to_string()));
}

#[tokio::test(start_paused = true)]
async fn zero_variants_still_runs_one_attempt() {
    let backend = ScriptedBackend::with(vec![ok(0, image_reply("QQ=="))]);
    let studio = studio(backend.clone(), Some("key"));

    let images = studio.generate_virtual_try_on(&try_on(0)).await.unwrap();

    assert_eq!(images.len(), 1);
    assert_eq!(backend.content_calls().len(), 1);
}

#[tokio::test]
async fn try_on_validates_inputs_before_credential() {
    let backend = ScriptedBackend::with(Vec::new());
    let studio = studio(backend.clone(), None);

    let missing_subject = TryOnRequest {
        subject: None,
        ..try_on(1)
    };
    assert_eq!(
        studio.generate_virtual_try_on(&missing_subject).await,
        Err(StudioError::MissingSubject)
    );

    let nothing_to_wear = TryOnRequest {
        garment: None,
        accessory: None,
        ..try_on(1)
    };
    assert_eq!(
        studio.generate_virtual_try_on(&nothing_to_wear).await,
        Err(StudioError::MissingGarment)
    );

    assert_eq!(
        studio.generate_virtual_try_on(&try_on(1)).await,
        Err(StudioError::MissingCredential)
    );
    assert!(backend.content_calls().is_empty());
}

#[tokio::test]
async fn accessory_alone_is_enough_to_dress_the_subject() {
    let backend = ScriptedBackend::with(vec![ok(0, image_reply("QQ=="))]);
    let studio = studio(backend.clone(), Some("key"));
    let request = TryOnRequest {
        garment: None,
        accessory: Some(asset("hat")),
        ..try_on(1)
    };

    studio.generate_virtual_try_on(&request).await.unwrap();

    let roles: Vec<_> = backend.content_calls()[0]
        .parts
        .iter()
        .filter_map(|part| part.role())
        .collect();
    assert_eq!(roles, vec![ImageRole::Subject, ImageRole::Accessory]);
}

#[tokio::test]
async fn every_entry_point_needs_a_credential() {
    let backend = ScriptedBackend::with(Vec::new());
    let studio = studio(backend.clone(), None);
    let request = BackgroundRequest::new(asset("subject"), "beach");

    assert_eq!(
        studio.change_image_background(&request).await,
        Err(StudioError::MissingCredential)
    );
    assert_eq!(
        studio
            .change_image_background_batch(&request, &["a".to_string()])
            .await,
        Err(StudioError::MissingCredential)
    );
    assert_eq!(
        studio.analyze_outfit(&asset("subject"), None).await,
        Err(StudioError::MissingCredential)
    );
    assert_eq!(
        studio.generate_prompts_from_analysis("linen", 3).await,
        Err(StudioError::MissingCredential)
    );
    assert!(backend.content_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn background_change_retries_transient_failures() {
    let backend = ScriptedBackend::with(vec![
        fail(0, StudioError::TransientBackendError("503 overloaded".to_string())),
        ok(0, image_reply("QQ==")),
    ]);
    let studio = studio(backend.clone(), Some("key"));

    let image = studio
        .change_image_background(&BackgroundRequest::new(asset("subject"), "  "))
        .await
        .unwrap();

    assert_eq!(image, "data:image/png;base64,QQ==");
    let calls = backend.content_calls();
    assert_eq!(calls.len(), 2);
    let text = calls[0].parts.last().and_then(|part| part.text()).unwrap();
    assert!(text.contains("Clean studio background"));
    assert_eq!(calls[0].options.safety.settings().len(), 1);
}

#[tokio::test]
async fn custom_background_replaces_the_prompt_target() {
    let backend = ScriptedBackend::with(vec![ok(0, image_reply("QQ=="))]);
    let studio = studio(backend.clone(), Some("key"));
    let mut request = BackgroundRequest::new(asset("subject"), "beach");
    request.custom_background = Some(asset("room"));

    studio.change_image_background(&request).await.unwrap();

    let calls = backend.content_calls();
    let roles: Vec<_> = calls[0].parts.iter().filter_map(|part| part.role()).collect();
    assert_eq!(roles, vec![ImageRole::Subject, ImageRole::CustomBackground]);
    let text = calls[0].parts.last().and_then(|part| part.text()).unwrap();
    assert!(text.contains("the reference environment"));
    assert!(!text.contains("beach"));
}

#[tokio::test(start_paused = true)]
async fn batch_drops_failed_prompts() {
    let backend = ScriptedBackend::with(vec![
        ok(20, image_reply("QQ==")),
        fail(10, StudioError::SafetyBlocked),
        ok(5, image_reply("Qg==")),
    ]);
    let studio = studio(backend, Some("key"));
    let prompts = vec!["beach".to_string(), "city".to_string(), "forest".to_string()];

    let images = studio
        .change_image_background_batch(&BackgroundRequest::new(asset("subject"), ""), &prompts)
        .await
        .unwrap();

    assert_eq!(
        images,
        vec![
            "data:image/png;base64,Qg==".to_string(),
            "data:image/png;base64,QQ==".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn batch_where_everything_fails_is_empty_not_an_error() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("events.jsonl");
    let backend = ScriptedBackend::with(vec![
        fail(0, StudioError::SafetyBlocked),
        fail(0, StudioError::SafetyBlocked),
        fail(0, StudioError::PermissionDenied("denied".to_string())),
    ]);
    let studio = studio(backend, Some("key")).with_journal(EventJournal::new(&path, "session"));
    let prompts = vec!["beach".to_string(), "city".to_string(), "forest".to_string()];

    let images = studio
        .change_image_background_batch(&BackgroundRequest::new(asset("subject"), ""), &prompts)
        .await?;

    assert!(images.is_empty());
    let events: Vec<StudioEvent> = read_journal(&path)?
        .into_iter()
        .map(|entry| entry.event)
        .collect();
    assert_eq!(events.len(), 5);
    assert!(matches!(
        events[0],
        StudioEvent::TaskStarted { task: TaskKind::BackgroundBatch, attempts: 3, .. }
    ));
    let mut failed: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            StudioEvent::AttemptFailed { task: TaskKind::BackgroundBatch, attempt, .. } => {
                Some(*attempt)
            }
            _ => None,
        })
        .collect();
    failed.sort_unstable();
    assert_eq!(failed, vec![0, 1, 2]);
    assert_eq!(
        events[4],
        StudioEvent::TaskFinished { task: TaskKind::BackgroundBatch, results: 0 }
    );
    Ok(())
}

#[tokio::test]
async fn imagen_models_use_the_text_only_route() {
    let backend = ScriptedBackend::with(vec![ok(
        0,
        json!({ "predictions": [{ "bytesBase64Encoded": "QQ==" }] }),
    )]);
    let studio = studio(backend.clone(), Some("key"));
    let request = TryOnRequest {
        model_id: Some("imagen-4.0-generate-001".to_string()),
        instructions: "a linen suit".to_string(),
        ..try_on(1)
    };

    let images = studio.generate_virtual_try_on(&request).await.unwrap();

    assert_eq!(images, vec!["data:image/png;base64,QQ==".to_string()]);
    assert!(backend.content_calls().is_empty());
    let calls = backend.images_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains("a linen suit"));
}

#[tokio::test]
async fn analysis_uses_the_text_model() {
    let backend = ScriptedBackend::with(vec![ok(0, text_reply("Oversized linen shirt."))]);
    let studio = studio(backend.clone(), Some("key"));

    let analysis = studio.analyze_outfit(&asset("subject"), None).await.unwrap();

    assert_eq!(analysis, "Oversized linen shirt.");
    let calls = backend.content_calls();
    assert_eq!(calls[0].model_id, studio.config().text_model);
    assert!(calls[0].options.safety.is_empty());
    assert_eq!(calls[0].options.response_format, ResponseFormat::Text);
}

#[tokio::test]
async fn prompt_generation_returns_prompts_in_order() {
    let backend = ScriptedBackend::with(vec![ok(
        0,
        text_reply(r#"{"prompts":["a","b","c","d","e"]}"#),
    )]);
    let studio = studio(backend.clone(), Some("key"));

    let prompts = studio
        .generate_prompts_from_analysis("linen shirt", 5)
        .await
        .unwrap();

    assert_eq!(prompts, vec!["a", "b", "c", "d", "e"]);
    let calls = backend.content_calls();
    assert!(calls[0]
        .system_instruction
        .as_deref()
        .unwrap()
        .starts_with("Generate 5 video motion prompts"));
    assert_eq!(calls[0].options.response_format, ResponseFormat::prompt_list());
}

#[tokio::test]
async fn prompt_generation_rejects_unstructured_replies_without_retrying() {
    let backend = ScriptedBackend::with(vec![ok(0, text_reply("1. spin around"))]);
    let studio = studio(backend.clone(), Some("key"));

    let err = studio
        .generate_prompts_from_analysis("linen shirt", 3)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedStructuredResponse);
    assert_eq!(backend.content_calls().len(), 1);
}

#[tokio::test]
async fn prompt_generation_treats_empty_text_as_no_prompts() {
    let backend = ScriptedBackend::with(vec![ok(0, text_reply(""))]);
    let studio = studio(backend, Some("key"));

    let prompts = studio
        .generate_prompts_from_analysis("linen shirt", 3)
        .await
        .unwrap();

    assert!(prompts.is_empty());
}

#[tokio::test]
async fn video_prompts_reuse_cached_analysis() {
    let backend = ScriptedBackend::with(vec![ok(0, text_reply(r#"{"prompts":["walk"]}"#))]);
    let studio = studio(backend.clone(), Some("key"));

    let result = studio
        .video_prompts(&asset("subject"), None, 1, Some("cached outfit"))
        .await
        .unwrap();

    assert_eq!(result.analysis, "cached outfit");
    assert_eq!(result.prompts, vec!["walk"]);
    let calls = backend.content_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].parts[0].text(), Some("cached outfit"));
}

#[tokio::test(start_paused = true)]
async fn journal_records_task_lifecycle_without_image_bytes() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("events.jsonl");
    let backend = ScriptedBackend::with(vec![
        fail(5, StudioError::SafetyBlocked),
        ok(10, image_reply("SECRETBYTES")),
    ]);
    let studio = studio(backend, Some("key")).with_journal(EventJournal::new(&path, "session"));

    studio.generate_virtual_try_on(&try_on(2)).await?;

    let raw = std::fs::read_to_string(&path)?;
    assert!(!raw.contains("SECRETBYTES"));
    let events: Vec<StudioEvent> = read_journal(&path)?
        .into_iter()
        .map(|entry| entry.event)
        .collect();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], StudioEvent::TaskStarted { task: TaskKind::TryOn, attempts: 2, .. }));
    match &events[1] {
        StudioEvent::AttemptFailed { task, kind, .. } => {
            assert_eq!(*task, TaskKind::TryOn);
            assert_eq!(kind, "safety_blocked");
        }
        other => panic!("expected attempt_failed, got {other:?}"),
    }
    assert_eq!(events[2], StudioEvent::TaskFinished { task: TaskKind::TryOn, results: 1 });
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn outfit_analysis_retries_transient_failures() {
    let backend = ScriptedBackend::with(vec![
        fail(0, StudioError::TransientBackendError("503 overloaded".to_string())),
        ok(0, text_reply("Double-breasted wool coat.")),
    ]);
    let studio = studio(backend.clone(), Some("key"));

    let analysis = studio.analyze_outfit(&asset("subject"), None).await.unwrap();

    assert_eq!(analysis, "Double-breasted wool coat.");
    assert_eq!(backend.content_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn prompt_generation_retries_transient_failures() {
    let backend = ScriptedBackend::with(vec![
        fail(0, StudioError::TransientBackendError("deadline expired".to_string())),
        ok(0, text_reply(r#"{"prompts":["turn","walk","pose"]}"#)),
    ]);
    let studio = studio(backend.clone(), Some("key"));

    let prompts = studio
        .generate_prompts_from_analysis("wool coat", 3)
        .await
        .unwrap();

    assert_eq!(prompts, vec!["turn", "walk", "pose"]);
    assert_eq!(backend.content_calls().len(), 2);
}
