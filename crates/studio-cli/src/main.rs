use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use studio_contracts::assets::ImageAsset;
use studio_contracts::credentials::{CredentialStore, HostCredentialStore};
use studio_contracts::events::EventJournal;
use studio_contracts::library::{ModelLibrary, SaveOutcome};
use studio_contracts::options::{AspectRatio, ResolutionTier};
use studio_contracts::store::{JsonFileStore, KeyValueStore};
use studio_engine::encoder::parse_data_uri;
use studio_engine::{BackgroundRequest, GeminiBackend, Studio, StudioConfig, TryOnRequest};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "studio", version, about = "Fashion studio generation CLI")]
struct Cli {
    /// Local key-value store for the saved key and model library.
    #[arg(long, global = true, default_value = ".studio/store.json")]
    store: PathBuf,
    /// Append task events to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    TryOn(TryOnArgs),
    Background(BackgroundArgs),
    Analyze(AnalyzeArgs),
    Prompts(PromptsArgs),
    VideoPrompts(VideoPromptsArgs),
    #[command(subcommand)]
    Library(LibraryCommand),
    #[command(subcommand)]
    Key(KeyCommand),
    Models,
}

#[derive(Debug, Parser)]
struct OutputArgs {
    #[arg(long)]
    aspect_ratio: Option<AspectRatio>,
    #[arg(long)]
    resolution: Option<ResolutionTier>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct TryOnArgs {
    #[arg(long, conflicts_with = "subject_id")]
    subject: Option<PathBuf>,
    /// Use a saved model from the library as the subject.
    #[arg(long)]
    subject_id: Option<String>,
    #[arg(long)]
    garment: Option<PathBuf>,
    #[arg(long)]
    detail: Option<PathBuf>,
    #[arg(long)]
    accessory: Option<PathBuf>,
    #[arg(long, default_value = "")]
    instructions: String,
    #[arg(long, default_value_t = 1)]
    variants: usize,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Parser)]
struct BackgroundArgs {
    #[arg(long)]
    image: PathBuf,
    /// Repeat to render one image per prompt.
    #[arg(long = "prompt")]
    prompts: Vec<String>,
    #[arg(long)]
    detail: Option<PathBuf>,
    /// Reference environment photo; overrides the prompt text.
    #[arg(long)]
    background: Option<PathBuf>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    detail: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct PromptsArgs {
    #[arg(long)]
    analysis: String,
    #[arg(long, default_value_t = 3)]
    count: usize,
}

#[derive(Debug, Parser)]
struct VideoPromptsArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    detail: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    count: usize,
    /// Skip analysis and reuse this description.
    #[arg(long)]
    analysis: Option<String>,
}

#[derive(Debug, Subcommand)]
enum LibraryCommand {
    List,
    Save {
        #[arg(long)]
        image: PathBuf,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum KeyCommand {
    Set { value: String },
    Clear,
    Status,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    init_tracing();
    let cli = Cli::parse();
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&cli.store));
    match cli.command {
        Command::Library(command) => run_library(command, store),
        Command::Key(command) => run_key(command, store),
        Command::Models => run_models(&open_studio(store, cli.events.as_deref())),
        command => {
            let studio = open_studio(store.clone(), cli.events.as_deref());
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(run_task(command, &studio, store))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_studio(store: Arc<dyn KeyValueStore>, events: Option<&Path>) -> Studio {
    let config = StudioConfig::from_env();
    let backend = GeminiBackend::from_config(&config);
    let credentials = HostCredentialStore::from_env(store);
    let studio = Studio::new(Arc::new(backend), Arc::new(credentials), config);
    match events {
        Some(path) => {
            let session_id = uuid::Uuid::new_v4().to_string();
            studio.with_journal(EventJournal::new(path, session_id))
        }
        None => studio,
    }
}

async fn run_task(command: Command, studio: &Studio, store: Arc<dyn KeyValueStore>) -> Result<i32> {
    match command {
        Command::TryOn(args) => {
            let subject = match (&args.subject, &args.subject_id) {
                (Some(path), _) => Some(load_image(path)?),
                (None, Some(id)) => Some(
                    ModelLibrary::load(store)
                        .get(id)
                        .cloned()
                        .with_context(|| format!("no saved model with id {id}"))?,
                ),
                (None, None) => None,
            };
            let request = TryOnRequest {
                subject,
                garment: load_optional(args.garment.as_deref())?,
                garment_detail: load_optional(args.detail.as_deref())?,
                accessory: load_optional(args.accessory.as_deref())?,
                instructions: args.instructions,
                aspect_ratio: args.output.aspect_ratio,
                resolution: args.output.resolution,
                model_id: args.output.model,
                variant_count: args.variants,
            };
            let images = studio.generate_virtual_try_on(&request).await?;
            let paths = export_all(&args.output.out, "try-on", &images)?;
            print_json(&json!({ "images": paths }))
        }
        Command::Background(args) => {
            let mut request = BackgroundRequest::new(load_image(&args.image)?, "");
            request.detail = load_optional(args.detail.as_deref())?;
            request.custom_background = load_optional(args.background.as_deref())?;
            request.aspect_ratio = args.output.aspect_ratio;
            request.resolution = args.output.resolution;
            request.model_id = args.output.model;

            let images = if args.prompts.len() > 1 {
                studio
                    .change_image_background_batch(&request, &args.prompts)
                    .await?
            } else {
                request.prompt = args.prompts.into_iter().next().unwrap_or_default();
                vec![studio.change_image_background(&request).await?]
            };
            let paths = export_all(&args.output.out, "background", &images)?;
            print_json(&json!({ "images": paths }))
        }
        Command::Analyze(args) => {
            let image = load_image(&args.image)?;
            let detail = load_optional(args.detail.as_deref())?;
            let analysis = studio.analyze_outfit(&image, detail.as_ref()).await?;
            print_json(&json!({ "analysis": analysis }))
        }
        Command::Prompts(args) => {
            let prompts = studio
                .generate_prompts_from_analysis(&args.analysis, args.count)
                .await?;
            print_json(&json!({ "prompts": prompts }))
        }
        Command::VideoPrompts(args) => {
            let image = load_image(&args.image)?;
            let detail = load_optional(args.detail.as_deref())?;
            let result = studio
                .video_prompts(&image, detail.as_ref(), args.count, args.analysis.as_deref())
                .await?;
            print_json(&json!({ "analysis": result.analysis, "prompts": result.prompts }))
        }
        Command::Library(_) | Command::Key(_) | Command::Models => {
            bail!("command does not run a generation task")
        }
    }
}

fn run_library(command: LibraryCommand, store: Arc<dyn KeyValueStore>) -> Result<i32> {
    let mut library = ModelLibrary::load(store);
    match command {
        LibraryCommand::List => {
            let rows: Vec<Value> = library
                .models()
                .iter()
                .map(|asset| json!({ "id": asset.id, "mimeType": asset.mime_type }))
                .collect();
            print_json(&json!({ "models": rows }))
        }
        LibraryCommand::Save { image } => {
            let asset = load_image(&image)?;
            let id = asset.id.clone();
            let saved = library.save(asset)? == SaveOutcome::Saved;
            print_json(&json!({ "id": id, "saved": saved, "count": library.len() }))
        }
        LibraryCommand::Delete { id } => {
            if !library.delete(&id)? {
                bail!("no saved model with id {id}");
            }
            print_json(&json!({ "deleted": id, "count": library.len() }))
        }
    }
}

fn run_key(command: KeyCommand, store: Arc<dyn KeyValueStore>) -> Result<i32> {
    let credentials = HostCredentialStore::from_env(store);
    match command {
        KeyCommand::Set { value } => {
            credentials.set(&value)?;
            print_json(&json!({ "configured": true, "source": "manual" }))
        }
        KeyCommand::Clear => {
            credentials.clear()?;
            key_status(&credentials)
        }
        KeyCommand::Status => key_status(&credentials),
    }
}

fn key_status(credentials: &dyn CredentialStore) -> Result<i32> {
    let resolved = credentials.resolve();
    print_json(&json!({
        "configured": resolved.is_some(),
        "source": resolved.map(|credential| credential.source().as_str()),
    }))
}

fn run_models(studio: &Studio) -> Result<i32> {
    let rows: Vec<Value> = studio
        .models()
        .list()
        .map(|spec| {
            json!({
                "name": spec.name,
                "provider": spec.provider,
                "route": spec.route.as_str(),
                "capabilities": spec.capabilities,
                "default": spec.name == studio.config().image_model
                    || spec.name == studio.config().text_model,
            })
        })
        .collect();
    print_json(&json!({ "models": rows }))
}

fn print_json(value: &Value) -> Result<i32> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(0)
}

fn load_optional(path: Option<&Path>) -> Result<Option<ImageAsset>> {
    path.map(load_image).transpose()
}

fn load_image(path: &Path) -> Result<ImageAsset> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a recognised image", path.display()))?;
    Ok(ImageAsset::from_bytes(&bytes, format.to_mime_type()))
}

fn export_all(out_dir: &Path, kind: &str, images: &[String]) -> Result<Vec<String>> {
    images
        .iter()
        .map(|uri| export_data_uri(out_dir, kind, uri).map(|path| path.display().to_string()))
        .collect()
}

/// Writes a generated data URI to `{kind}-{short_id}.{ext}` under `out_dir`.
fn export_data_uri(out_dir: &Path, kind: &str, uri: &str) -> Result<PathBuf> {
    let (media_type, payload) = parse_data_uri(uri).context("result is not a data URI")?;
    let bytes = BASE64
        .decode(payload)
        .context("result payload is not valid base64")?;
    let extension = image::ImageFormat::from_mime_type(media_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png");
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(format!("{kind}-{}.{extension}", short_id(&bytes)));
    fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), media_type, "exported result");
    Ok(path)
}

fn short_id(bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    digest[..12].to_string()
}
