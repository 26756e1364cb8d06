use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Kind of studio task an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TryOn,
    BackgroundChange,
    BackgroundBatch,
    OutfitAnalysis,
    PromptGeneration,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TryOn => "try_on",
            Self::BackgroundChange => "background_change",
            Self::BackgroundBatch => "background_batch",
            Self::OutfitAnalysis => "outfit_analysis",
            Self::PromptGeneration => "prompt_generation",
        }
    }
}

/// Task lifecycle event. Never carries image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioEvent {
    TaskStarted {
        task: TaskKind,
        model: String,
        attempts: usize,
    },
    AttemptFailed {
        task: TaskKind,
        attempt: usize,
        kind: String,
        message: String,
    },
    TaskFinished {
        task: TaskKind,
        results: usize,
    },
    TaskFailed {
        task: TaskKind,
        kind: String,
        message: String,
    },
}

/// One `events.jsonl` line: the event's own fields next to `session_id` and `ts`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub session_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub event: StudioEvent,
}

/// Append-only JSONL journal of the studio tasks run in one session.
#[derive(Debug)]
pub struct EventJournal {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventJournal {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn record(&self, event: StudioEvent) -> anyhow::Result<JournalEntry> {
        let entry = JournalEntry {
            session_id: self.session_id.clone(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            event,
        };
        let line = serde_json::to_string(&entry)?;

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event journal lock poisoned"))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(entry)
    }
}

/// Reads every entry back, skipping lines that do not parse.
pub fn read_journal(path: impl AsRef<std::path::Path>) -> anyhow::Result<Vec<JournalEntry>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
