use std::env;
use std::fmt;
use std::sync::Arc;

use anyhow::bail;
use serde_json::Value;

use crate::store::KeyValueStore;

/// Storage key holding the manual credential override.
pub const MANUAL_CREDENTIAL_KEY: &str = "manual_api_key";
/// Host environment variable providing the default credential.
pub const DEFAULT_CREDENTIAL_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Manual,
    Environment,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Environment => "environment",
        }
    }
}

/// Opaque API credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,
    source: CredentialSource,
}

impl Credential {
    pub fn new(secret: impl Into<String>, source: CredentialSource) -> Option<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            return None;
        }
        Some(Self { secret, source })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Source of the credential used for outbound calls.
///
/// `resolve` never fails: an unconfigured store yields `None`, and callers must
/// refuse to call the backend in that case.
pub trait CredentialStore: Send + Sync {
    fn resolve(&self) -> Option<Credential>;
    fn set(&self, secret: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// Manual override persisted in the host key-value store, falling back to a
/// host-provided default.
pub struct HostCredentialStore {
    store: Arc<dyn KeyValueStore>,
    host_default: Option<String>,
}

impl HostCredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>, host_default: Option<String>) -> Self {
        Self {
            store,
            host_default,
        }
    }

    pub fn from_env(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, non_empty_env(DEFAULT_CREDENTIAL_ENV))
    }
}

impl CredentialStore for HostCredentialStore {
    fn resolve(&self) -> Option<Credential> {
        let manual = self
            .store
            .get(MANUAL_CREDENTIAL_KEY)
            .and_then(|value| value.as_str().map(str::to_string))
            .and_then(|secret| Credential::new(secret, CredentialSource::Manual));
        manual.or_else(|| {
            self.host_default
                .as_deref()
                .and_then(|secret| Credential::new(secret, CredentialSource::Environment))
        })
    }

    fn set(&self, secret: &str) -> anyhow::Result<()> {
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            bail!("credential must not be empty");
        }
        self.store
            .set(MANUAL_CREDENTIAL_KEY, Value::String(trimmed.to_string()))
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.store.remove(MANUAL_CREDENTIAL_KEY)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
