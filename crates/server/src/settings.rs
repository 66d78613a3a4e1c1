//! Persisted server settings in `<runtime>/config.json`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use deckforge_core::models::UpstreamConfig;
use deckforge_core::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Runtime directory, overridable with `DECKFORGE_RUNTIME_PATH`
pub fn runtime_dir() -> PathBuf {
    std::env::var("DECKFORGE_RUNTIME_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".deckforge"))
}

/// Load API keys and `RUST_LOG` from `<runtime>/.env`
pub fn load_env() -> Result<Option<PathBuf>, dotenvy::Error> {
    load_env_from(&runtime_dir())
}

/// Load `<dir>/.env` into the process environment.
///
/// Runs before tracing is initialized, so the outcome is returned rather
/// than logged. `Ok(None)` means there was no file.
pub fn load_env_from(dir: &Path) -> Result<Option<PathBuf>, dotenvy::Error> {
    let env_path = dir.join(".env");
    match dotenvy::from_path(&env_path) {
        Ok(()) => Ok(Some(env_path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Settings overriding the built-in defaults; unset fields keep the default
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, ToSchema)]
pub struct DeckforgeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_sections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_on_reset: Option<bool>,
}

impl DeckforgeSettings {
    pub fn path() -> PathBuf {
        runtime_dir().join("config.json")
    }

    /// Read the settings file, falling back to defaults when absent or invalid
    pub async fn load() -> Self {
        let path = Self::path();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid settings file");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    /// Overlay every field set in `other`
    pub fn merge(&mut self, other: DeckforgeSettings) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.api_key_env.is_some() {
            self.api_key_env = other.api_key_env;
        }
        if other.delimiter.is_some() {
            self.delimiter = other.delimiter;
        }
        if other.max_concurrent_sections.is_some() {
            self.max_concurrent_sections = other.max_concurrent_sections;
        }
        if other.cancel_on_reset.is_some() {
            self.cancel_on_reset = other.cancel_on_reset;
        }
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        let mut config = UpstreamConfig::default();
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(var) = &self.api_key_env {
            config.api_key_env = var.clone();
        }
        config
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if let Some(delimiter) = &self.delimiter {
            config.delimiter = delimiter.clone();
        }
        config.max_concurrent_sections = self.max_concurrent_sections;
        if let Some(cancel) = self.cancel_on_reset {
            config.cancel_on_reset = cancel;
        }
        config
    }
}
