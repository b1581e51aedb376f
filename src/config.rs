//! Configuration management with XDG paths
//!
//! ~/.config/tailgen/config.json       - model, preview path, sampling (0600)
//! ~/.config/tailgen/credentials.json  - stored API key (0600)
//! ~/.local/state/tailgen/preview.html - live preview document

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::client::{Sampling, DEFAULT_BASE_URL};
use crate::prompt::DEFAULT_PLACEHOLDER_IMAGE;

const APP_NAME: &str = "tailgen";

/// Environment override for the API base URL
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Get config directory (~/.config/tailgen/)
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Could not determine config directory")?;
    Ok(base.join(APP_NAME))
}

/// Get state directory (~/.local/state/tailgen/)
pub fn state_dir() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .context("Could not determine state directory")?;
    Ok(base.join(APP_NAME))
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Get credential store path
pub fn credentials_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("credentials.json"))
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model used for generation
    pub model: String,

    /// Model used for the credential check. Kept separate from `model` so the
    /// check can run against something cheaper.
    pub validation_model: String,

    /// API base URL (without the `/chat/completions` suffix)
    pub base_url: String,

    /// Where the preview document is written; state dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<PathBuf>,

    /// Minimum spacing between preview renders while streaming
    pub render_interval_ms: u64,

    pub sampling: Sampling,

    /// Image the model is told to use when the prompt doesn't supply one
    pub placeholder_image: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            validation_model: "gpt-4o-mini".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            preview_path: None,
            render_interval_ms: 1000,
            sampling: Sampling::default(),
            placeholder_image: DEFAULT_PLACEHOLDER_IMAGE.to_string(),
        }
    }
}

impl Config {
    /// Load config from the default location, or return defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Base URL to call: `OPENAI_BASE_URL` when set, else the configured one.
    /// The override is never written back to the config file.
    pub fn effective_base_url(&self) -> String {
        self.base_url_with_override(std::env::var(BASE_URL_ENV).ok().as_deref())
    }

    fn base_url_with_override(&self, env: Option<&str>) -> String {
        match env {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => self.base_url.clone(),
        }
    }

    /// Load config from a specific file, or return defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save config with owner-only permissions
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_private(path, &content)
    }

    /// Preview path, falling back to the state directory
    pub fn resolved_preview_path(&self) -> Result<PathBuf> {
        match &self.preview_path {
            Some(p) => Ok(p.clone()),
            None => Ok(state_dir()?.join("preview.html")),
        }
    }

    /// Apply a `config set <key> <value>` assignment.
    ///
    /// The API key is not part of the config file; `key` is handled by the
    /// credential store instead.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "model" => self.model = value.to_string(),
            "validation-model" | "validation_model" => self.validation_model = value.to_string(),
            "base-url" | "base_url" => self.base_url = value.trim_end_matches('/').to_string(),
            "preview" | "preview_path" => self.preview_path = Some(PathBuf::from(value)),
            "render-interval" | "render_interval_ms" => {
                self.render_interval_ms = value
                    .parse()
                    .with_context(|| format!("Not a number of milliseconds: {}", value))?;
            }
            "max-tokens" | "max_tokens" => {
                self.sampling.max_tokens = value
                    .parse()
                    .with_context(|| format!("Not a token count: {}", value))?;
            }
            _ => anyhow::bail!(
                "Unknown config key: {}. Valid keys: model, validation-model, base-url, preview, render-interval, max-tokens",
                key
            ),
        }
        Ok(())
    }
}

/// Write a file readable only by its owner, creating parent directories
pub(crate) fn write_private(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;

    Ok(())
}
