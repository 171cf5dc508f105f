use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::ProviderConfig;

/// Application paths
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (~/.local/share/pantry)
    pub data_dir: PathBuf,
    /// Artifact output directory
    pub output_dir: PathBuf,
    /// Settings file (JSON)
    pub settings_file: PathBuf,
    /// Directory holding the `dishes/`, `tips/` and `starsystem/` trees
    pub content_root: PathBuf,
}

impl Config {
    /// Load configuration or use defaults
    pub fn load_or_default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pantry");

        let content_root = std::env::var_os("PANTRY_CONTENT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::with_data_dir(data_dir, content_root)
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>, content_root: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            output_dir: data_dir.join("output"),
            settings_file: data_dir.join("settings.json"),
            content_root: content_root.into(),
            data_dir,
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }
}

/// Per-profile overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileOverride {
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub max_artifacts: Option<usize>,
}

/// User settings persisted as JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Delay after each file to stay under provider rate limits
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverride>,
}

fn default_max_output_tokens() -> u32 {
    8000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_pace_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: None,
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            pace_ms: default_pace_ms(),
            profiles: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path)
            .context("Failed to read settings")
            .and_then(|s| serde_json::from_str(&s).context("Failed to parse settings"))
        {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Using default settings ({:?}): {:#}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content).context("Failed to write settings")?;
        Ok(())
    }

    /// Configured provider, or one built from `OPENAI_*` environment variables.
    pub fn resolve_provider(&self) -> Option<ProviderConfig> {
        self.provider.clone().or_else(ProviderConfig::from_env)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}
