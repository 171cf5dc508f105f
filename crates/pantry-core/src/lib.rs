//! Pantry Core - AI-assisted ingestion of markdown recipe content
//!
//! This crate contains the ingestion pipeline and everything around it:
//! - Directory walk and prompt templating
//! - Chat-completion providers (OpenAI-compatible, Anthropic)
//! - JSON extraction and repair of model replies
//! - Required-field backfill and fallback records
//! - In-memory progress tracking
//! - Artifact files with retention
//! - Import preparation of finished artifacts

pub mod config;
pub mod error;
pub mod import;
pub mod ingest;
pub mod llm;
pub mod profiles;

use std::sync::Arc;

pub use config::{Config, ProfileOverride, Settings};
pub use error::IngestError;
pub use ingest::{ArtifactStore, IngestOptions, IngestService, RunOutcome, TaskSnapshot};
pub use llm::{CompletionProvider, ProviderConfig};
pub use profiles::{IngestionProfile, ProfileSet};

/// Application state shared across commands
pub struct AppState {
    pub config: Config,
    pub settings: Settings,
    pub profiles: ProfileSet,
    /// None until a provider is configured (settings or environment)
    pub service: Option<IngestService>,
}

impl AppState {
    /// Create AppState from the settings file under `config`.
    pub fn new(config: Config) -> Result<Self, IngestError> {
        config
            .ensure_dirs()
            .map_err(|e| IngestError::Other(e.into()))?;
        let settings = Settings::load(&config.settings_file);

        let provider = match settings.resolve_provider() {
            Some(provider_config) => {
                tracing::info!(
                    provider = provider_config.provider_type(),
                    model = provider_config.model_id(),
                    "Using completion provider"
                );
                Some(provider_config.build(settings.request_timeout())?)
            }
            None => {
                tracing::warn!("No completion provider configured, ingestion is unavailable");
                None
            }
        };

        Self::with_provider(config, settings, provider)
    }

    /// Create AppState around an already-built provider.
    pub fn with_provider(
        config: Config,
        settings: Settings,
        provider: Option<Arc<dyn CompletionProvider>>,
    ) -> Result<Self, IngestError> {
        let profiles = ProfileSet::builtin(&config.content_root, &settings)?;
        let options = IngestOptions {
            max_output_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
            pace: settings.pace(),
        };
        let artifacts = ArtifactStore::new(&config.output_dir);
        let service = provider.map(|p| IngestService::new(p, artifacts, options));

        Ok(Self {
            config,
            settings,
            profiles,
            service,
        })
    }

    /// The ingestion service, if a provider is configured.
    pub fn service(&self) -> Result<&IngestService, IngestError> {
        self.service.as_ref().ok_or(IngestError::ProviderNotConfigured)
    }

    /// Artifact store for the configured output directory.
    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(&self.config.output_dir)
    }
}
