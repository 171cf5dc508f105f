//! The markdown ingestion pipeline.
//!
//! ```text
//! directory ──► walker ──► for each file (sequential, paced):
//!                            read ─► render prompt ─► provider
//!                                                       │
//!                       record ◄─ backfill ◄─ extract/repair (or fallback)
//!
//! after the last file: write artifact ─► prune old artifacts ─► finish task
//! ```
//!
//! One file failing never aborts a run. Only the checks made before the
//! first file (directory, file list, duplicate run) return an error.

mod artifact;
mod fallback;
mod progress;
mod prompt;
mod repair;
mod types;
mod validate;
mod walker;

pub use artifact::ArtifactStore;
pub use fallback::{provider_failure, star_level, unparseable_reply};
pub use progress::{task_id_for, IngestionTask, TaskRegistry, TaskSnapshot};
pub use prompt::{PromptTemplate, CONTENT_PLACEHOLDER};
pub use repair::{extract_json, repair_json, RepairError, REASONING_END_MARKER};
pub use types::{
    format_timestamp, ExtractedRecord, Extraction, FileError, IngestionArtifact, TIMESTAMP_FORMAT,
};
pub use validate::{backfill, default_for, is_missing, missing_fields};
pub use walker::collect_markdown_files;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

use crate::error::IngestError;
use crate::llm::{CompletionProvider, CompletionRequest, SYSTEM_PROMPT};
use crate::profiles::IngestionProfile;

/// Request parameters shared by every file of a run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Delay after each analyzed file
    pub pace: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 8000,
            temperature: 0.3,
            pace: Duration::from_secs(1),
        }
    }
}

/// Result of a run that reached the end of its file list.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub task_id: String,
    pub artifact_path: PathBuf,
    pub artifact: IngestionArtifact,
}

/// A run that passed its checks and holds a registry slot.
struct PreparedRun {
    task_id: String,
    snapshot: TaskSnapshot,
    /// Absolute run directory
    directory: PathBuf,
    files: Vec<PathBuf>,
}

enum Preparation {
    Ready(PreparedRun),
    AlreadyRunning(TaskSnapshot),
}

/// Runs ingestion profiles against a completion provider.
#[derive(Clone)]
pub struct IngestService {
    provider: Arc<dyn CompletionProvider>,
    registry: TaskRegistry,
    artifacts: ArtifactStore,
    options: IngestOptions,
}

impl IngestService {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        artifacts: ArtifactStore,
        options: IngestOptions,
    ) -> Self {
        Self {
            provider,
            registry: TaskRegistry::new(),
            artifacts,
            options,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Start a background run for `profile`.
    ///
    /// Returns the snapshot of the new task, or of the task already running
    /// for the same directory.
    pub async fn start(&self, profile: &IngestionProfile) -> Result<TaskSnapshot, IngestError> {
        let prepared = match self.prepare(profile).await? {
            Preparation::Ready(prepared) => prepared,
            Preparation::AlreadyRunning(snapshot) => {
                tracing::info!(
                    directory = %profile.directory.display(),
                    "Ingestion already running, returning current progress"
                );
                return Ok(snapshot);
            }
        };

        let snapshot = prepared.snapshot.clone();
        let service = self.clone();
        let profile = profile.clone();
        tokio::spawn(async move {
            if let Err(e) = service.execute(&profile, prepared).await {
                tracing::error!(profile = %profile.name, error = %e, "Ingestion run failed");
            }
        });

        Ok(snapshot)
    }

    /// Run `profile` to completion on the current task.
    pub async fn run(&self, profile: &IngestionProfile) -> Result<RunOutcome, IngestError> {
        match self.prepare(profile).await? {
            Preparation::Ready(prepared) => self.execute(profile, prepared).await,
            Preparation::AlreadyRunning(_) => {
                Err(IngestError::AlreadyRunning(profile.directory.clone()))
            }
        }
    }

    /// Progress for a directory; idle when no run is in flight.
    pub async fn progress(&self, directory: &Path) -> TaskSnapshot {
        let directory =
            std::fs::canonicalize(directory).unwrap_or_else(|_| directory.to_path_buf());
        self.registry.snapshot_for_directory(&directory).await
    }

    pub async fn progress_all(&self) -> HashMap<String, TaskSnapshot> {
        self.registry.all().await
    }

    async fn prepare(&self, profile: &IngestionProfile) -> Result<Preparation, IngestError> {
        // Registry keys and artifact paths use the resolved directory
        let directory = std::fs::canonicalize(&profile.directory)
            .ok()
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| IngestError::DirectoryNotFound(profile.directory.clone()))?;

        if let Some(snapshot) = self.registry.running_for(&directory).await {
            return Ok(Preparation::AlreadyRunning(snapshot));
        }

        let files = collect_markdown_files(&directory)?;
        if files.is_empty() {
            return Err(IngestError::NoFilesFound(directory));
        }

        match self.registry.try_begin(&directory, files.len()).await {
            Ok(snapshot) => Ok(Preparation::Ready(PreparedRun {
                task_id: snapshot.task_id.clone().unwrap_or_default(),
                snapshot,
                directory,
                files,
            })),
            Err(snapshot) => Ok(Preparation::AlreadyRunning(snapshot)),
        }
    }

    async fn execute(
        &self,
        profile: &IngestionProfile,
        prepared: PreparedRun,
    ) -> Result<RunOutcome, IngestError> {
        let PreparedRun {
            task_id,
            directory,
            files,
            ..
        } = prepared;
        tracing::info!(
            task_id = %task_id,
            profile = %profile.name,
            directory = %directory.display(),
            files = files.len(),
            model = %self.provider.model_id(),
            "Ingestion started"
        );

        let mut items = Vec::with_capacity(files.len());
        for path in &files {
            if let Some(record) = self.process_file(profile, &task_id, &directory, path).await {
                items.push(record);
                if !self.options.pace.is_zero() {
                    tokio::time::sleep(self.options.pace).await;
                }
            }
        }

        let finished_at = Local::now();
        let artifact = IngestionArtifact {
            processed_at: format_timestamp(finished_at),
            directory: directory.to_string_lossy().into_owned(),
            total_files: files.len(),
            processed_files: items.len(),
            task_id: task_id.clone(),
            items,
            errors: self.registry.errors(&task_id).await,
        };

        let basename = profile.artifact_basename();
        let written = self.artifacts.write(&artifact, &basename, finished_at);
        if written.is_ok() {
            self.artifacts.prune(&basename, profile.max_artifacts);
        }
        self.registry.finish(&task_id).await;

        let artifact_path = written.map_err(|e| {
            tracing::error!(task_id = %task_id, error = %e, "Failed to write artifact");
            IngestError::Other(e)
        })?;

        tracing::info!(
            task_id = %task_id,
            processed = artifact.processed_files,
            total = artifact.total_files,
            errors = artifact.errors.len(),
            path = %artifact_path.display(),
            "Ingestion finished"
        );

        Ok(RunOutcome {
            task_id,
            artifact_path,
            artifact,
        })
    }

    /// Analyze one file. `None` when the file could not be read.
    async fn process_file(
        &self,
        profile: &IngestionProfile,
        task_id: &str,
        root: &Path,
        path: &Path,
    ) -> Option<ExtractedRecord> {
        let relative = relative_path(root, path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.clone());
        self.registry.file_started(task_id, &file_name).await;

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(task_id, path = %path.display(), error = %e, "Failed to read file");
                self.registry
                    .record_error(task_id, FileError::now(&relative, format!("读取文件失败: {}", e)))
                    .await;
                self.registry.file_completed(task_id).await;
                return None;
            }
        };

        let mut extraction = self.analyze(profile, task_id, path, &relative, &content).await;
        let missing = backfill(extraction.fields_mut(), &profile.required_fields, path);
        if !missing.is_empty() {
            tracing::debug!(task_id, path = %relative, ?missing, "Backfilled required fields");
        }

        self.registry.file_completed(task_id).await;
        Some(extraction.into_record(relative, format_timestamp(Local::now())))
    }

    async fn analyze(
        &self,
        profile: &IngestionProfile,
        task_id: &str,
        path: &Path,
        relative: &str,
        content: &str,
    ) -> Extraction {
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: profile.template.render(content),
            max_output_tokens: self.options.max_output_tokens,
            temperature: self.options.temperature,
            json_response: true,
        };

        let completion = match self.provider.complete(&request).await {
            Ok(completion) => completion,
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(task_id, path = %relative, error = %message, "Completion failed");
                self.registry
                    .record_error(task_id, FileError::now(relative, message.clone()))
                    .await;
                return provider_failure(path, content, message);
            }
        };

        if completion.truncated {
            tracing::warn!(
                task_id,
                path = %relative,
                max_output_tokens = self.options.max_output_tokens,
                "Reply was truncated by the output token limit"
            );
        }
        tracing::debug!(task_id, path = %relative, reply = %completion.text, "Model reply");

        match extract_json(&completion.text, completion.truncated) {
            Ok(fields) => Extraction::Parsed { fields },
            Err(e) => {
                tracing::warn!(
                    task_id,
                    path = %relative,
                    error = %e,
                    repaired = %e.repaired,
                    "Reply could not be parsed, using fallback record"
                );
                unparseable_reply(path, e.to_string())
            }
        }
    }
}

/// `path` relative to `root`, with `/` separators.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
