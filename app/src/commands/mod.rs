use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use pantry_core::import::{ImportBatch, ImportSummary};
use pantry_core::ingest::ArtifactStore;
use pantry_core::profiles::ProfileSummary;
use pantry_core::{AppState, TaskSnapshot};

use crate::error::{CommandError, CommandResult, ResultExt};

/// Profile whose records are normalized as dishes on import
const DISHES_PROFILE: &str = "dishes";

/// Records of the latest artifact, ready for the database import
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub profile: String,
    pub artifact_path: String,
    pub processed_at: String,
    pub summary: ImportSummary,
    pub documents: Vec<Map<String, Value>>,
}

/// Artifact file on disk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub file_name: String,
    pub path: String,
}

/// Start an ingestion run for a profile
///
/// Returns immediately with the task's progress; if a run is already in
/// flight for the profile's directory, its progress is returned instead.
pub async fn start_ingestion(state: &AppState, profile: &str) -> CommandResult<TaskSnapshot> {
    let profile = state.profiles.get(profile)?;
    let service = state.service()?;

    let snapshot = service.start(profile).await?;
    tracing::info!(
        profile = %profile.name,
        task_id = ?snapshot.task_id,
        files = snapshot.total_files,
        "Ingestion requested"
    );
    Ok(snapshot)
}

/// Progress of the run for a profile's directory
pub async fn get_ingestion_progress(state: &AppState, profile: &str) -> CommandResult<TaskSnapshot> {
    let profile = state.profiles.get(profile)?;
    match &state.service {
        Some(service) => Ok(service.progress(&profile.directory).await),
        None => Ok(TaskSnapshot::idle()),
    }
}

/// Progress of every in-flight run, keyed by task id
pub async fn list_ingestion_progress(
    state: &AppState,
) -> CommandResult<HashMap<String, TaskSnapshot>> {
    match &state.service {
        Some(service) => Ok(service.progress_all().await),
        None => Ok(HashMap::new()),
    }
}

/// Load the latest artifact for a profile and split it for import
pub fn prepare_import(state: &AppState, profile: &str) -> CommandResult<ImportPreview> {
    let profile = state.profiles.get(profile)?;
    let store = state.artifacts();
    let basename = profile.artifact_basename();

    let path = store
        .latest(&basename)?
        .ok_or_else(|| CommandError::no_processed_data(&profile.name))?;
    let artifact = ArtifactStore::load(&path)?;
    let processed_at = artifact.processed_at.clone();

    let batch = ImportBatch::from_artifact(artifact);
    let documents = if profile.name == DISHES_PROFILE {
        batch.dishes()
    } else {
        batch.documents()
    };
    let summary = batch.summary();

    tracing::info!(
        profile = %profile.name,
        importable = summary.importable,
        skipped = summary.skipped.len(),
        path = %path.display(),
        "Prepared import"
    );

    Ok(ImportPreview {
        profile: profile.name.clone(),
        artifact_path: path.to_string_lossy().into_owned(),
        processed_at,
        summary,
        documents,
    })
}

/// Artifact files for a profile, newest first
pub fn list_artifacts(state: &AppState, profile: &str) -> CommandResult<Vec<ArtifactInfo>> {
    let profile = state.profiles.get(profile)?;
    let paths = state
        .artifacts()
        .list(&profile.artifact_basename())
        .storage_err()?;

    Ok(paths
        .into_iter()
        .map(|path| ArtifactInfo {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_string_lossy().into_owned(),
        })
        .collect())
}

/// All configured profiles
pub fn list_profiles(state: &AppState) -> Vec<ProfileSummary> {
    state.profiles.iter().map(|p| p.summary()).collect()
}
