//! In-memory registry of running ingestion tasks.
//!
//! A task exists in the registry only while its run is in flight; finished
//! runs are removed. Nothing is persisted, so a restart forgets every task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::types::{format_timestamp, FileError};

/// State of one in-flight run over one directory.
#[derive(Debug, Clone)]
pub struct IngestionTask {
    pub task_id: String,
    pub directory: PathBuf,
    pub total_files: usize,
    /// Files finished so far
    pub current_file: usize,
    /// File currently being analyzed (or the last one finished)
    pub current_file_name: String,
    pub started_at: String,
    pub errors: Vec<FileError>,
    pub running: bool,
}

impl IngestionTask {
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            is_processing: self.running,
            current_file: self.current_file,
            total_files: self.total_files,
            current_file_name: self.current_file_name.clone(),
            progress: percent(self.current_file, self.total_files),
            start_time: Some(self.started_at.clone()),
            errors: self.errors.clone(),
            task_id: Some(self.task_id.clone()),
            directory: Some(self.directory.to_string_lossy().into_owned()),
        }
    }
}

/// Progress as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub is_processing: bool,
    pub current_file: usize,
    pub total_files: usize,
    pub current_file_name: String,
    /// Rounded percentage, 0 when there are no files
    pub progress: u8,
    pub start_time: Option<String>,
    pub errors: Vec<FileError>,
    pub task_id: Option<String>,
    pub directory: Option<String>,
}

impl TaskSnapshot {
    /// Snapshot for a directory with no run in flight.
    pub fn idle() -> Self {
        Self {
            is_processing: false,
            current_file: 0,
            total_files: 0,
            current_file_name: String::new(),
            progress: 0,
            start_time: None,
            errors: Vec::new(),
            task_id: None,
            directory: None,
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Task id: source directory name plus the start time in milliseconds.
pub fn task_id_for(directory: &Path) -> String {
    let name = directory
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}_{}", name, Local::now().timestamp_millis())
}

/// Tracks in-flight tasks by task id.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, IngestionTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the running task for `directory`, if any.
    pub async fn running_for(&self, directory: &Path) -> Option<TaskSnapshot> {
        self.tasks
            .read()
            .await
            .values()
            .find(|t| t.running && t.directory == directory)
            .map(IngestionTask::snapshot)
    }

    /// Register a new running task for `directory`.
    ///
    /// The check and the insert happen under one write lock, so concurrent
    /// callers for the same directory get the same task: `Err` carries the
    /// snapshot of the task that is already running.
    pub async fn try_begin(
        &self,
        directory: &Path,
        total_files: usize,
    ) -> Result<TaskSnapshot, TaskSnapshot> {
        let mut tasks = self.tasks.write().await;

        if let Some(existing) = tasks
            .values()
            .find(|t| t.running && t.directory == directory)
        {
            return Err(existing.snapshot());
        }

        let mut task_id = task_id_for(directory);
        while tasks.contains_key(&task_id) {
            task_id.push('_');
        }

        let task = IngestionTask {
            task_id: task_id.clone(),
            directory: directory.to_path_buf(),
            total_files,
            current_file: 0,
            current_file_name: String::new(),
            started_at: format_timestamp(Local::now()),
            errors: Vec::new(),
            running: true,
        };
        let snapshot = task.snapshot();
        tasks.insert(task_id, task);

        Ok(snapshot)
    }

    /// Mark `file_name` as the file being analyzed.
    pub async fn file_started(&self, task_id: &str, file_name: &str) {
        if let Some(task) = self.tasks.write().await.get_mut(task_id) {
            task.current_file_name = file_name.to_string();
        }
    }

    /// Count one more file as finished.
    pub async fn file_completed(&self, task_id: &str) {
        if let Some(task) = self.tasks.write().await.get_mut(task_id) {
            task.current_file = (task.current_file + 1).min(task.total_files);
        }
    }

    pub async fn record_error(&self, task_id: &str, error: FileError) {
        if let Some(task) = self.tasks.write().await.get_mut(task_id) {
            task.errors.push(error);
        }
    }

    /// Errors recorded so far for a task.
    pub async fn errors(&self, task_id: &str) -> Vec<FileError> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|t| t.errors.clone())
            .unwrap_or_default()
    }

    /// Remove a finished task.
    pub async fn finish(&self, task_id: &str) -> Option<IngestionTask> {
        self.tasks.write().await.remove(task_id)
    }

    pub async fn snapshot(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(IngestionTask::snapshot)
    }

    /// Snapshot for a directory; [`TaskSnapshot::idle`] when nothing runs.
    pub async fn snapshot_for_directory(&self, directory: &Path) -> TaskSnapshot {
        self.running_for(directory)
            .await
            .unwrap_or_else(TaskSnapshot::idle)
    }

    /// Snapshots of every task, keyed by task id.
    pub async fn all(&self) -> HashMap<String, TaskSnapshot> {
        self.tasks
            .read()
            .await
            .iter()
            .map(|(id, task)| (id.clone(), task.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(3, 3), 100);
    }

    #[test]
    fn test_task_id_uses_directory_name() {
        let id = task_id_for(Path::new("/srv/content/dishes"));
        assert!(id.starts_with("dishes_"));
        assert!(id["dishes_".len()..].parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let registry = TaskRegistry::new();
        let dir = Path::new("/content/tips");

        assert_eq!(registry.snapshot_for_directory(dir).await, TaskSnapshot::idle());

        let started = registry.try_begin(dir, 2).await.unwrap();
        let id = started.task_id.clone().unwrap();
        assert!(started.is_processing);
        assert_eq!(started.total_files, 2);
        assert_eq!(started.progress, 0);

        registry.file_started(&id, "刀工.md").await;
        registry.file_completed(&id).await;
        registry
            .record_error(&id, FileError::now("火候.md", "read failed"))
            .await;

        let snapshot = registry.snapshot_for_directory(dir).await;
        assert_eq!(snapshot.current_file, 1);
        assert_eq!(snapshot.current_file_name, "刀工.md");
        assert_eq!(snapshot.progress, 50);
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.directory.as_deref(), Some("/content/tips"));

        let finished = registry.finish(&id).await.unwrap();
        assert_eq!(finished.errors.len(), 1);
        assert!(registry.snapshot(&id).await.is_none());
        assert!(!registry.snapshot_for_directory(dir).await.is_processing);
    }

    #[tokio::test]
    async fn test_one_running_task_per_directory() {
        let registry = TaskRegistry::new();
        let dir = Path::new("/content/dishes");

        let first = registry.try_begin(dir, 5).await.unwrap();
        let second = registry.try_begin(dir, 5).await.unwrap_err();
        assert_eq!(first.task_id, second.task_id);
        assert_eq!(registry.all().await.len(), 1);

        // A different directory may run at the same time
        assert!(registry.try_begin(Path::new("/content/tips"), 1).await.is_ok());
        assert_eq!(registry.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_begin_registers_once() {
        let registry = TaskRegistry::new();
        let dir = PathBuf::from("/content/starsystem");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let dir = dir.clone();
                tokio::spawn(async move {
                    match registry.try_begin(&dir, 3).await {
                        Ok(s) | Err(s) => s.task_id,
                    }
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.all().await.len(), 1);
    }
}
