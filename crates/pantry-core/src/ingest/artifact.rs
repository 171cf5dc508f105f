//! Artifact files on disk and their retention.
//!
//! Each completed run writes `<dir name>_<YYYY-MM-DD_HH-MM-SS>.json` into the
//! output directory, with a `_<n>` suffix when that second is already taken.
//! Only the newest files per directory name are kept.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;

use super::types::IngestionArtifact;

const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Reads and writes artifact files in one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

struct ArtifactFile {
    path: PathBuf,
    name: String,
    modified: SystemTime,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn file_name(basename: &str, at: DateTime<Local>) -> String {
        format!("{}_{}.json", basename, at.format(FILE_TIMESTAMP_FORMAT))
    }

    fn suffixed_file_name(basename: &str, at: DateTime<Local>, n: u32) -> String {
        format!("{}_{}_{}.json", basename, at.format(FILE_TIMESTAMP_FORMAT), n)
    }

    fn pattern(basename: &str) -> Result<Regex> {
        Regex::new(&format!(
            r"^{}_\d{{4}}-\d{{2}}-\d{{2}}_\d{{2}}-\d{{2}}-\d{{2}}(?:_\d+)?\.json$",
            regex::escape(basename)
        ))
        .context("Invalid artifact name pattern")
    }

    /// Serialize `artifact` to a new file named after `basename` and `at`.
    ///
    /// Never overwrites: a run finishing in the same second as an earlier one
    /// gets the next free `_<n>` suffix.
    pub fn write(
        &self,
        artifact: &IngestionArtifact,
        basename: &str,
        at: DateTime<Local>,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {:?}", self.output_dir)
        })?;

        let content =
            serde_json::to_string_pretty(artifact).context("Failed to serialize artifact")?;

        let mut n = 0;
        loop {
            let name = match n {
                0 => Self::file_name(basename, at),
                n => Self::suffixed_file_name(basename, at, n),
            };
            let path = self.output_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())
                        .with_context(|| format!("Failed to write artifact {:?}", path))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create artifact {:?}", path))
                }
            }
        }
    }

    /// Artifact files for `basename`, newest first.
    pub fn list(&self, basename: &str) -> Result<Vec<PathBuf>> {
        Ok(self.scan(basename)?.into_iter().map(|f| f.path).collect())
    }

    fn scan(&self, basename: &str) -> Result<Vec<ArtifactFile>> {
        if !self.output_dir.exists() {
            return Ok(Vec::new());
        }

        let pattern = Self::pattern(basename)?;
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !pattern.is_match(&name) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            files.push(ArtifactFile {
                path: entry.path(),
                name,
                modified,
            });
        }

        // Names embed the write time, so they break mtime ties
        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(files)
    }

    /// Delete every artifact for `basename` beyond the newest `keep`.
    ///
    /// Best-effort: failures are logged and skipped. Returns the files that
    /// were actually deleted.
    pub fn prune(&self, basename: &str, keep: usize) -> Vec<PathBuf> {
        let files = match self.scan(basename) {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(basename, error = %e, "Failed to scan artifacts for cleanup");
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for file in files.into_iter().skip(keep) {
            match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    tracing::info!(file = %file.name, "Deleted old artifact");
                    deleted.push(file.path);
                }
                Err(e) => {
                    tracing::error!(file = %file.name, error = %e, "Failed to delete old artifact");
                }
            }
        }

        if !deleted.is_empty() {
            tracing::info!(
                basename,
                deleted = deleted.len(),
                kept = keep,
                "Cleaned up old artifacts"
            );
        }

        deleted
    }

    /// Path of the newest artifact for `basename`.
    pub fn latest(&self, basename: &str) -> Result<Option<PathBuf>> {
        Ok(self.list(basename)?.into_iter().next())
    }

    pub fn load(path: &Path) -> Result<IngestionArtifact> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse artifact {:?}", path))
    }

    /// The newest artifact for `basename`, if any run has completed.
    pub fn load_latest(&self, basename: &str) -> Result<Option<IngestionArtifact>> {
        match self.latest(basename)? {
            Some(path) => Ok(Some(Self::load(&path)?)),
            None => Ok(None),
        }
    }
}
