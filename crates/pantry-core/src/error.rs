//! Errors that end an ingestion run before any file is processed.
//!
//! Everything that goes wrong *during* a run is recorded per file instead
//! (see [`crate::ingest::FileError`]) and never surfaces here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no markdown files found in {}", .0.display())]
    NoFilesFound(PathBuf),

    #[error("an ingestion run is already in progress for {}", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("no prompt configured for profile '{0}'")]
    MissingPrompt(String),

    #[error("prompt template must contain exactly one {{{{content}}}} placeholder, found {0}")]
    InvalidTemplate(usize),

    #[error("unknown ingestion profile: {0}")]
    UnknownProfile(String),

    #[error("no LLM provider configured")]
    ProviderNotConfigured,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
