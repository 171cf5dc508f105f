//! Command error types for callers of the ingestion commands
//!
//! Provides structured, type-safe errors that serialize to `{"code": "...", "message": "..."}`.

use pantry_core::IngestError;
use serde::Serialize;

/// Errors returned by commands
///
/// Each variant serializes with a snake_case `code` field for caller matching.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CommandError {
    // Validation errors
    UnknownProfile { message: String, profile: String },
    InvalidPrompt { message: String },

    // Not found errors
    DirectoryNotFound { message: String },
    NoFilesFound { message: String },
    NoProcessedData { message: String, profile: String },

    // State errors
    AlreadyRunning { message: String },
    ProviderNotConfigured { message: String },

    // Operation errors
    StorageError { message: String },
    InternalError { message: String },
}

impl CommandError {
    pub fn unknown_profile(profile: impl Into<String>) -> Self {
        let profile = profile.into();
        Self::UnknownProfile {
            message: format!("Unknown ingestion profile: {}", profile),
            profile,
        }
    }

    pub fn no_processed_data(profile: impl Into<String>) -> Self {
        let profile = profile.into();
        Self::NoProcessedData {
            message: format!("没有找到处理后的数据文件 ({})", profile),
            profile,
        }
    }

    pub fn provider_not_configured() -> Self {
        Self::ProviderNotConfigured {
            message: "No completion provider configured".to_string(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::UnknownProfile { message, .. }
            | Self::InvalidPrompt { message }
            | Self::DirectoryNotFound { message }
            | Self::NoFilesFound { message }
            | Self::NoProcessedData { message, .. }
            | Self::AlreadyRunning { message }
            | Self::ProviderNotConfigured { message }
            | Self::StorageError { message }
            | Self::InternalError { message } => message,
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for CommandError {}

impl From<IngestError> for CommandError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::UnknownProfile(profile) => Self::UnknownProfile { message, profile },
            IngestError::MissingPrompt(_) | IngestError::InvalidTemplate(_) => {
                Self::InvalidPrompt { message }
            }
            IngestError::DirectoryNotFound(_) => Self::DirectoryNotFound { message },
            IngestError::NoFilesFound(_) => Self::NoFilesFound { message },
            IngestError::AlreadyRunning(_) => Self::AlreadyRunning { message },
            IngestError::ProviderNotConfigured => Self::ProviderNotConfigured { message },
            IngestError::Other(e) => Self::internal(format!("{:#}", e)),
        }
    }
}

// Conversion from anyhow::Error (used by pantry-core)
impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

/// Result type alias for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Extension trait for converting Results to CommandResult
pub trait ResultExt<T> {
    fn storage_err(self) -> CommandResult<T>;
    fn internal_err(self) -> CommandResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn storage_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::storage(e.to_string()))
    }

    fn internal_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::internal(e.to_string()))
    }
}
