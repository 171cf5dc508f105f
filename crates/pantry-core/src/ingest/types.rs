//! Records, artifacts and error entries produced by an ingestion run.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp format used inside records, tasks and artifacts.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keys owned by the record envelope; a model reply may not override them.
const RESERVED_KEYS: [&str; 3] = ["filePath", "processedAt", "error"];

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Outcome of analyzing one source file.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The reply parsed (directly or after repair) into a JSON object
    Parsed { fields: Map<String, Value> },
    /// Synthetic record used when the reply could not be recovered or the
    /// provider call failed
    Fallback {
        fields: Map<String, Value>,
        error: String,
    },
}

impl Extraction {
    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            Extraction::Parsed { fields } | Extraction::Fallback { fields, .. } => fields,
        }
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Extraction::Parsed { fields } | Extraction::Fallback { fields, .. } => fields,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Extraction::Parsed { .. } => None,
            Extraction::Fallback { error, .. } => Some(error),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Extraction::Fallback { .. })
    }

    pub fn into_record(self, file_path: String, processed_at: String) -> ExtractedRecord {
        let (mut fields, error) = match self {
            Extraction::Parsed { fields } => (fields, None),
            Extraction::Fallback { fields, error } => (fields, Some(error)),
        };
        for key in RESERVED_KEYS {
            fields.remove(key);
        }
        ExtractedRecord {
            fields,
            file_path,
            processed_at,
            error,
        }
    }
}

/// One item in an artifact: the model's fields plus where they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Path relative to the run's source directory
    pub file_path: String,
    pub processed_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A file that failed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
    pub timestamp: String,
}

impl FileError {
    pub fn now(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            error: error.into(),
            timestamp: format_timestamp(Local::now()),
        }
    }
}

/// The JSON document written to disk when a run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionArtifact {
    pub processed_at: String,
    pub directory: String,
    pub total_files: usize,
    pub processed_files: usize,
    pub task_id: String,
    pub items: Vec<ExtractedRecord>,
    #[serde(default)]
    pub errors: Vec<FileError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_record_serializes_flat_camel_case() {
        let record = Extraction::Parsed {
            fields: object(json!({"name": "蒸蛋", "tags": ["早餐"]})),
        }
        .into_record("breakfast/蒸蛋.md".to_string(), "2025-01-01 08:00:00".to_string());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["name"], "蒸蛋");
        assert_eq!(value["filePath"], "breakfast/蒸蛋.md");
        assert_eq!(value["processedAt"], "2025-01-01 08:00:00");
        assert!(value.get("error").is_none());

        let back: ExtractedRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_fallback_carries_error() {
        let record = Extraction::Fallback {
            fields: object(json!({"title": "x"})),
            error: "JSON解析失败".to_string(),
        }
        .into_record("x.md".to_string(), "t".to_string());

        assert!(record.has_error());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["error"], "JSON解析失败");
    }

    #[test]
    fn test_reply_cannot_override_envelope_keys() {
        let record = Extraction::Parsed {
            fields: object(json!({"title": "t", "filePath": "evil", "error": null})),
        }
        .into_record("real.md".to_string(), "t".to_string());

        assert_eq!(record.file_path, "real.md");
        assert!(!record.has_error());
        assert!(record.get("filePath").is_none());
    }
}
