//! Preparing artifact records for import into the content database.
//!
//! Records carrying an `error` are skipped. Dish records are normalized into
//! the shapes the database expects (single category, list fields, times in
//! minutes).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::ingest::{ExtractedRecord, IngestionArtifact};

static HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*小时").unwrap());
static RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)-(\d+(?:\.\d+)?)").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

const DEFAULT_DISH_CATEGORY: &str = "meat_dish";
const UNKNOWN_FILE: &str = "未知文件";

/// A record left out of an import.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub file_path: String,
    pub error: String,
}

/// The records of one artifact, split into importable and skipped.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub records: Vec<ExtractedRecord>,
    pub skipped: Vec<SkippedRecord>,
}

/// Counts reported back to the caller of an import.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total: usize,
    pub importable: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl ImportBatch {
    pub fn from_artifact(artifact: IngestionArtifact) -> Self {
        let mut batch = Self::default();
        for record in artifact.items {
            match &record.error {
                Some(error) => {
                    tracing::info!(file = %record.file_path, error = %error, "Skipping record with error");
                    let file_path = if record.file_path.is_empty() {
                        UNKNOWN_FILE.to_string()
                    } else {
                        record.file_path.clone()
                    };
                    batch.skipped.push(SkippedRecord {
                        file_path,
                        error: error.clone(),
                    });
                }
                None => batch.records.push(record),
            }
        }
        batch
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            total: self.records.len() + self.skipped.len(),
            importable: self.records.len(),
            skipped: self.skipped.clone(),
        }
    }

    /// Importable records as documents, `filePath` included.
    pub fn documents(&self) -> Vec<Map<String, Value>> {
        self.records
            .iter()
            .map(|record| {
                let mut document = record.fields.clone();
                document.insert("filePath".to_string(), Value::String(record.file_path.clone()));
                document
            })
            .collect()
    }

    /// Importable records as normalized dish documents.
    pub fn dishes(&self) -> Vec<Map<String, Value>> {
        let mut dishes = self.documents();
        dishes.iter_mut().for_each(normalize_dish);
        dishes
    }
}

/// Convert a duration such as `"30分钟"`, `"5-10分钟"` or `"1.5小时"` to
/// minutes. Numbers pass through; anything unrecognized is 0.
///
/// Ranges yield their midpoint to one decimal; other values are rounded to
/// whole minutes.
pub fn parse_time_to_minutes(value: &Value) -> f64 {
    let text = match value {
        Value::Number(n) => return n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim(),
        _ => return 0.0,
    };

    if let Some(caps) = HOURS.captures(text) {
        let hours: f64 = caps[1].parse().unwrap_or(0.0);
        return (hours * 60.0).round();
    }

    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, '分' | '钟' | '小' | '时'))
        .collect();

    if let Some(caps) = RANGE.captures(&digits) {
        let low: f64 = caps[1].parse().unwrap_or(0.0);
        let high: f64 = caps[2].parse().unwrap_or(0.0);
        return ((low + high) / 2.0 * 10.0).round() / 10.0;
    }

    NUMBER
        .find(&digits)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(f64::round)
        .unwrap_or(0.0)
}

fn minutes_value(minutes: f64) -> Value {
    if minutes.fract() == 0.0 {
        Value::from(minutes as i64)
    } else {
        Value::from(minutes)
    }
}

/// Coerce a dish record's loosely typed fields into their stored shapes.
pub fn normalize_dish(dish: &mut Map<String, Value>) {
    let category = match dish.get("category") {
        Some(Value::Array(items)) => items
            .first()
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_DISH_CATEGORY)
            .to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => DEFAULT_DISH_CATEGORY.to_string(),
    };
    dish.insert("category".to_string(), Value::String(category));

    let suitable_for = match dish.remove("suitableFor") {
        Some(Value::String(s)) => s
            .split(',')
            .map(|item| Value::String(item.trim().to_string()))
            .collect(),
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => vec![Value::String("未知".to_string())],
    };
    dish.insert("suitableFor".to_string(), Value::Array(suitable_for));

    for field in ["ingredients", "steps"] {
        if !matches!(dish.get(field), Some(Value::Array(_))) {
            dish.insert(field.to_string(), Value::Array(Vec::new()));
        }
    }

    if let Some(Value::Array(steps)) = dish.get_mut("steps") {
        for step in steps.iter_mut().filter_map(Value::as_object_mut) {
            let time = step.get("estimatedTime").filter(|t| is_truthy(t)).cloned();
            if let Some(time) = time {
                step.insert(
                    "estimatedTime".to_string(),
                    minutes_value(parse_time_to_minutes(&time)),
                );
            }
        }
    }

    let total = dish
        .get("estimatedTime")
        .map(parse_time_to_minutes)
        .unwrap_or(0.0);
    dish.insert("estimatedTime".to_string(), minutes_value(total));
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
