//! Synthetic records for files whose analysis failed.
//!
//! Neither function can fail: they are what keeps one bad file from
//! aborting a run.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::types::Extraction;

static STAR_LEVEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)Star").unwrap());

const SUMMARY_PREVIEW_CHARS: usize = 100;

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Leading difficulty level encoded in names like `3Star.md`.
pub fn star_level(path: &Path) -> Option<u64> {
    STAR_LEVEL
        .captures(&file_stem(path))
        .and_then(|caps| caps[1].parse().ok())
}

/// Record used when the reply could not be parsed, even after repair.
pub fn unparseable_reply(path: &Path, error: impl Into<String>) -> Extraction {
    let level = star_level(path);
    let title = match level {
        Some(level) => format!("{} 星难度菜品", level),
        None => file_stem(path),
    };

    Extraction::Fallback {
        fields: object(json!({
            "title": title,
            "starLevel": level.unwrap_or(1),
            "dishes": [],
            "difficultyDescription": "解析失败，请手动处理",
            "recommendedFor": ["所有人"],
            "tags": ["解析失败"],
        })),
        error: error.into(),
    }
}

/// Record used when the provider call itself failed.
pub fn provider_failure(path: &Path, content: &str, error: impl Into<String>) -> Extraction {
    let preview: String = content.chars().take(SUMMARY_PREVIEW_CHARS).collect();

    Extraction::Fallback {
        fields: object(json!({
            "title": file_stem(path),
            "category": "未分类",
            "tags": [],
            "summary": format!("{}...", preview),
        })),
        error: error.into(),
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
