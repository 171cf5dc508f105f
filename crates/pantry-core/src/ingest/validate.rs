//! Required-field checks and default backfill.

use std::path::Path;

use serde_json::{Map, Value};

use super::fallback::file_stem;

/// Fields whose values are lists.
const LIST_FIELDS: [&str; 4] = ["tags", "dishes", "recommendedFor", "suitableFor"];

/// A required field counts as missing when it is absent, null, an empty
/// string or an empty list.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

pub fn missing_fields(fields: &Map<String, Value>, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|field| is_missing(fields.get(field.as_str())))
        .cloned()
        .collect()
}

/// Default for a missing required field.
pub fn default_for(field: &str, source: &Path) -> Value {
    if LIST_FIELDS.contains(&field) {
        return Value::Array(Vec::new());
    }
    match field {
        "starLevel" => Value::from(1),
        "title" => Value::String(file_stem(source)),
        "category" => Value::String("未分类".to_string()),
        "summary" => Value::String("暂无描述".to_string()),
        _ => Value::String("未知".to_string()),
    }
}

/// Fill every missing required field with its default and return the names
/// that were missing.
///
/// List fields default to an empty list, so a list the model returned empty
/// is reported but stays empty.
pub fn backfill(fields: &mut Map<String, Value>, required: &[String], source: &Path) -> Vec<String> {
    let missing = missing_fields(fields, required);
    if missing.is_empty() {
        return missing;
    }

    tracing::warn!(
        path = %source.display(),
        fields = %missing.join(", "),
        "Missing or empty required fields"
    );
    for field in &missing {
        fields.insert(field.clone(), default_for(field, source));
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn required(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_detection() {
        assert!(is_missing(None));
        assert!(is_missing(Some(&Value::Null)));
        assert!(is_missing(Some(&json!(""))));
        assert!(is_missing(Some(&json!([]))));
        assert!(!is_missing(Some(&json!(0))));
        assert!(!is_missing(Some(&json!(false))));
        assert!(!is_missing(Some(&json!({}))));
        assert!(!is_missing(Some(&json!(" "))));
    }

    #[test]
    fn test_present_fields_are_untouched() {
        let mut record = fields(json!({"name": "蒸蛋", "category": "breakfast", "tags": []}));
        let missing = backfill(
            &mut record,
            &required(&["name", "category", "tags"]),
            Path::new("breakfast/蒸蛋.md"),
        );

        // An explicit empty list is reported but kept as an empty list
        assert_eq!(missing, vec!["tags".to_string()]);
        assert_eq!(record["name"], "蒸蛋");
        assert_eq!(record["category"], "breakfast");
        assert_eq!(record["tags"], json!([]));
    }

    #[test]
    fn test_defaults_by_field_kind() {
        let mut record = fields(json!({"title": null, "summary": ""}));
        backfill(
            &mut record,
            &required(&[
                "title",
                "category",
                "summary",
                "starLevel",
                "dishes",
                "recommendedFor",
                "difficulty",
            ]),
            Path::new("/data/tips/刀工基础.md"),
        );

        assert_eq!(record["title"], "刀工基础");
        assert_eq!(record["category"], "未分类");
        assert_eq!(record["summary"], "暂无描述");
        assert_eq!(record["starLevel"], 1);
        assert_eq!(record["dishes"], json!([]));
        assert_eq!(record["recommendedFor"], json!([]));
        assert_eq!(record["difficulty"], "未知");
    }

    #[test]
    fn test_every_required_field_present_after_backfill() {
        let names = required(&["name", "category", "tags", "description"]);
        let mut record = Map::new();
        backfill(&mut record, &names, Path::new("x.md"));
        for name in &names {
            assert!(record.contains_key(name), "{name} missing");
        }
        // Only list fields may stay empty
        assert!(missing_fields(&record, &names) == vec!["tags".to_string()]);
    }
}
