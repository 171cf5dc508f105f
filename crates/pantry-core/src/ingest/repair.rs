//! Turning raw model replies into JSON objects.
//!
//! Replies are unreliable: they arrive wrapped in code fences, behind a
//! reasoning preamble, cut off by the token budget, or with small syntax
//! slips. [`extract_json`] tries a direct parse first and otherwise runs
//! [`repair_json`] once before giving up.
//!
//! The repair steps are order-sensitive. Each one assumes the text is
//! mostly well-formed and fixes a single failure mode:
//!
//! 1. strip fences and the reasoning preamble again
//! 2. drop trailing commas
//! 3. trim incomplete trailing lines (truncated replies only)
//! 4. close strings left open on a line
//! 5. append missing `]` / `}` at the end
//! 6. quote bare keys, convert single-quoted strings, add missing commas
//!    between adjacent objects

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Models that think out loud emit their answer after this marker.
pub const REASONING_END_MARKER: &str = "</think>";

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[A-Za-z]*\s*").unwrap());
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```\s*$").unwrap());

/// Trailing line shapes that only appear when a reply was cut off.
static INCOMPLETE_LINES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // unterminated string
        r#"^"[^"]*$"#,
        // "key": "value
        r#"^"[^"]*"\s*:\s*"[^"]*$"#,
        // {"key": "value
        r#"^\{\s*"[^"]*"\s*:\s*"[^"]*$"#,
        // "key":
        r#"^"[^"]*"\s*:$"#,
        // bare {
        r"^\{$",
        // bare comma
        r"^,$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static QUOTE_THEN_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r#""[ \t]*\r?\n\s*\{"#).unwrap());
static OBJECT_THEN_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\}[ \t]*\r?\n\s*\{").unwrap());

/// The reply could not be turned into a JSON object, even after repair.
#[derive(Debug, Error)]
#[error("JSON解析失败: {message}")]
pub struct RepairError {
    pub message: String,
    /// Text after the repair pass, for logging
    pub repaired: String,
}

/// Parse a model reply into a JSON object, repairing it if needed.
pub fn extract_json(raw: &str, truncated: bool) -> Result<Map<String, Value>, RepairError> {
    let cleaned = strip_reasoning(&strip_code_fence(raw));

    let first_error = match parse_object(&cleaned) {
        Ok(object) => return Ok(object),
        Err(e) => e,
    };
    tracing::debug!(error = %first_error, "Direct JSON parse failed, repairing");

    let repaired = repair_json(&cleaned, truncated);
    parse_object(&repaired).map_err(|e| RepairError {
        message: e,
        repaired,
    })
}

/// Run every repair heuristic in order.
pub fn repair_json(text: &str, truncated: bool) -> String {
    let mut fixed = strip_reasoning(&strip_code_fence(text));
    fixed = remove_trailing_commas(&fixed);
    if truncated {
        fixed = trim_truncated_tail(&fixed);
    }
    fixed = close_unterminated_strings(&fixed);
    fixed = balance_brackets(&fixed);
    fix_common_format_errors(&fixed)
}

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(format!("expected a JSON object, got {}", kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Remove a leading ```` ```json ```` line and a trailing ```` ``` ````.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = FENCE_OPEN.replace(trimmed, "");
    FENCE_CLOSE.replace(&without_open, "").trim().to_string()
}

/// Keep only what follows the first [`REASONING_END_MARKER`].
pub fn strip_reasoning(text: &str) -> String {
    match text.find(REASONING_END_MARKER) {
        Some(idx) => text[idx + REASONING_END_MARKER.len()..].trim().to_string(),
        None => text.to_string(),
    }
}

/// Drop commas that directly precede `}` or `]`, outside string literals.
pub fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut scanner = StringScanner::default();

    for (i, &c) in chars.iter().enumerate() {
        if !scanner.in_string() && c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        scanner.feed(c);
        out.push(c);
    }

    out
}

/// Pop trailing lines that look cut off, then drop a trailing comma from
/// the new last line.
pub fn trim_truncated_tail(text: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    let mut modified = false;

    while let Some(&last) = lines.last() {
        let last = last.trim();
        if last.is_empty() || INCOMPLETE_LINES.iter().any(|re| re.is_match(last)) {
            lines.pop();
            modified = true;
        } else {
            break;
        }
    }

    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    if modified {
        if let Some(last) = out.last_mut() {
            let kept = last.trim_end();
            *last = kept.strip_suffix(',').unwrap_or(kept).to_string();
        }
        tracing::warn!("Trimmed incomplete lines from truncated reply");
    }

    out.join("\n")
}

/// Close strings left open on a line (odd number of unescaped quotes).
///
/// The closing quote goes right before the next `,` `]` or `}` after the
/// last quote on that line, or at the end of the line.
pub fn close_unterminated_strings(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let quotes = unescaped_quote_positions(line);
            if quotes.len() % 2 == 0 {
                return line.to_string();
            }

            // quotes is non-empty when its length is odd
            let last_quote = quotes[quotes.len() - 1];
            let after = &line[last_quote + 1..];
            let trimmed = after.trim_end_matches('\r');
            match after.find(&[',', ']', '}'][..]) {
                Some(offset) => {
                    let at = last_quote + 1 + offset;
                    format!("{}\"{}", &line[..at], &line[at..])
                }
                None => {
                    let at = last_quote + 1 + trimmed.len();
                    format!("{}\"{}", &line[..at], &line[at..])
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescaped_quote_positions(line: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => positions.push(i),
            _ => {}
        }
    }
    positions
}

/// Append the closers for every `{` / `[` still open at the end of the text,
/// innermost first. Brackets inside string literals are ignored and nothing
/// is inserted mid-stream.
pub fn balance_brackets(text: &str) -> String {
    let mut stack = Vec::new();
    let mut scanner = StringScanner::default();

    for c in text.chars() {
        let was_in_string = scanner.in_string();
        scanner.feed(c);
        if was_in_string || scanner.in_string() {
            continue;
        }
        match c {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if scanner.in_string() {
        out.push('"');
    }
    out.extend(stack.iter().rev());
    out
}

/// Quote bare keys, turn single-quoted strings into double-quoted ones,
/// insert commas between adjacent objects and drop trailing commas again.
pub fn fix_common_format_errors(text: &str) -> String {
    let fixed = convert_single_quotes(text);
    let fixed = quote_bare_keys(&fixed);
    let fixed = remove_trailing_commas(&fixed);
    let fixed = QUOTE_THEN_OBJECT.replace_all(&fixed, "\",\n{");
    OBJECT_THEN_OBJECT.replace_all(&fixed, "},\n{").into_owned()
}

/// Rewrite `'text'` outside double-quoted strings as `"text"`.
pub fn convert_single_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut scanner = StringScanner::default();
    let mut in_single = false;

    for c in text.chars() {
        if in_single {
            match c {
                '\'' => {
                    in_single = false;
                    out.push('"');
                }
                '"' => out.push_str("\\\""),
                _ => out.push(c),
            }
            continue;
        }

        if c == '\'' && !scanner.in_string() {
            in_single = true;
            out.push('"');
            continue;
        }

        scanner.feed(c);
        out.push(c);
    }

    out
}

/// Quote identifiers used as object keys: `{name: 1}` → `{"name": 1}`.
pub fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut scanner = StringScanner::default();
    // Last significant character outside strings
    let mut previous = '{';
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if !scanner.in_string() && is_key_start(c) && matches!(previous, '{' | ',') {
            let start = i;
            let mut end = i;
            while end < chars.len() && is_key_char(chars[end]) {
                end += 1;
            }
            let mut colon = end;
            while colon < chars.len() && chars[colon].is_whitespace() {
                colon += 1;
            }
            let ident: String = chars[start..end].iter().collect();
            if colon < chars.len() && chars[colon] == ':' {
                out.push('"');
                out.push_str(&ident);
                out.push('"');
            } else {
                out.push_str(&ident);
            }
            previous = chars[end - 1];
            i = end;
            continue;
        }

        let was_in_string = scanner.in_string();
        scanner.feed(c);
        out.push(c);
        if !was_in_string && !scanner.in_string() && !c.is_whitespace() {
            previous = c;
        } else if was_in_string && !scanner.in_string() {
            previous = '"';
        }
        i += 1;
    }

    out
}

fn is_key_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Tracks whether a character stream is inside a double-quoted literal.
#[derive(Debug, Default)]
struct StringScanner {
    in_string: bool,
    escaped: bool,
}

impl StringScanner {
    fn in_string(&self) -> bool {
        self.in_string
    }

    fn feed(&mut self, c: char) {
        if !self.in_string {
            if c == '"' {
                self.in_string = true;
            }
            return;
        }
        if self.escaped {
            self.escaped = false;
        } else if c == '\\' {
            self.escaped = true;
        } else if c == '"' {
            self.in_string = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parses(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|e| panic!("{e}: {text}"))
    }

    #[test]
    fn test_well_formed_json_passes_through() {
        let raw = r#"{"name": "蒸蛋", "category": "breakfast", "tags": [], "note": "a, b: c"}"#;
        let object = extract_json(raw, false).unwrap();
        assert_eq!(Value::Object(object), parses(raw));

        // Repairing valid JSON keeps it equivalent
        assert_eq!(parses(&repair_json(raw, false)), parses(raw));
        let pretty = serde_json::to_string_pretty(&parses(raw)).unwrap();
        assert_eq!(parses(&repair_json(&pretty, true)), parses(raw));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_reasoning_keeps_answer() {
        let raw = "<think>\n先看看文件……{不是答案}\n</think>\n\n{\"title\": \"红烧肉\"}";
        assert_eq!(strip_reasoning(raw), "{\"title\": \"红烧肉\"}");
        assert_eq!(strip_reasoning("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_reasoning_then_fence() {
        let raw = "<think>hmm</think>\n```json\n{\"title\": \"红烧肉\"}\n```";
        let object = extract_json(raw, false).unwrap();
        assert_eq!(object["title"], "红烧肉");
    }

    #[test]
    fn test_trailing_comma() {
        let raw = "{\"tags\": [\"家常\", \"下饭\",], \"title\": \"红烧肉\",}";
        assert_eq!(
            remove_trailing_commas(raw),
            "{\"tags\": [\"家常\", \"下饭\"], \"title\": \"红烧肉\"}"
        );
        assert!(extract_json(raw, false).is_ok());
    }

    #[test]
    fn test_trailing_comma_inside_string_is_kept() {
        let raw = r#"{"note": "a,]"}"#;
        assert_eq!(remove_trailing_commas(raw), raw);
    }

    #[test]
    fn test_unterminated_string_before_structure() {
        let fixed = close_unterminated_strings(r#""name": "蒸蛋,"#);
        assert_eq!(fixed, r#""name": "蒸蛋","#);
        let fixed = close_unterminated_strings(r#"  "tags": ["家常, "下饭"]"#);
        assert_eq!(fixed, r#"  "tags": ["家常, "下饭""]"#);
    }

    #[test]
    fn test_unterminated_string_is_repaired() {
        let raw = "{\n  \"title\": \"红烧肉\",\n  \"summary\": \"经典家常菜\n}";
        let object = extract_json(raw, false).unwrap();
        assert_eq!(object["summary"], "经典家常菜");
    }

    #[test]
    fn test_escaped_quotes_do_not_count() {
        let line = r#"  "title": "他说\"好\"","#;
        assert_eq!(close_unterminated_strings(line), line);
    }

    #[test]
    fn test_missing_closing_brace() {
        let raw = "{\"title\": \"红烧肉\", \"tags\": [\"家常\"]";
        assert_eq!(balance_brackets(raw), format!("{raw}}}"));
        let object = extract_json(raw, false).unwrap();
        assert_eq!(object["tags"], json!(["家常"]));
    }

    #[test]
    fn test_balance_appends_in_nesting_order() {
        assert_eq!(balance_brackets("{\"a\": [{\"b\": ["), "{\"a\": [{\"b\": []}]}");
        assert_eq!(balance_brackets("{\"a\": \"[{\""), "{\"a\": \"[{\"}");
        assert_eq!(balance_brackets("{}"), "{}");
    }

    #[test]
    fn test_truncated_single_line_reply() {
        let raw = r#"{"title": "红烧肉", "steps": ["step1", "step2"], "tags": ["家常""#;
        let object = extract_json(raw, true).unwrap();
        assert_eq!(object["title"], "红烧肉");
        assert_eq!(object["tags"], json!(["家常"]));
        assert_eq!(object["steps"], json!(["step1", "step2"]));
    }

    #[test]
    fn test_truncated_multi_line_reply() {
        let raw = "{\n  \"title\": \"红烧肉\",\n  \"tags\": [\"家常\", \"下饭\"],\n  \"summary\": \"这是一道经典的";
        let trimmed = trim_truncated_tail(raw);
        assert_eq!(trimmed, "{\n  \"title\": \"红烧肉\",\n  \"tags\": [\"家常\", \"下饭\"]");

        let object = extract_json(raw, true).unwrap();
        assert_eq!(object["tags"], json!(["家常", "下饭"]));
        assert!(object.get("summary").is_none());
    }

    #[test]
    fn test_truncated_inside_nested_array() {
        let raw = "{\n  \"name\": \"红烧肉\",\n  \"ingredients\": [\n    {\n";
        let object = extract_json(raw, true).unwrap();
        assert_eq!(object["ingredients"], json!([]));
    }

    #[test]
    fn test_trim_only_runs_for_truncated_replies() {
        let raw = "{\"a\": 1}\n,\n";
        assert_eq!(trim_truncated_tail(raw), "{\"a\": 1}");
        // Not flagged: the trailing comma line survives into the repair
        assert!(repair_json(raw, false).contains(','));
    }

    #[test]
    fn test_bare_keys_and_single_quotes() {
        let raw = "{name: '蒸蛋', tags: ['早餐', \"快手\"], starLevel: 2}";
        let object = extract_json(raw, false).unwrap();
        assert_eq!(object["name"], "蒸蛋");
        assert_eq!(object["tags"], json!(["早餐", "快手"]));
        assert_eq!(object["starLevel"], 2);
    }

    #[test]
    fn test_bare_key_lookalikes_inside_strings_are_untouched() {
        let raw = r#"{"url": "see, http://example.com", "ok": true}"#;
        assert_eq!(quote_bare_keys(raw), raw);
        assert_eq!(convert_single_quotes(r#"{"note": "it's fine"}"#), r#"{"note": "it's fine"}"#);
    }

    #[test]
    fn test_missing_comma_between_objects() {
        let raw = "{\"dishes\": [\n  {\"name\": \"a\"}\n  {\"name\": \"b\"}\n]}";
        let object = extract_json(raw, false).unwrap();
        assert_eq!(object["dishes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_unrecoverable_reply_is_an_error() {
        let err = extract_json("抱歉，我无法分析这个文件。", false).unwrap_err();
        assert!(err.to_string().starts_with("JSON解析失败"));

        let err = extract_json("[1, 2, 3]", false).unwrap_err();
        assert!(err.message.contains("array"));
    }
}
