//! Anthropic API provider
//!
//! Uses reqwest for non-streaming message completions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Completion, CompletionProvider, CompletionRequest};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API provider
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key and model
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_client(reqwest::Client::new(), api_key, model)
    }

    pub fn with_client(client: reqwest::Client, api_key: &str, model: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = build_request(&self.model, request);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).context("Invalid API key")?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status, text));
        }

        let parsed: MessagesResponse = response.json().await?;
        debug!(model = %self.model, "Anthropic message received");

        into_completion(parsed)
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn build_request(model: &str, request: &CompletionRequest) -> AnthropicRequest {
    AnthropicRequest {
        model: model.to_string(),
        max_tokens: request.max_output_tokens,
        messages: vec![AnthropicMessage {
            role: "user".to_string(),
            content: request.user.clone(),
        }],
        system: Some(request.system.clone()).filter(|s| !s.is_empty()),
        temperature: request.temperature,
    }
}

/// Error for a non-2xx reply. Bodies that are not Anthropic error JSON, such
/// as a proxy's HTML page, are reported as-is.
fn api_error(status: StatusCode, body: String) -> anyhow::Error {
    let message = serde_json::from_str::<AnthropicError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    anyhow::anyhow!("Anthropic API error ({}): {}", status, message)
}

fn into_completion(response: MessagesResponse) -> Result<Completion> {
    let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text),
            ResponseBlock::Other => None,
        })
        .collect();

    if text.trim().is_empty() {
        return Err(anyhow::anyhow!("AI response content is empty"));
    }

    Ok(Completion {
        text,
        truncated: response.stop_reason.as_deref() == Some("max_tokens"),
    })
}

// ============================================================================
// Anthropic API types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_moves_system_out_of_messages() {
        let request = CompletionRequest {
            system: "只返回JSON".to_string(),
            user: "内容".to_string(),
            max_output_tokens: 4096,
            temperature: 0.3,
            json_response: true,
        };
        let body = serde_json::to_value(build_request("claude", &request)).unwrap();
        assert_eq!(body["system"], "只返回JSON");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn test_text_blocks_are_joined() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"thinking","thinking":"..."},{"type":"text","text":"{\"a\":"},{"type":"text","text":"1}"}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        let completion = into_completion(response).unwrap();
        assert_eq!(completion.text, "{\"a\":1}");
        assert!(!completion.truncated);
    }

    #[test]
    fn test_max_tokens_marks_truncation() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"{\"a\": [1,"}],"stop_reason":"max_tokens"}"#,
        )
        .unwrap();
        assert!(into_completion(response).unwrap().truncated);
    }

    #[test]
    fn test_api_error_keeps_status() {
        let json = r#"{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}"#;
        let err = api_error(StatusCode::from_u16(529).unwrap(), json.to_string());
        let message = err.to_string();
        assert!(message.starts_with("Anthropic API error (529"), "{message}");
        assert!(message.ends_with("): Overloaded"), "{message}");

        let html = "<html><body>502 Bad Gateway</body></html>";
        let err = api_error(StatusCode::BAD_GATEWAY, html.to_string());
        assert_eq!(
            err.to_string(),
            format!("Anthropic API error (502 Bad Gateway): {html}")
        );
    }
}
