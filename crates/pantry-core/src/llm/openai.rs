//! OpenAI-compatible chat completions provider
//!
//! Uses reqwest against `{base_url}/chat/completions`, so it works with
//! OpenAI itself and with the many hosts that mirror its API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Completion, CompletionProvider, CompletionRequest};

/// OpenAI-compatible chat completions provider
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new provider with the given API key, model and base URL
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), api_key, model, base_url)
    }

    pub fn with_client(client: reqwest::Client, api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = build_request(&self.model, request);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAIError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(anyhow::anyhow!("OpenAI API error ({}): {}", status, message));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to decode chat completion response")?;
        debug!(model = %self.model, "Chat completion received");

        into_completion(parsed)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn build_request(model: &str, request: &CompletionRequest) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: request.system.clone(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: request.user.clone(),
            },
        ],
        response_format: request.json_response.then(|| ResponseFormat {
            r#type: "json_object".to_string(),
        }),
        temperature: request.temperature,
        max_tokens: request.max_output_tokens,
    }
}

fn into_completion(response: ChatResponse) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .context("Chat completion returned no choices")?;

    let text = choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .context("AI response content is empty")?;

    Ok(Completion {
        text,
        truncated: choice.finish_reason.as_deref() == Some("length"),
    })
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "sys".to_string(),
            user: "分析这个文件".to_string(),
            max_output_tokens: 8000,
            temperature: 0.3,
            json_response: true,
        }
    }

    #[test]
    fn test_build_request_shape() {
        let body = serde_json::to_value(build_request("m", &request())).unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "分析这个文件");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 8000);
    }

    #[test]
    fn test_build_request_without_json_hint() {
        let mut req = request();
        req.json_response = false;
        let body = serde_json::to_value(build_request("m", &req)).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_finish_reason_length_marks_truncation() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"{\"title\": \"红烧"},"finish_reason":"length"}]}"#,
        )
        .unwrap();
        let completion = into_completion(response).unwrap();
        assert!(completion.truncated);
        assert!(completion.text.starts_with('{'));
    }

    #[test]
    fn test_finish_reason_stop() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"{}"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert!(!into_completion(response).unwrap().truncated);
    }

    #[test]
    fn test_empty_content_is_an_error() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":null},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        let err = into_completion(response).unwrap_err();
        assert!(err.to_string().contains("empty"));

        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(into_completion(response).is_err());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let provider = OpenAIProvider::new("k", "m", "https://api.example.com/v1/");
        assert_eq!(
            provider.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }
}
