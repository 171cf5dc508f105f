//! Chat-completion provider abstraction for metadata extraction
//!
//! This module provides a unified interface for the remote LLM backends:
//! - OpenAI-compatible chat completions (OpenAI, DeepSeek, SiliconFlow, ...)
//! - Anthropic Messages API

pub mod anthropic;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;

/// System instruction sent with every extraction request.
pub const SYSTEM_PROMPT: &str = "你是一个专业的内容分析助手，擅长分析和归纳各种类型的内容。请确保你的回答是有效的JSON格式，不要添加任何额外的解释文字。";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "deepseek-ai/DeepSeek-R1-0528";

/// One extraction request: a system instruction plus the rendered prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Ask the provider for a JSON object reply when it supports the hint
    pub json_response: bool,
}

/// Raw reply text from the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    /// The output-token budget ran out before the model finished
    pub truncated: bool,
}

/// Unified completion provider interface
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run a single non-streaming completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Get the provider name (e.g., "openai", "anthropic")
    fn provider_name(&self) -> &'static str;

    /// Get the model identifier
    fn model_id(&self) -> &str;
}

/// Provider configuration stored in settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Any OpenAI-compatible chat-completions endpoint
    #[serde(rename = "openai")]
    OpenAI {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    /// Anthropic API
    Anthropic { api_key: String, model: String },
}

impl ProviderConfig {
    /// Build an OpenAI-compatible config from `OPENAI_API_KEY`,
    /// `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        Some(ProviderConfig::OpenAI {
            api_key,
            model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: std::env::var("OPENAI_BASE_URL").ok(),
        })
    }

    /// Get the provider type name
    pub fn provider_type(&self) -> &'static str {
        match self {
            ProviderConfig::OpenAI { .. } => "openai",
            ProviderConfig::Anthropic { .. } => "anthropic",
        }
    }

    /// Get the model ID
    pub fn model_id(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { model, .. } => model,
            ProviderConfig::Anthropic { model, .. } => model,
        }
    }

    /// Instantiate the provider. `timeout` bounds each HTTP request.
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn CompletionProvider>> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(match self {
            ProviderConfig::OpenAI {
                api_key,
                model,
                base_url,
            } => Arc::new(OpenAIProvider::with_client(
                client,
                api_key,
                model,
                base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL),
            )),
            ProviderConfig::Anthropic { api_key, model } => {
                Arc::new(AnthropicProvider::with_client(client, api_key, model))
            }
        })
    }
}
