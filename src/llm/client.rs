//! HTTP chat client for OpenAI-compatible and DashScope endpoints

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::LlmConfig;
use crate::errors::DrugRagError;
use crate::errors::Result;
use crate::llm::ChatMessage;
use crate::llm::LanguageModel;
use crate::llm::LlmProvider;

const DASHSCOPE_GENERATION_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";

/// Chat client configured with model, temperature and output length
pub struct LlmClient {
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl LlmClient {
    /// Create a new LLM client
    ///
    /// # Errors
    /// - HTTP client build errors (invalid TLS or timeout configuration)
    pub fn new(
        provider: LlmProvider,
        endpoint: String,
        api_key: Option<String>,
        model: String,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DrugRagError::HttpError(e.to_string()))?;

        if api_key.is_none() {
            warn!("LLM client created without an API key; requests will likely be rejected");
        }

        Ok(Self {
            provider,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature,
            max_tokens,
            client,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.provider,
            config.endpoint.clone(),
            Some(config.api_key.clone()).filter(|k| !k.is_empty()),
            config.model.clone(),
            config.temperature,
            config.max_tokens,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn chat_openai(&self, messages: &[ChatMessage]) -> Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
            max_tokens: u32,
        }

        let url = format!("{}/chat/completions", self.endpoint);
        debug!("Calling chat completions API: {} ({} messages)", url, messages.len());

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await?;
        let body = Self::read_success_body(response).await?;
        parse_openai_reply(&body)
    }

    async fn chat_dashscope(&self, messages: &[ChatMessage]) -> Result<String> {
        #[derive(Serialize)]
        struct Input<'a> {
            messages: &'a [ChatMessage],
        }

        #[derive(Serialize)]
        struct Parameters {
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Serialize)]
        struct GenerationRequest<'a> {
            model: &'a str,
            input: Input<'a>,
            parameters: Parameters,
        }

        // the compatible-mode default does not serve the native protocol
        let url = if self.endpoint.is_empty() || self.endpoint.contains("compatible-mode") {
            DASHSCOPE_GENERATION_URL.to_string()
        } else {
            self.endpoint.clone()
        };
        debug!("Calling DashScope generation API: {}", url);

        let request = GenerationRequest {
            model: &self.model,
            input: Input { messages },
            parameters: Parameters {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
        };

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await?;
        let body = Self::read_success_body(response).await?;
        parse_dashscope_reply(&body)
    }

    async fn read_success_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if !status.is_success() {
            return Err(DrugRagError::LlmError(format!("API error ({status}): {body}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        // Some servers reject an empty message list
        let fallback = [ChatMessage::user("")];
        let messages = if messages.is_empty() {
            &fallback[..]
        } else {
            messages
        };

        match self.provider {
            LlmProvider::OpenaiCompatible => self.chat_openai(messages).await,
            LlmProvider::Dashscope => self.chat_dashscope(messages).await,
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract the first choice's content from a chat completions body
pub fn parse_openai_reply(body: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct ChatResponse {
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: ReplyMessage,
    }

    #[derive(Deserialize)]
    struct ReplyMessage {
        #[serde(default)]
        content: Option<String>,
    }

    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| DrugRagError::LlmError(format!("Failed to parse response: {e}")))?;

    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| DrugRagError::LlmError("No choices in response".to_string()))
}

/// Extract `output.text` (or the first choice) from a DashScope body
pub fn parse_dashscope_reply(body: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct GenerationResponse {
        output: Output,
    }

    #[derive(Deserialize)]
    struct Output {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: ChatMessage,
    }

    let response: GenerationResponse = serde_json::from_str(body)
        .map_err(|e| DrugRagError::LlmError(format!("Failed to parse response: {e}")))?;

    let Output { text, choices } = response.output;
    text.or_else(|| choices.into_iter().next().map(|c| c.message.content))
        .ok_or_else(|| DrugRagError::LlmError("No text in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_reply() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"[\"阿司匹林\"]"}}]}"#;
        assert_eq!(parse_openai_reply(body).unwrap(), r#"["阿司匹林"]"#);
    }

    #[test]
    fn test_parse_openai_reply_without_choices() {
        let err = parse_openai_reply(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, DrugRagError::LlmError(_)));
        assert!(parse_openai_reply("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn test_parse_dashscope_reply_text_and_choices() {
        let body = r#"{"output":{"text":"二甲双胍","finish_reason":"stop"},"request_id":"r"}"#;
        assert_eq!(parse_dashscope_reply(body).unwrap(), "二甲双胍");

        let body = r#"{"output":{"choices":[{"message":{"role":"assistant","content":"[]"}}]}}"#;
        assert_eq!(parse_dashscope_reply(body).unwrap(), "[]");
    }

    #[test]
    fn test_chat_message_serialization() {
        let json = serde_json::to_string(&ChatMessage::system("规则")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"规则"}"#);
    }

    #[tokio::test]
    #[ignore = "Requires DASHSCOPE_API_KEY"]
    async fn test_dashscope_compatible_completion() {
        let client = LlmClient::new(
            LlmProvider::OpenaiCompatible,
            "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            std::env::var("DASHSCOPE_API_KEY").ok(),
            "qwen-turbo".to_string(),
            0.0,
            64,
            Duration::from_secs(60),
        )
        .unwrap();

        let reply = client.complete("只回复: OK").await.unwrap();
        assert!(!reply.is_empty());
    }
}
