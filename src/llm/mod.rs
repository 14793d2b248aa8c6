//! LLM access: chat/completion client, prompt templates, output cleanup
//!
//! # Examples
//!
//! ```rust,no_run
//! use drugrag::config::AppConfig;
//! use drugrag::llm::{LanguageModel, LlmClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let client = LlmClient::from_config(&config.llm)?;
//!
//!     let answer = client.complete("患者有高血压和糖尿病，需要用药建议").await?;
//!     println!("{answer}");
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod prompts;
pub mod reasoning;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

pub use client::LlmClient;
pub use prompts::AdvicePrompts;
pub use prompts::PromptTemplate;
pub use reasoning::strip_reasoning;

use crate::errors::Result;

/// Supported LLM wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// `POST {endpoint}/chat/completions` (DashScope compatible mode, vLLM, Ollama)
    #[default]
    OpenaiCompatible,
    /// DashScope native text-generation API
    Dashscope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Text-in/text-out model capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send a conversation and return the assistant's reply
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Single-prompt completion
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(&[ChatMessage::user(prompt)]).await
    }

    fn model_name(&self) -> &str;
}
