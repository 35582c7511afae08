//! Language-model gateway abstraction.

mod openai;

pub use openai::ChatCompletionsGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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
}

/// Input to one language-model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    /// Short label for logs (`extract`, `retry`, `verify`).
    pub purpose: &'static str,

    /// Ordered conversation.
    pub messages: Vec<Message>,

    /// Image URL (remote or `data:`) sent as an extra user message.
    pub image_url: Option<String>,
}

impl LlmRequest {
    pub fn new(purpose: &'static str, messages: Vec<Message>) -> Self {
        Self {
            purpose,
            messages,
            image_url: None,
        }
    }

    /// Attach an image to the request.
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// Result of one language-model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Raw response text.
    pub content: String,

    /// Prompt tokens, when reported.
    pub tokens_input: Option<u64>,

    /// Completion tokens, when reported.
    pub tokens_output: Option<u64>,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }

    /// Set token counts.
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }
}

/// Text-generation capability used by the extraction and verification steps.
///
/// Implementations own their timeout and resilience policy; the workflow
/// treats every returned error as terminal for the document.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Send a prompt and return the model's response.
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}
