//! OpenAI-compatible chat-completions gateway (Azure OpenAI or plain OpenAI API).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LlmGateway, LlmRequest, LlmResponse, Message, Role};
use crate::error::LlmError;
use crate::models::config::{LlmConfig, LlmProvider};

/// Default OpenAI API base.
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// How the gateway authenticates.
#[derive(Debug, Clone)]
enum Auth {
    /// Azure `api-key` header.
    ApiKey(String),
    /// `Authorization: Bearer` header.
    Bearer(String),
}

/// Chat-completions gateway.
#[derive(Debug, Clone)]
pub struct ChatCompletionsGateway {
    client: reqwest::Client,
    url: String,
    auth: Auth,
    model: Option<String>,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl ChatCompletionsGateway {
    /// Build a gateway from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "API key not found in environment variable '{}'",
                config.api_key_env
            ))
        })?;

        Self::with_api_key(config, api_key)
    }

    /// Build a gateway from configuration with an explicit API key.
    pub fn with_api_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let url = completions_url(config)?;
        let (auth, model) = match config.provider {
            LlmProvider::Azure => (Auth::ApiKey(api_key), None),
            LlmProvider::Openai => {
                let model = config.model.clone().ok_or_else(|| {
                    LlmError::Misconfiguration(
                        "llm.model must be set for the openai provider".to_string(),
                    )
                })?;
                (Auth::Bearer(api_key), Some(model))
            }
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            auth,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn build_body(&self, request: &LlmRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: convert_messages(&request.messages, request.image_url.as_deref()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[async_trait]
impl LlmGateway for ChatCompletionsGateway {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        debug!(
            purpose = request.purpose,
            messages = request.messages.len(),
            with_image = request.image_url.is_some(),
            "Invoking chat completions"
        );

        let body = self.build_body(&request);
        let builder = self.client.post(&self.url).json(&body);
        let builder = match &self.auth {
            Auth::ApiKey(key) => builder.header("api-key", key),
            Auth::Bearer(key) => builder.bearer_auth(key),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout.as_secs())
            } else {
                LlmError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        let result = into_llm_response(parsed)?;

        debug!(
            purpose = request.purpose,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Chat completion finished"
        );

        Ok(result)
    }
}

fn completions_url(config: &LlmConfig) -> Result<String, LlmError> {
    match config.provider {
        LlmProvider::Azure => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                LlmError::Misconfiguration("llm.endpoint must be set for the azure provider".to_string())
            })?;
            let deployment = config.deployment.as_deref().ok_or_else(|| {
                LlmError::Misconfiguration("llm.deployment must be set for the azure provider".to_string())
            })?;
            Ok(format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                config.api_version
            ))
        }
        LlmProvider::Openai => {
            let base = config.endpoint.as_deref().unwrap_or(DEFAULT_OPENAI_BASE);
            Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
        }
    }
}

/// Map a non-success status to an error variant.
fn classify_status(status: u16, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth(body),
        429 => LlmError::RateLimited(body),
        400 if body.contains("content_filter") => LlmError::ContentFilter(body),
        _ => LlmError::Http { status, body },
    }
}

fn into_llm_response(parsed: ChatResponse) -> Result<LlmResponse, LlmError> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response missing choices[0]".to_string()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(LlmError::ContentFilter(
            "completion stopped by content filter".to_string(),
        ));
    }

    let content = choice
        .message
        .content
        .ok_or_else(|| LlmError::InvalidResponse("response missing content in choices[0]".to_string()))?;

    let mut result = LlmResponse::new(content);
    if let Some(usage) = parsed.usage {
        result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
    }
    Ok(result)
}

/// Convert messages to the wire format; the image becomes a trailing user message.
fn convert_messages(messages: &[Message], image_url: Option<&str>) -> Vec<ChatMessage> {
    let mut converted: Vec<ChatMessage> = messages
        .iter()
        .map(|msg| ChatMessage {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
            },
            content: ChatContent::Text(msg.content.clone()),
        })
        .collect();

    if let Some(url) = image_url {
        converted.push(ChatMessage {
            role: "user",
            content: ChatContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: url.to_string(),
                },
            }]),
        });
    }

    converted
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: ChatContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
