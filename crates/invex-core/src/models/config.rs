//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the invex pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvexConfig {
    /// Language-model gateway configuration.
    pub llm: LlmConfig,

    /// OCR gateway configuration.
    pub ocr: OcrConfig,

    /// Extraction workflow configuration.
    pub workflow: WorkflowConfig,

    /// Output configuration.
    pub output: OutputConfig,
}

/// Flavor of chat-completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Azure OpenAI deployment (`api-key` header, `api-version` query).
    Azure,
    /// OpenAI-compatible endpoint with bearer authentication.
    Openai,
}

/// Language-model gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Endpoint flavor.
    pub provider: LlmProvider,

    /// Base endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: Option<String>,

    /// Azure deployment name.
    pub deployment: Option<String>,

    /// Model name (OpenAI-compatible endpoints).
    pub model: Option<String>,

    /// Azure API version.
    pub api_version: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum completion tokens per call.
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Azure,
            endpoint: None,
            deployment: None,
            model: None,
            api_version: "2024-10-21".to_string(),
            api_key_env: "AZURE_OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

/// OCR gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Document Intelligence endpoint.
    pub endpoint: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Analysis model.
    pub model_id: String,

    /// Document Intelligence API version.
    pub api_version: String,

    /// Delay between result polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Maximum number of result polls.
    pub max_polls: u32,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "API_KEY_DOCINT".to_string(),
            model_id: "prebuilt-read".to_string(),
            api_version: "2024-11-30".to_string(),
            poll_interval_ms: 2000,
            max_polls: 60,
            timeout_secs: 120,
        }
    }
}

/// Extraction workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum number of extraction re-attempts per document.
    pub max_retries: u32,

    /// Attach the document image to extraction prompts.
    pub attach_image: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            attach_image: true,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one JSON record per document.
    pub output_dir: PathBuf,

    /// Pretty-print records.
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output_data"),
            pretty: false,
        }
    }
}

impl InvexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: InvexConfig =
            serde_json::from_str(r#"{"workflow": {"max_retries": 1}, "llm": {"provider": "openai"}}"#)
                .unwrap();

        assert_eq!(config.workflow.max_retries, 1);
        assert!(config.workflow.attach_image);
        assert_eq!(config.llm.provider, LlmProvider::Openai);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.ocr.model_id, "prebuilt-read");
        assert_eq!(config.output.output_dir, PathBuf::from("output_data"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = InvexConfig::default();
        config.llm.deployment = Some("gpt-4o".to_string());
        config.save(&path).unwrap();

        let loaded = InvexConfig::from_file(&path).unwrap();
        assert_eq!(loaded.llm.deployment.as_deref(), Some("gpt-4o"));
        assert_eq!(loaded.workflow.max_retries, 2);
    }
}
