//! Azure Document Intelligence `prebuilt-read` OCR gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::OcrGateway;
use crate::document::DocumentRef;
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// OCR gateway backed by Azure Document Intelligence.
#[derive(Debug, Clone)]
pub struct DocumentIntelligenceOcr {
    client: reqwest::Client,
    analyze_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl DocumentIntelligenceOcr {
    /// Build the gateway from configuration, reading the key from the
    /// configured environment variable.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            OcrError::Misconfiguration(format!(
                "API key not found in environment variable '{}'",
                config.api_key_env
            ))
        })?;

        Self::with_api_key(config, api_key)
    }

    /// Build the gateway with an explicit key.
    pub fn with_api_key(config: &OcrConfig, api_key: String) -> Result<Self, OcrError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| OcrError::Misconfiguration("ocr.endpoint must be set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OcrError::Misconfiguration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            analyze_url: analyze_url(endpoint, &config.model_id, &config.api_version),
            api_key,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
        })
    }

    /// Submit the document and return the operation URL to poll.
    async fn submit(&self, document: &DocumentRef) -> Result<String, OcrError> {
        let request = self
            .client
            .post(&self.analyze_url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key);

        let request = match document {
            DocumentRef::Url(url) => request.json(&serde_json::json!({ "urlSource": url.as_str() })),
            DocumentRef::Local(path) => {
                let bytes = tokio::fs::read(path).await?;
                request
                    .header("Content-Type", "application/octet-stream")
                    .body(bytes)
            }
        };

        let response = request.send().await.map_err(|e| OcrError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| OcrError::InvalidResponse("no Operation-Location in response".to_string()))
    }

    /// Poll the operation until it finishes.
    async fn poll(&self, operation_url: &str) -> Result<String, OcrError> {
        for attempt in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(operation_url)
                .header("Ocp-Apim-Subscription-Key", &self.api_key)
                .send()
                .await
                .map_err(|e| OcrError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(OcrError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            let operation: AnalyzeOperation = response
                .json()
                .await
                .map_err(|e| OcrError::InvalidResponse(e.to_string()))?;

            debug!(attempt, status = %operation.status, "Polled OCR operation");

            if let Some(text) = operation.into_text()? {
                return Ok(text);
            }
        }

        Err(OcrError::Timeout(self.max_polls))
    }
}

#[async_trait]
impl OcrGateway for DocumentIntelligenceOcr {
    async fn extract_text(&self, document: &DocumentRef) -> Result<String, OcrError> {
        info!(document = %document, "Performing OCR on the document");
        let operation_url = self.submit(document).await?;
        let text = self.poll(&operation_url).await?;
        debug!(document = %document, chars = text.len(), "OCR finished");
        Ok(text)
    }
}

fn analyze_url(endpoint: &str, model_id: &str, api_version: &str) -> String {
    format!(
        "{}/documentintelligence/documentModels/{}:analyze?api-version={}",
        endpoint.trim_end_matches('/'),
        model_id,
        api_version
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    analyze_result: Option<AnalyzeResult>,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
struct Line {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: Option<String>,
}

impl AnalyzeOperation {
    /// `Ok(Some(text))` when finished, `Ok(None)` while still running.
    fn into_text(self) -> Result<Option<String>, OcrError> {
        match self.status.as_str() {
            "succeeded" => {
                let result = self
                    .analyze_result
                    .ok_or_else(|| OcrError::InvalidResponse("no analyzeResult".to_string()))?;
                let mut text = String::new();
                for line in result.pages.iter().flat_map(|p| p.lines.iter()) {
                    text.push_str(&line.content);
                    text.push('\n');
                }
                Ok(Some(text))
            }
            "failed" => Err(OcrError::AnalysisFailed(
                self.error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "unknown error".to_string()),
            )),
            _ => Ok(None),
        }
    }
}
