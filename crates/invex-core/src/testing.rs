//! In-memory gateways for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::document::DocumentRef;
use crate::error::{LlmError, OcrError};
use crate::llm::{LlmGateway, LlmRequest, LlmResponse};
use crate::ocr::OcrGateway;

/// One scripted language-model reply.
pub(crate) enum Reply {
    Ok(LlmResponse),
    Err(LlmError),
}

impl Reply {
    pub(crate) fn text(content: &str) -> Self {
        Self::Ok(LlmResponse::new(content))
    }

    pub(crate) fn tokens(content: &str, input: u64, output: u64) -> Self {
        Self::Ok(LlmResponse::new(content).with_tokens(input, output))
    }

    pub(crate) fn error(error: LlmError) -> Self {
        Self::Err(error)
    }
}

/// Language-model gateway answering from a fixed queue and recording requests.
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, purpose: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.purpose == purpose)
            .count()
    }

    /// Extraction calls, first attempts and retries alike.
    pub(crate) fn extraction_calls(&self) -> usize {
        self.count("extract") + self.count("retry")
    }
}

#[async_trait]
impl LlmGateway for ScriptedLlm {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Ok(response)) => Ok(response),
            Some(Reply::Err(error)) => Err(error),
            None => Err(LlmError::Transport("no scripted reply left".to_string())),
        }
    }
}

/// Language-model gateway computing each reply from the request.
pub(crate) struct FnLlm<F>(pub(crate) F);

#[async_trait]
impl<F> LlmGateway for FnLlm<F>
where
    F: Fn(&LlmRequest) -> Result<LlmResponse, LlmError> + Send + Sync,
{
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        (self.0)(&request)
    }
}

/// OCR gateway returning canned text per document reference.
pub(crate) struct ScriptedOcr {
    default: Result<String, String>,
    by_document: HashMap<String, String>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    pub(crate) fn text(text: &str) -> Self {
        Self {
            default: Ok(text.to_string()),
            by_document: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            default: Err(message.to_string()),
            by_document: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_document(mut self, reference: &str, text: &str) -> Self {
        self.by_document.insert(reference.to_string(), text.to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrGateway for ScriptedOcr {
    async fn extract_text(&self, document: &DocumentRef) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(text) = self.by_document.get(&document.to_string()) {
            return Ok(text.clone());
        }
        self.default
            .clone()
            .map_err(OcrError::AnalysisFailed)
    }
}
