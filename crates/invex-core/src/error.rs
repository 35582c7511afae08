//! Error types for the invex-core library.

use thiserror::Error;

/// Main error type for the invex library.
#[derive(Error, Debug)]
pub enum InvexError {
    /// OCR gateway error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Language-model gateway error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Document reference or image error.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// Output persistence error.
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised by the OCR gateway.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Gateway is not configured (missing endpoint or key).
    #[error("OCR gateway misconfigured: {0}")]
    Misconfiguration(String),

    /// Network-level failure talking to the OCR service.
    #[error("OCR transport failure: {0}")]
    Transport(String),

    /// The service rejected the request.
    #[error("OCR request failed ({status}): {body}")]
    Http { status: u16, body: String },

    /// The analysis finished with a failure status.
    #[error("OCR analysis failed: {0}")]
    AnalysisFailed(String),

    /// The poll budget ran out before the analysis finished.
    #[error("OCR timed out after {0} polls")]
    Timeout(u32),

    /// The service answered with something we could not read.
    #[error("invalid OCR response: {0}")]
    InvalidResponse(String),

    /// Failed to read a local document.
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the language-model gateway.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Gateway is not configured (missing endpoint, deployment or key).
    #[error("LLM gateway misconfigured: {0}")]
    Misconfiguration(String),

    /// Network-level failure.
    #[error("LLM transport failure: {0}")]
    Transport(String),

    /// The request did not complete in time.
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    /// Credentials were rejected.
    #[error("LLM authentication failed: {0}")]
    Auth(String),

    /// Quota or rate limit hit.
    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    /// The provider refused the prompt or the completion on content grounds.
    #[error("LLM content filter triggered: {0}")]
    ContentFilter(String),

    /// Any other non-success status.
    #[error("LLM request failed ({status}): {body}")]
    Http { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// Errors related to document references and images.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The reference is empty.
    #[error("Document path is missing")]
    MissingReference,

    /// The image format cannot be attached to a prompt.
    #[error("unsupported image format for {reference}: {format}")]
    UnsupportedFormat { reference: String, format: String },

    /// The image could not be read.
    #[error("failed to read image {reference}: {source}")]
    Read {
        reference: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to writing output records.
#[derive(Error, Debug)]
pub enum OutputError {
    /// Failed to serialize the record.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Failed to write the record file.
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for the invex library.
pub type Result<T> = std::result::Result<T, InvexError>;
