//! Core library for invoice field extraction.
//!
//! This crate provides:
//! - OCR gateway (Azure Document Intelligence) behind the [`OcrGateway`] trait
//! - Language-model gateway (Azure OpenAI / OpenAI-compatible) behind [`LlmGateway`]
//! - Extraction and verification steps with a bounded retry controller
//! - A workflow orchestrator producing one [`OutputRecord`] per document

pub mod document;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod output;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use document::{DocumentImage, DocumentRef};
pub use error::{InvexError, Result};
pub use extraction::{Decision, RetryPolicy, Verdict};
pub use llm::{ChatCompletionsGateway, LlmGateway, LlmRequest, LlmResponse};
pub use models::config::InvexConfig;
pub use models::record::OutputRecord;
pub use models::state::{Confidence, FieldValue, MainInfo, ProcessingState, TokenUsage};
pub use ocr::{DocumentIntelligenceOcr, OcrGateway};
pub use output::RecordWriter;
pub use workflow::{next_stage, Pipeline, Stage};
