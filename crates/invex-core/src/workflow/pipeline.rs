//! Workflow orchestrator: OCR, then the extraction / verification loop.

use std::sync::Arc;

use tracing::{info, warn};

use super::{next_stage, Stage};
use crate::document::{DocumentImage, DocumentRef};
use crate::extraction::{extract_main_info, verify_main_info, RetryPolicy};
use crate::error::Result;
use crate::llm::{ChatCompletionsGateway, LlmGateway};
use crate::models::config::{InvexConfig, WorkflowConfig};
use crate::models::record::OutputRecord;
use crate::models::state::ProcessingState;
use crate::ocr::{DocumentIntelligenceOcr, OcrGateway};

/// Extraction pipeline for one document at a time.
///
/// Holds no per-document state, so a single pipeline can serve many
/// documents concurrently.
#[derive(Clone)]
pub struct Pipeline {
    ocr: Arc<dyn OcrGateway>,
    llm: Arc<dyn LlmGateway>,
    policy: RetryPolicy,
    attach_image: bool,
}

impl Pipeline {
    /// Create a pipeline with the default retry budget and no image attachment.
    pub fn new(ocr: Arc<dyn OcrGateway>, llm: Arc<dyn LlmGateway>) -> Self {
        Self {
            ocr,
            llm,
            policy: RetryPolicy::default(),
            attach_image: false,
        }
    }

    /// Create a pipeline from workflow configuration.
    pub fn from_config(config: &WorkflowConfig, ocr: Arc<dyn OcrGateway>, llm: Arc<dyn LlmGateway>) -> Self {
        Self::new(ocr, llm)
            .with_max_retries(config.max_retries)
            .with_image_attachment(config.attach_image)
    }

    /// Create a pipeline with the HTTP gateways described by `config`.
    ///
    /// API keys are read from the environment variables the config names.
    pub fn connect(config: &InvexConfig) -> Result<Self> {
        let ocr = DocumentIntelligenceOcr::from_config(&config.ocr)?;
        let llm = ChatCompletionsGateway::from_config(&config.llm)?;
        Ok(Self::from_config(&config.workflow, Arc::new(ocr), Arc::new(llm)))
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.policy = RetryPolicy::new(max_retries);
        self
    }

    /// Attach the document image to extraction prompts.
    pub fn with_image_attachment(mut self, attach: bool) -> Self {
        self.attach_image = attach;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the whole workflow for a document and return its final state.
    ///
    /// Never fails: every problem ends up in `state.error`.
    pub async fn process(&self, reference: &str) -> ProcessingState {
        let mut state = ProcessingState::new(reference);

        let document = match DocumentRef::parse(reference) {
            Ok(document) => document,
            Err(e) => {
                warn!(document = reference, error = %e, "Rejected document reference");
                state.fail(e.to_string());
                return state;
            }
        };

        info!(document = %document, "Processing document");

        match self.ocr.extract_text(&document).await {
            Ok(text) => state.ocr_text = Some(text),
            Err(e) => {
                warn!(document = %document, error = %e, "OCR failed");
                state.fail(e.to_string());
                return state;
            }
        }

        // Documents that are not attachable images fall back to text-only prompts
        let image = if self.attach_image {
            match DocumentImage::load(&document) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!(document = %document, error = %e, "Extracting without document image");
                    None
                }
            }
        } else {
            None
        };

        let mut stage = Stage::OcrDone;
        loop {
            match stage {
                Stage::OcrDone | Stage::Retrying => {
                    extract_main_info(self.llm.as_ref(), &mut state, image.as_ref()).await
                }
                Stage::Extracted => verify_main_info(self.llm.as_ref(), &mut state).await,
                Stage::VerifiedTerminal | Stage::Failed => break,
            }

            stage = next_stage(stage, &state, &self.policy);
            if stage == Stage::Retrying {
                self.policy.begin_retry(&mut state);
            }
        }

        info!(
            document = %document,
            stage = ?stage,
            confidence = ?state.confidence,
            retries = state.retry_count,
            input_tokens = state.token_usage.input_tokens,
            output_tokens = state.token_usage.output_tokens,
            "Finished document"
        );

        state
    }

    /// Run the workflow and materialize the output record.
    pub async fn run(&self, reference: &str) -> OutputRecord {
        OutputRecord::from_state(&self.process(reference).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{LlmRequest, LlmResponse};
    use crate::models::state::{Confidence, FieldValue, MainInfo};
    use crate::testing::{FnLlm, Reply, ScriptedLlm, ScriptedOcr};
    use pretty_assertions::assert_eq;

    const CLEAR_INVOICE: &str = "Invoice No. 12345, Supplier: Acme Corp, Date: 2024-01-01";
    const FULL_FIELDS: &str =
        r#"{"supplier": "Acme Corp", "invoice_number": "12345", "invoice_date": "2024-01-01", "error": "null"}"#;
    const EMPTY_FIELDS: &str =
        r#"{"supplier": "null", "invoice_number": "null", "invoice_date": "null", "error": "Nothing found."}"#;
    const UNSURE: &str = r#"{"result": "UNSURE", "reason": "No fields could be found."}"#;

    fn pipeline(ocr: Arc<ScriptedOcr>, llm: Arc<ScriptedLlm>, max_retries: u32) -> Pipeline {
        Pipeline::new(ocr, llm).with_max_retries(max_retries)
    }

    #[tokio::test]
    async fn test_clear_invoice_verified_in_one_round() {
        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::tokens(FULL_FIELDS, 100, 30),
            Reply::tokens(r#"{"result": "VERIFIED", "reason": "null"}"#, 80, 10),
        ]));

        let state = pipeline(ocr.clone(), llm.clone(), 2).process("input_data/invoice.png").await;

        assert_eq!(ocr.calls(), 1);
        assert_eq!(llm.extraction_calls(), 1);
        assert_eq!(llm.count("verify"), 1);
        assert_eq!(state.confidence, Some(Confidence::Verified));
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.token_usage.input_tokens, 180);
        assert_eq!(state.token_usage.output_tokens, 40);

        let record = OutputRecord::from_state(&state);
        assert_eq!(record.supplier, Some(FieldValue::Found("Acme Corp".into())));
        assert_eq!(record.invoice_number, Some(FieldValue::Found("12345".into())));
        assert_eq!(record.invoice_date, Some(FieldValue::Found("2024-01-01".into())));
        assert_eq!(record.reason, None);
        assert_eq!(record.error, None);
    }

    #[tokio::test]
    async fn test_empty_ocr_text_exhausts_retries_without_error() {
        let ocr = Arc::new(ScriptedOcr::text(""));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::text(EMPTY_FIELDS),
            Reply::text(UNSURE),
            Reply::text(EMPTY_FIELDS),
            Reply::text(r#"{"result": "FALSE", "reason": "Still nothing."}"#),
            Reply::text(EMPTY_FIELDS),
            Reply::text(UNSURE),
        ]));

        let state = pipeline(ocr, llm.clone(), 2).process("input_data/blank.png").await;

        assert_eq!(state.retry_count, 2);
        assert_eq!(llm.count("extract"), 1);
        assert_eq!(llm.count("retry"), 2);
        assert_eq!(llm.count("verify"), 3);

        let record = OutputRecord::from_state(&state);
        assert_eq!(record.error, None);
        assert_eq!(record.confidence, Some(Confidence::Unsure));
        assert_eq!(record.reason.as_deref(), Some("No fields could be found."));
        assert_eq!(record.supplier, Some(FieldValue::NotFound));
        assert_eq!(record.ocr_text.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_retry_succeeds_and_stops_extracting() {
        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::text(r#"{"supplier": "Acme Corp"}"#),
            Reply::text(r#"{"result": "FALSE", "reason": "Invoice number missing."}"#),
            Reply::text(FULL_FIELDS),
            Reply::text(r#"{"result": "CERTAIN", "reason": "null"}"#),
            Reply::text(FULL_FIELDS),
        ]));

        let state = pipeline(ocr, llm.clone(), 2).process("input_data/invoice.png").await;

        assert_eq!(state.confidence, Some(Confidence::Certain));
        assert_eq!(state.retry_count, 1);
        assert_eq!(llm.extraction_calls(), 2);
        assert_eq!(llm.count("verify"), 2);

        let requests = llm.requests();
        assert!(requests[2].messages[1].content.contains("Invoice number missing."));
    }

    #[tokio::test]
    async fn test_ocr_failure_skips_language_model() {
        let ocr = Arc::new(ScriptedOcr::failing("service unavailable"));
        let llm = Arc::new(ScriptedLlm::new(vec![Reply::text(FULL_FIELDS)]));

        let record = pipeline(ocr.clone(), llm.clone(), 2)
            .run("https://example.com/invoice.png")
            .await;

        assert_eq!(ocr.calls(), 1);
        assert!(llm.requests().is_empty());
        assert_eq!(record.ocr_text, None);
        assert_eq!(record.confidence, None);
        assert_eq!(
            record.error.as_deref(),
            Some("OCR analysis failed: service unavailable")
        );
    }

    #[tokio::test]
    async fn test_first_extraction_failure_skips_verification() {
        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![Reply::error(LlmError::Auth(
            "invalid key".into(),
        ))]));

        let record = pipeline(ocr, llm.clone(), 2).run("input_data/invoice.png").await;

        assert_eq!(llm.count("verify"), 0);
        assert_eq!(record.confidence, None);
        assert_eq!(record.error.as_deref(), Some("LLM authentication failed: invalid key"));
    }

    #[tokio::test]
    async fn test_verification_failure_during_retry_is_terminal() {
        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::text(FULL_FIELDS),
            Reply::text(UNSURE),
            Reply::text(FULL_FIELDS),
            Reply::error(LlmError::Timeout(120)),
        ]));

        let state = pipeline(ocr, llm.clone(), 2).process("input_data/invoice.png").await;
        let record = OutputRecord::from_state(&state);

        assert_eq!(state.retry_count, 1);
        assert_eq!(llm.extraction_calls(), llm.count("verify"));
        assert!(record.is_error());
        assert_eq!(record.confidence, None);
    }

    #[tokio::test]
    async fn test_missing_reference_invokes_nothing() {
        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![]));

        let record = pipeline(ocr.clone(), llm.clone(), 2).run("").await;

        assert_eq!(ocr.calls(), 0);
        assert!(llm.requests().is_empty());
        assert_eq!(record.error.as_deref(), Some("Document path is missing"));
    }

    #[tokio::test]
    async fn test_unreadable_image_falls_back_to_text_only() {
        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::text(FULL_FIELDS),
            Reply::text(r#"{"result": "VERIFIED"}"#),
        ]));

        let record = pipeline(ocr, llm.clone(), 2)
            .with_image_attachment(true)
            .run("/nonexistent/dir/invoice.png")
            .await;

        assert_eq!(llm.requests()[0].image_url, None);
        assert_eq!(record.error, None);
        assert_eq!(record.confidence, Some(Confidence::Verified));
    }

    #[tokio::test]
    async fn test_pdf_document_is_extracted_without_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        std::fs::write(&path, b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\n").unwrap();
        let reference = path.display().to_string();

        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::text(FULL_FIELDS),
            Reply::text(r#"{"result": "CERTAIN"}"#),
        ]));
        let pipeline = Pipeline::from_config(&WorkflowConfig::default(), ocr.clone(), llm.clone());

        let record = pipeline.run(&reference).await;

        assert_eq!(ocr.calls(), 1);
        assert_eq!(llm.extraction_calls(), 1);
        assert_eq!(llm.count("verify"), 1);
        assert_eq!(llm.requests()[0].image_url, None);
        assert_eq!(record.error, None);
        assert_eq!(record.confidence, Some(Confidence::Certain));
        assert_eq!(record.invoice_number, Some(FieldValue::Found("12345".into())));
    }

    #[tokio::test]
    async fn test_false_verdict_with_no_retry_budget_is_emitted() {
        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::text(FULL_FIELDS),
            Reply::text(r#"{"result": "FALSE", "reason": "Date belongs to the delivery note."}"#),
            Reply::text(FULL_FIELDS),
            Reply::text(r#"{"result": "FALSE", "reason": "Still wrong."}"#),
        ]));

        let state = pipeline(ocr.clone(), llm.clone(), 0).process("input_data/invoice.png").await;
        let record = OutputRecord::from_state(&state);

        assert_eq!(ocr.calls(), 1);
        assert_eq!(llm.extraction_calls(), 1);
        assert_eq!(llm.count("retry"), 0);
        assert_eq!(llm.count("verify"), 1);
        assert_eq!(state.retry_count, 0);
        assert_eq!(record.error, None);
        assert_eq!(record.confidence, Some(Confidence::False));
        assert_eq!(record.reason.as_deref(), Some("Date belongs to the delivery note."));
        assert_eq!(record.supplier, Some(FieldValue::Found("Acme Corp".into())));
    }

    #[tokio::test]
    async fn test_url_image_is_attached_to_extraction_only() {
        let ocr = Arc::new(ScriptedOcr::text(CLEAR_INVOICE));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Reply::text(FULL_FIELDS),
            Reply::text(r#"{"result": "VERIFIED"}"#),
        ]));

        pipeline(ocr, llm.clone(), 2)
            .with_image_attachment(true)
            .run("https://example.com/invoice.png")
            .await;

        let requests = llm.requests();
        assert_eq!(requests[0].image_url.as_deref(), Some("https://example.com/invoice.png"));
        assert_eq!(requests[1].image_url, None);
    }

    #[tokio::test]
    async fn test_deterministic_gateways_give_identical_records() {
        let script = || {
            vec![
                Reply::text(r#"{"supplier": "Acme Corp"}"#),
                Reply::text(UNSURE),
                Reply::text(FULL_FIELDS),
                Reply::text(r#"{"result": "VERIFIED"}"#),
            ]
        };

        let first = pipeline(
            Arc::new(ScriptedOcr::text(CLEAR_INVOICE)),
            Arc::new(ScriptedLlm::new(script())),
            2,
        )
        .run("input_data/invoice.png")
        .await;
        let second = pipeline(
            Arc::new(ScriptedOcr::text(CLEAR_INVOICE)),
            Arc::new(ScriptedLlm::new(script())),
            2,
        )
        .run("input_data/invoice.png")
        .await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_documents_keep_isolated_state() {
        let ocr = Arc::new(
            ScriptedOcr::text("")
                .with_document("a.png", "Supplier: Acme Corp")
                .with_document("b.png", "Supplier: Globex"),
        );
        let llm = Arc::new(FnLlm(|request: &LlmRequest| -> std::result::Result<LlmResponse, LlmError> {
            let prompt = &request.messages[1].content;
            let content = match request.purpose {
                "verify" if prompt.contains("supplier: null") => UNSURE.to_string(),
                "verify" => r#"{"result": "VERIFIED"}"#.to_string(),
                _ if prompt.contains("Acme Corp") => r#"{"supplier": "Acme Corp"}"#.to_string(),
                _ if prompt.contains("Globex") => r#"{"supplier": "Globex"}"#.to_string(),
                _ => EMPTY_FIELDS.to_string(),
            };
            Ok(LlmResponse::new(content).with_tokens(10, 1))
        }));
        let pipeline = Pipeline::new(ocr.clone(), llm).with_max_retries(1);

        let (a, b, c) = tokio::join!(
            pipeline.process("a.png"),
            pipeline.process("b.png"),
            pipeline.process("c.png"),
        );

        assert_eq!(ocr.calls(), 3);
        assert_eq!(a.extracted_fields.unwrap().supplier, FieldValue::Found("Acme Corp".into()));
        assert_eq!(b.extracted_fields.unwrap().supplier, FieldValue::Found("Globex".into()));
        assert_eq!(a.retry_count, 0);
        assert_eq!(a.token_usage.input_tokens, 20);
        assert_eq!(c.retry_count, 1);
        assert_eq!(c.confidence, Some(Confidence::Unsure));
        assert_eq!(c.extracted_fields, Some(MainInfo::not_found()));
        assert_eq!(c.token_usage.input_tokens, 40);
    }

    #[test]
    fn test_connect_requires_api_keys() {
        let mut config = InvexConfig::default();
        config.ocr.endpoint = Some("https://docint.example.com".into());
        config.ocr.api_key_env = "INVEX_TEST_UNSET_OCR_KEY".into();

        let result = Pipeline::connect(&config);

        assert!(matches!(
            result,
            Err(crate::error::InvexError::Ocr(crate::error::OcrError::Misconfiguration(_)))
        ));
    }
}
