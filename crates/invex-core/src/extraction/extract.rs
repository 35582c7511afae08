//! Extraction step: OCR text (and a prior failure reason) in, candidate fields out.

use tracing::{debug, info, warn};

use super::parse_json_object;
use super::prompts::{extraction_messages, retry_messages};
use crate::document::DocumentImage;
use crate::error::LlmError;
use crate::llm::{LlmGateway, LlmRequest};
use crate::models::state::{FieldValue, MainInfo, ProcessingState};

/// Note recorded when the provider refuses the extraction prompt.
pub const CONTENT_FILTER_NOTE: &str = "Content filter error";

/// Parse an extraction response into fields plus the model's own note.
///
/// Unparseable responses and malformed fields become "not found".
pub fn parse_main_info(content: &str) -> (MainInfo, Option<String>) {
    match parse_json_object(content) {
        Some(value) => {
            let note = FieldValue::from_json(value.get("error"))
                .value()
                .map(str::to_string);
            (MainInfo::from_json(&value), note)
        }
        None => {
            warn!(chars = content.len(), "Extraction response is not a JSON object");
            (MainInfo::not_found(), None)
        }
    }
}

/// Run one extraction attempt and store the result on `state`.
///
/// The first attempt uses the base prompt; later attempts use the
/// corrective prompt carrying the previous fields and verification reason.
/// Gateway failures are recorded in `state.error`; a content-filter refusal
/// yields all fields as not found instead.
pub async fn extract_main_info(
    llm: &dyn LlmGateway,
    state: &mut ProcessingState,
    image: Option<&DocumentImage>,
) {
    let ocr_text = state.ocr_text.as_deref().unwrap_or_default();

    let request = if state.retry_count > 0 {
        let previous = state.extracted_fields.clone().unwrap_or_default();
        let reason = state.reason.as_deref().unwrap_or("no reason given");
        LlmRequest::new("retry", retry_messages(&previous, reason, ocr_text))
    } else {
        LlmRequest::new("extract", extraction_messages(ocr_text))
    };
    let request = match image {
        Some(image) => request.with_image(image.url.clone()),
        None => request,
    };

    // Verdict of the previous attempt no longer applies.
    state.confidence = None;
    state.reason = None;

    match llm.generate(request).await {
        Ok(response) => {
            state
                .token_usage
                .record(response.tokens_input, response.tokens_output);
            let (fields, note) = parse_main_info(&response.content);
            info!(
                document = state.document_reference(),
                attempt = state.attempts(),
                found = fields.found_count(),
                "Extracted main information"
            );
            if let Some(note) = &note {
                debug!(document = state.document_reference(), note = %note, "Extraction note");
            }
            state.extracted_fields = Some(fields);
            state.extraction_note = note;
        }
        Err(LlmError::ContentFilter(detail)) => {
            warn!(
                document = state.document_reference(),
                detail = %detail,
                "Content filter error during extraction"
            );
            state.extracted_fields = Some(MainInfo::not_found());
            state.extraction_note = Some(CONTENT_FILTER_NOTE.to_string());
        }
        Err(e) => {
            warn!(document = state.document_reference(), error = %e, "Extraction call failed");
            state.fail(e.to_string());
        }
    }
}
