//! Verification step: judge the candidate fields against the OCR text.

use tracing::{info, warn};

use super::parse_json_object;
use super::prompts::verification_messages;
use crate::llm::{LlmGateway, LlmRequest};
use crate::models::state::{Confidence, FieldValue, ProcessingState};

const MISSING_REASON: &str = "No reason given by the verifier.";
const UNREADABLE_VERDICT: &str = "The verification response could not be interpreted.";

/// Confidence label plus the reason required for low-confidence labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub confidence: Confidence,
    pub reason: Option<String>,
}

/// Parse a verification response.
///
/// The label is read from `result` (or `confidence`). An unreadable
/// response is `UNSURE`, never an acceptance. `UNSURE` / `FALSE` always
/// carry a reason; accepted labels never do.
pub fn parse_verdict(content: &str) -> Verdict {
    let Some(value) = parse_json_object(content) else {
        return Verdict {
            confidence: Confidence::Unsure,
            reason: Some(UNREADABLE_VERDICT.to_string()),
        };
    };

    let label = value
        .get("result")
        .or_else(|| value.get("confidence"))
        .and_then(|v| v.as_str())
        .and_then(Confidence::parse);

    let Some(confidence) = label else {
        return Verdict {
            confidence: Confidence::Unsure,
            reason: Some(UNREADABLE_VERDICT.to_string()),
        };
    };

    if confidence.is_accepted() {
        return Verdict {
            confidence,
            reason: None,
        };
    }

    let reason = FieldValue::from_json(value.get("reason"))
        .value()
        .unwrap_or(MISSING_REASON)
        .to_string();

    Verdict {
        confidence,
        reason: Some(reason),
    }
}

/// Run one verification of `state.extracted_fields` and store the verdict.
///
/// Gateway failures are recorded in `state.error`; verification never
/// defaults to an accepting label.
pub async fn verify_main_info(llm: &dyn LlmGateway, state: &mut ProcessingState) {
    let fields = state.extracted_fields.clone().unwrap_or_default();
    let ocr_text = state.ocr_text.as_deref().unwrap_or_default();
    let request = LlmRequest::new("verify", verification_messages(&fields, ocr_text));

    match llm.generate(request).await {
        Ok(response) => {
            state
                .token_usage
                .record(response.tokens_input, response.tokens_output);
            let verdict = parse_verdict(&response.content);
            info!(
                document = state.document_reference(),
                attempt = state.attempts(),
                confidence = %verdict.confidence,
                reason = verdict.reason.as_deref().unwrap_or(""),
                "Verified main information"
            );
            state.confidence = Some(verdict.confidence);
            state.reason = verdict.reason;
        }
        Err(e) => {
            warn!(document = state.document_reference(), error = %e, "Verification call failed");
            state.fail(e.to_string());
        }
    }
}
