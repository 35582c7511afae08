//! Final per-document output record.

use serde::{Deserialize, Serialize};

use super::state::{Confidence, FieldValue, ProcessingState};

/// One JSON object emitted per processed document.
///
/// A record carries either a confidence label (with the extracted fields) or
/// an error, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// OCR text, absent when OCR never produced any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<FieldValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<FieldValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<FieldValue>,

    /// Final confidence label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,

    /// Reason for a low-confidence label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Terminal gateway or document error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputRecord {
    /// Keys a record may omit; stale copies are dropped when merging into an existing file.
    pub const OPTIONAL_KEYS: [&'static str; 7] = [
        "ocr_text",
        "supplier",
        "invoice_number",
        "invoice_date",
        "confidence",
        "reason",
        "error",
    ];

    /// Build the record for a finished state.
    pub fn from_state(state: &ProcessingState) -> Self {
        if let Some(error) = &state.error {
            return Self {
                ocr_text: state.ocr_text.clone(),
                supplier: None,
                invoice_number: None,
                invoice_date: None,
                confidence: None,
                reason: None,
                error: Some(error.clone()),
            };
        }

        let fields = state.extracted_fields.clone().unwrap_or_default();
        let reason = match state.confidence {
            Some(c) if c.is_accepted() => None,
            _ => state.reason.clone(),
        };

        Self {
            ocr_text: state.ocr_text.clone(),
            supplier: Some(fields.supplier),
            invoice_number: Some(fields.invoice_number),
            invoice_date: Some(fields.invoice_date),
            confidence: state.confidence,
            reason,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<&ProcessingState> for OutputRecord {
    fn from(state: &ProcessingState) -> Self {
        Self::from_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::MainInfo;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_low_confidence_record_keeps_fields_and_reason() {
        let mut state = ProcessingState::new("input_data/a.png");
        state.ocr_text = Some(String::new());
        state.extracted_fields = Some(MainInfo::not_found());
        state.confidence = Some(Confidence::Unsure);
        state.reason = Some("No supplier found.".into());

        let record = OutputRecord::from_state(&state);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "ocr_text": "",
                "supplier": "null",
                "invoice_number": "null",
                "invoice_date": "null",
                "confidence": "UNSURE",
                "reason": "No supplier found."
            })
        );
    }

    #[test]
    fn test_error_record_omits_confidence_and_fields() {
        let mut state = ProcessingState::new("https://example.com/a.png");
        state.ocr_text = Some("text".into());
        state.extracted_fields = Some(MainInfo::not_found());
        state.confidence = Some(Confidence::False);
        state.reason = Some("wrong".into());
        state.fail("LLM transport failure: connection reset");

        let record = OutputRecord::from_state(&state);
        assert!(record.is_error());
        assert_eq!(record.confidence, None);
        assert_eq!(record.supplier, None);
        assert_eq!(record.reason, None);
        assert_eq!(record.ocr_text.as_deref(), Some("text"));
    }

    #[test]
    fn test_accepted_record_drops_reason() {
        let mut state = ProcessingState::new("a.png");
        state.ocr_text = Some("Invoice".into());
        state.extracted_fields = Some(MainInfo::not_found());
        state.confidence = Some(Confidence::Certain);
        state.reason = Some("leftover".into());

        let record = OutputRecord::from_state(&state);
        assert_eq!(record.reason, None);
        assert_eq!(record.confidence, Some(Confidence::Certain));
    }
}
