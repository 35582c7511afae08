//! Prompt templates for extraction, retry and verification.
//!
//! Every builder is a pure function of its arguments.

use crate::llm::Message;
use crate::models::state::MainInfo;

/// JSON shape expected from extraction calls.
pub const MAIN_INFO_FORMAT: &str = r#"Respond with a single JSON object with exactly these keys:
{
  "supplier": "The supplier's company name, or null if you cannot find any supplier. Do not write anything else than the supplier company name or null.",
  "invoice_number": "The invoice number, or null if you cannot find any invoice number. Do not write anything else than the invoice number or null.",
  "invoice_date": "The invoice date, or null if you cannot find any invoice date. Do not write the due date. Do not write anything else than the invoice date or null.",
  "error": "A short explanation of why the extraction failed, e.g. 'No supplier found.' Be short and concise."
}"#;

/// JSON shape expected from verification calls.
pub const VERIFY_FORMAT: &str = r#"Respond with a single JSON object with exactly these keys:
{
  "result": "One of the following options: VERIFIED, CERTAIN, UNSURE, FALSE. Do not write anything else than one of these options.",
  "reason": "If the result is UNSURE or FALSE, provide a reason. If the result is VERIFIED or CERTAIN, write null."
}"#;

const EXTRACT_SYSTEM: &str = "You are an AI system designed to extract main information from invoice documents.

Extract these fields:
- supplier
- invoice_number
- invoice_date
- error (if any are missing or uncertain)

Your output must follow this JSON format:
";

const RETRY_SYSTEM: &str = "You are an AI system designed to extract main information from invoice documents.
The main information was extracted before but with low confidence.
You must re-extract or correct the invoice information.

The user will provide:
The OCR-extracted text from the document.
The document itself as an image, when available.
The previously extracted main information and the reason for low confidence.

Your output must follow this JSON format:
";

const VERIFY_SYSTEM: &str = "You are an AI system designed to verify extracted invoice information.
Your task is to check the extracted fields against the OCR text of the document.
Use VERIFIED when every field is present and matches the OCR text.
Use CERTAIN when the fields are plausible and you have no reason to doubt them.
Use UNSURE when at least one field is ambiguous.
Use FALSE when a field contradicts the OCR text or is clearly wrong.

Your output must follow this JSON format:
";

fn ocr_block(ocr_text: &str) -> String {
    format!("### BEGIN OCR TEXT ###\n{}\n### END OCR TEXT ###", ocr_text)
}

fn render_main_info(info: &MainInfo) -> String {
    format!(
        "supplier: {}\ninvoice_number: {}\ninvoice_date: {}",
        info.supplier, info.invoice_number, info.invoice_date
    )
}

/// Messages for a first extraction attempt.
pub fn extraction_messages(ocr_text: &str) -> Vec<Message> {
    vec![
        Message::system(format!("{}{}", EXTRACT_SYSTEM, MAIN_INFO_FORMAT)),
        Message::user(ocr_block(ocr_text)),
    ]
}

/// Messages for a corrective re-extraction after a low-confidence verdict.
pub fn retry_messages(previous: &MainInfo, reason: &str, ocr_text: &str) -> Vec<Message> {
    vec![
        Message::system(format!("{}{}", RETRY_SYSTEM, MAIN_INFO_FORMAT)),
        Message::user(format!(
            "Previous main information:\n{}\n\nReason for low confidence:\n{}\n\n{}",
            render_main_info(previous),
            reason,
            ocr_block(ocr_text)
        )),
    ]
}

/// Messages for verifying a candidate extraction against the OCR text.
pub fn verification_messages(fields: &MainInfo, ocr_text: &str) -> Vec<Message> {
    vec![
        Message::system(format!("{}{}", VERIFY_SYSTEM, VERIFY_FORMAT)),
        Message::user(format!(
            "Here is the invoice information to verify:\n{}\n\n{}",
            render_main_info(fields),
            ocr_block(ocr_text)
        )),
    ]
}
