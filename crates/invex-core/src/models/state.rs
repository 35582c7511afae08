//! Per-document processing state and the invoice fields it carries.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Literal used on the wire for a field that could not be found.
pub const NOT_FOUND: &str = "null";

/// A single extracted field: either a value or an explicit "not found" marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    /// The field was found with this value.
    Found(String),
    /// The field was not found.
    #[default]
    NotFound,
}

impl FieldValue {
    /// Build a field from free text, mapping blanks and `null` to [`FieldValue::NotFound`].
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_FOUND) {
            Self::NotFound
        } else {
            Self::Found(trimmed.to_string())
        }
    }

    /// Build a field from an arbitrary JSON value.
    ///
    /// Strings go through [`FieldValue::from_text`], numbers are kept as their
    /// textual form (invoice numbers are often emitted unquoted), anything
    /// else is treated as not found.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::from_text(s),
            Some(Value::Number(n)) => Self::Found(n.to_string()),
            _ => Self::NotFound,
        }
    }

    /// Get the value if the field was found.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Found(v) => Some(v.as_str()),
            Self::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Wire representation: the value, or the literal `"null"`.
    pub fn as_str(&self) -> &str {
        self.value().unwrap_or(NOT_FOUND)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldVisitor;

        impl<'de> Visitor<'de> for FieldVisitor {
            type Value = FieldValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, a number or null")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(FieldValue::from_text(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(FieldValue::Found(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(FieldValue::Found(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FieldValue::NotFound)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FieldValue::NotFound)
            }
        }

        deserializer.deserialize_any(FieldVisitor)
    }
}

/// The main invoice information: supplier, invoice number and invoice date.
///
/// All three keys are always present; only their values may be "not found".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MainInfo {
    /// Supplier company name.
    #[serde(default)]
    pub supplier: FieldValue,

    /// Invoice number.
    #[serde(default)]
    pub invoice_number: FieldValue,

    /// Invoice (issue) date as printed on the document.
    #[serde(default)]
    pub invoice_date: FieldValue,
}

impl MainInfo {
    /// All three fields marked as not found.
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Read the three fields from a JSON object, tolerating missing or
    /// malformed entries. Anything that is not an object yields all
    /// fields as not found.
    pub fn from_json(value: &Value) -> Self {
        Self {
            supplier: FieldValue::from_json(value.get("supplier")),
            invoice_number: FieldValue::from_json(value.get("invoice_number")),
            invoice_date: FieldValue::from_json(value.get("invoice_date")),
        }
    }

    /// Number of fields that were found.
    pub fn found_count(&self) -> usize {
        [&self.supplier, &self.invoice_number, &self.invoice_date]
            .iter()
            .filter(|f| f.is_found())
            .count()
    }
}

/// Confidence label produced by the verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    /// All fields confirmed against the OCR text.
    Verified,
    /// Accepted without an explicit cross-check.
    Certain,
    /// At least one field is ambiguous.
    Unsure,
    /// Contradicted by the OCR text or clearly wrong.
    False,
}

impl Confidence {
    /// Parse a label, ignoring case and surrounding whitespace.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "VERIFIED" => Some(Self::Verified),
            "CERTAIN" => Some(Self::Certain),
            "UNSURE" => Some(Self::Unsure),
            "FALSE" => Some(Self::False),
            _ => None,
        }
    }

    /// Whether the label ends the workflow successfully.
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Verified | Self::Certain)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "VERIFIED",
            Self::Certain => "CERTAIN",
            Self::Unsure => "UNSURE",
            Self::False => "FALSE",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative token counters across every gateway call of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Add the counts reported by one call. Missing counts add nothing.
    pub fn record(&mut self, input: Option<u64>, output: Option<u64>) {
        self.input_tokens = self.input_tokens.saturating_add(input.unwrap_or(0));
        self.output_tokens = self.output_tokens.saturating_add(output.unwrap_or(0));
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// State threaded through the workflow for a single document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingState {
    document_reference: String,

    /// Text returned by the OCR gateway.
    pub ocr_text: Option<String>,

    /// Current candidate fields, replaced on every extraction attempt.
    pub extracted_fields: Option<MainInfo>,

    /// Free-text note the model attached to its last extraction.
    pub extraction_note: Option<String>,

    /// Label from the most recent verification.
    pub confidence: Option<Confidence>,

    /// Explanation accompanying an `UNSURE` / `FALSE` label.
    pub reason: Option<String>,

    /// Number of loop-backs to the extraction step so far.
    pub retry_count: u32,

    /// Terminal error; once set no further stage runs.
    pub error: Option<String>,

    /// Cumulative token usage.
    pub token_usage: TokenUsage,
}

impl ProcessingState {
    /// Create the state for a document.
    pub fn new(document_reference: impl Into<String>) -> Self {
        Self {
            document_reference: document_reference.into(),
            ocr_text: None,
            extracted_fields: None,
            extraction_note: None,
            confidence: None,
            reason: None,
            retry_count: 0,
            error: None,
            token_usage: TokenUsage::default(),
        }
    }

    /// Path or URL of the source document.
    pub fn document_reference(&self) -> &str {
        &self.document_reference
    }

    /// Record a terminal error.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Number of extraction attempts implied by the retry counter.
    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }
}
