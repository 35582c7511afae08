//! OCR gateway abstraction.

mod azure;

pub use azure::DocumentIntelligenceOcr;

use async_trait::async_trait;

use crate::document::DocumentRef;
use crate::error::OcrError;

/// Text extraction capability: given a document, return its text.
///
/// Implementations handle both local files and URLs.
#[async_trait]
pub trait OcrGateway: Send + Sync {
    /// Extract the text of a document.
    async fn extract_text(&self, document: &DocumentRef) -> Result<String, OcrError>;
}
