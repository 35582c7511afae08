//! Document references (local files or URLs) and prompt image attachments.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;

use crate::error::DocumentError;

lazy_static! {
    static ref UNSAFE_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_.-]").unwrap();
}

/// A document to process: a local file or an HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    /// File on the local filesystem.
    Local(PathBuf),
    /// Publicly reachable document URL.
    Url(Url),
}

impl DocumentRef {
    /// Classify a reference string.
    ///
    /// Anything starting with `http://` or `https://` that parses as a URL is
    /// a URL; everything else is a local path.
    pub fn parse(reference: &str) -> Result<Self, DocumentError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(DocumentError::MissingReference);
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            if let Ok(url) = Url::parse(trimmed) {
                return Ok(Self::Url(url));
            }
        }

        Ok(Self::Local(PathBuf::from(trimmed)))
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

/// Deterministic base name (without extension) for a document's output record.
///
/// URLs use their last raw path segment, as written in `reference`, with
/// characters outside `[A-Za-z0-9_.-]` replaced; local paths use the file
/// name. Both are cut at the first `.`. Unusable references map to `document`.
pub fn output_name(reference: &str) -> String {
    match DocumentRef::parse(reference) {
        Ok(DocumentRef::Url(_)) => {
            let segment = raw_last_segment(reference.trim());
            let segment = if segment.is_empty() { "url_doc" } else { segment };
            let sanitized = UNSAFE_NAME_CHARS.replace_all(segment, "_");
            let stem = sanitized.split('.').next().unwrap_or_default();
            if stem.is_empty() {
                "url_document".to_string()
            } else {
                stem.to_string()
            }
        }
        Ok(DocumentRef::Local(path)) => {
            let stem = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.split('.').next())
                .unwrap_or_default();
            if stem.is_empty() {
                "document".to_string()
            } else {
                stem.to_string()
            }
        }
        Err(_) => "document".to_string(),
    }
}

/// Last path segment of a URL string, without query or fragment and without decoding.
fn raw_last_segment(url: &str) -> &str {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let end = after_scheme.find(['?', '#']).unwrap_or(after_scheme.len());
    let without_query = &after_scheme[..end];
    match without_query.find('/') {
        Some(path_start) => without_query[path_start..].rsplit('/').next().unwrap_or_default(),
        None => "",
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Image attached to an extraction prompt, as a URL the model can fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentImage {
    /// Remote URL or `data:` URL.
    pub url: String,
}

impl DocumentImage {
    /// Prepare the attachment for a document.
    ///
    /// URLs are passed through; local files are read, sniffed and encoded as
    /// a base64 data URL.
    pub fn load(document: &DocumentRef) -> Result<Self, DocumentError> {
        match document {
            DocumentRef::Url(url) => Ok(Self {
                url: url.to_string(),
            }),
            DocumentRef::Local(path) => {
                let bytes = std::fs::read(path).map_err(|source| DocumentError::Read {
                    reference: path.display().to_string(),
                    source,
                })?;
                Self::from_bytes(path, &bytes)
            }
        }
    }

    /// Encode raw image bytes as a data URL.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self, DocumentError> {
        let unsupported = |format: String| DocumentError::UnsupportedFormat {
            reference: path.display().to_string(),
            format,
        };

        let format = image::guess_format(bytes).map_err(|_| unsupported("unknown".to_string()))?;
        let mime = mime_type(format).ok_or_else(|| unsupported(format!("{:?}", format)))?;

        Ok(Self {
            url: format!("data:{};base64,{}", mime, STANDARD.encode(bytes)),
        })
    }
}

/// MIME types accepted by vision-capable chat models.
fn mime_type(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}
