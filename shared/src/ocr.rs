//! Interface to the OCR collaborator. The Tesseract-backed implementation
//! lives in the `text-extraction` crate.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    /// Multi-page document (PDF).
    Document,
}

impl DocumentKind {
    /// Detects the kind from a declared MIME type, then from the file extension.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Self {
        if content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf")) {
            return DocumentKind::Document;
        }
        let is_pdf = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            DocumentKind::Document
        } else {
            DocumentKind::Image
        }
    }
}

/// Uploaded document bytes; lives only for the duration of an upload.
#[derive(Debug, Clone)]
pub struct RawSubmission {
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
    pub filename: String,
}

impl RawSubmission {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, content_type: Option<&str>) -> Self {
        let filename = filename.into();
        let kind = DocumentKind::detect(&filename, content_type);
        Self {
            bytes,
            kind,
            filename,
        }
    }
}

#[async_trait(?Send)]
pub trait DocumentReader: Send + Sync {
    /// Raw text of the submission. Multi-page documents are joined in page order.
    async fn read(&self, submission: &RawSubmission) -> Result<String>;
}
