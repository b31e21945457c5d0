//! OCR collaborator: Tesseract for images, the embedded text layer for PDFs,
//! and per-page OCR of the scanned images when a PDF has no text layer.

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pdf_extract::extract_text_from_mem_by_pages;
use shared::config::Settings;
use shared::error::{AppError, Result};
use shared::ocr::{DocumentKind, DocumentReader, RawSubmission};
use tesseract::Tesseract;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TesseractReader {
    lang: String,
    datapath: Option<String>,
}

impl TesseractReader {
    pub fn new(lang: impl Into<String>, datapath: Option<String>) -> Self {
        Self {
            lang: lang.into(),
            datapath,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.tess_lang.clone(), settings.tessdata_dir.clone())
    }
}

/// Joins per-page text in page order, one blank line between non-empty pages.
pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn ocr_error(e: impl std::fmt::Display) -> AppError {
    AppError::Ocr(e.to_string())
}

/// Recognises text in an encoded image (PNG, JPEG, TIFF, ...).
pub fn ocr_image(bytes: &[u8], lang: &str, datapath: Option<&str>) -> Result<String> {
    let mut tess = Tesseract::new(datapath, Some(lang))
        .map_err(ocr_error)?
        .set_image_from_mem(bytes)
        .map_err(ocr_error)?;
    let text = tess.get_text().map_err(ocr_error)?;
    info!(len = text.len(), "ocr finished");
    Ok(text)
}

/// Text layer of a PDF, pages joined in order. Empty for scanned documents.
pub fn pdf_text(bytes: &[u8]) -> Result<String> {
    let pages = extract_text_from_mem_by_pages(bytes).map_err(ocr_error)?;
    let text = join_pages(&pages);
    info!(pages = pages.len(), len = text.len(), "pdf text layer read");
    Ok(text)
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).map_err(ocr_error),
        other => Ok(other),
    }
}

/// Resources of a page, following `Parent` links for inherited entries.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>> {
    let mut node = doc.get_dictionary(page_id).map_err(ocr_error)?;
    loop {
        if let Ok(res) = node.get(b"Resources") {
            return resolve(doc, res)?.as_dict().map(Some).map_err(ocr_error);
        }
        match node.get(b"Parent") {
            Ok(parent) => node = resolve(doc, parent)?.as_dict().map_err(ocr_error)?,
            Err(_) => return Ok(None),
        }
    }
}

fn is_jpeg(filter: Option<&Object>) -> bool {
    match filter {
        Some(Object::Name(name)) => name == b"DCTDecode",
        Some(Object::Array(items)) => {
            matches!(items.last(), Some(Object::Name(name)) if name == b"DCTDecode")
        }
        _ => false,
    }
}

/// Encoded page images of a PDF, in page order. Only JPEG (`DCTDecode`)
/// streams are returned since Tesseract can read them as-is; other image
/// encodings are skipped.
pub fn pdf_page_images(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let doc = Document::load_mem(bytes).map_err(ocr_error)?;
    let mut images = Vec::new();
    for (page_no, page_id) in doc.get_pages() {
        let Some(resources) = page_resources(&doc, page_id)? else {
            continue;
        };
        let Ok(xobjects) = resources.get(b"XObject") else {
            continue;
        };
        for (_, xobject) in resolve(&doc, xobjects)?.as_dict().map_err(ocr_error)?.iter() {
            let Ok(stream) = resolve(&doc, xobject)?.as_stream() else {
                continue;
            };
            let subtype = stream.dict.get(b"Subtype").and_then(Object::as_name);
            if !matches!(subtype, Ok(b"Image")) {
                continue;
            }
            if is_jpeg(stream.dict.get(b"Filter").ok()) {
                images.push(stream.content.clone());
            } else {
                warn!(page = page_no, "skipping non-jpeg page image");
            }
        }
    }
    Ok(images)
}

/// Text layer first; a PDF without one (or one pdf-extract cannot read) is
/// OCRed page by page.
pub fn read_pdf(bytes: &[u8], lang: &str, datapath: Option<&str>) -> Result<String> {
    match pdf_text(bytes) {
        Ok(text) if !text.is_empty() => return Ok(text),
        Ok(_) => info!("pdf has no text layer, falling back to ocr"),
        Err(e) => warn!(%e, "pdf text extraction failed, falling back to ocr"),
    }
    let images = pdf_page_images(bytes)?;
    if images.is_empty() {
        return Err(AppError::Ocr("pdf has neither text nor page images".into()));
    }
    let pages = images
        .iter()
        .map(|img| ocr_image(img, lang, datapath))
        .collect::<Result<Vec<_>>>()?;
    info!(pages = pages.len(), "pdf pages ocred");
    Ok(join_pages(&pages))
}

pub fn extract_text(submission: &RawSubmission, lang: &str, datapath: Option<&str>) -> Result<String> {
    info!(file = %submission.filename, kind = ?submission.kind, "starting text extraction");
    match submission.kind {
        DocumentKind::Document => read_pdf(&submission.bytes, lang, datapath),
        DocumentKind::Image => ocr_image(&submission.bytes, lang, datapath),
    }
}

#[async_trait(?Send)]
impl DocumentReader for TesseractReader {
    async fn read(&self, submission: &RawSubmission) -> Result<String> {
        let submission = submission.clone();
        let lang = self.lang.clone();
        let datapath = self.datapath.clone();
        tokio::task::spawn_blocking(move || {
            extract_text(&submission, &lang, datapath.as_deref())
        })
        .await
        .map_err(|e| AppError::Ocr(format!("ocr task failed: {e}")))?
    }
}
