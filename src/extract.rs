//! Text extraction for library attachments.
//!
//! An extractor turns a source file into one plain-text blob: the text layer
//! of every page in document order, a blank line, then the contents of every
//! non-empty annotation (one per line). The cache store persists that blob
//! and the search engine normalizes it at query time.

use std::path::Path;

use lopdf::{Dictionary, Document, Object};
use tracing::{debug, warn};

use crate::error::ExtractError;

/// Separator between the page text stream and the annotation stream.
pub const STREAM_SEPARATOR: &str = "\n\n";

/// Converts a source document into searchable plain text.
///
/// Implementations run on blocking threads and must be `Send + Sync` so the
/// cache store can share one instance across its worker pool.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Joins page text and annotation text into one cache blob.
pub fn compose(content: &str, annotations: &[String]) -> String {
    let mut out = String::with_capacity(content.len() + STREAM_SEPARATOR.len());
    out.push_str(content);
    out.push_str(STREAM_SEPARATOR);
    for note in annotations {
        out.push_str(note);
        out.push('\n');
    }
    out
}

/// PDF extractor backed by `lopdf`: page text layer plus annotation contents.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        debug!("Extracting PDF: {}", path.display());

        let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = Document::load_mem(&bytes).map_err(|e| ExtractError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let pages = doc.get_pages();
        let mut content = String::new();
        let mut annotations = Vec::new();
        let mut text_pages = 0usize;

        for (&page_num, &page_id) in &pages {
            match doc.extract_text(&[page_num]) {
                Ok(text) if !text.trim().is_empty() => {
                    content.push_str(&text);
                    text_pages += 1;
                }
                Ok(_) => debug!("Page {} of {} has no text", page_num, path.display()),
                Err(e) => warn!(
                    "Skipping text of page {} in {}: {}",
                    page_num,
                    path.display(),
                    e
                ),
            }

            let Ok(page) = doc.get_dictionary(page_id) else {
                continue;
            };
            annotations.extend(page_annotations(&doc, page));
        }

        // Pages without any text layer or notes mean the text could not be read.
        if !pages.is_empty() && text_pages == 0 && annotations.is_empty() {
            return Err(ExtractError::Parse {
                path: path.to_path_buf(),
                message: format!("no extractable text in {} pages", pages.len()),
            });
        }

        Ok(compose(&content, &annotations))
    }
}

/// Non-empty `/Contents` strings of the annotations attached to one page.
fn page_annotations(doc: &Document, page: &Dictionary) -> Vec<String> {
    let Ok(annots) = page.get(b"Annots") else {
        return Vec::new();
    };
    let Ok((_, annots)) = doc.dereference(annots) else {
        return Vec::new();
    };
    let Ok(annots) = annots.as_array() else {
        return Vec::new();
    };

    annots
        .iter()
        .filter_map(|annot| {
            let (_, annot) = doc.dereference(annot).ok()?;
            let dict = annot.as_dict().ok()?;
            let (_, contents) = doc.dereference(dict.get(b"Contents").ok()?).ok()?;
            let text = decode_text_string(contents)?;
            (!text.trim().is_empty()).then_some(text)
        })
        .collect()
}

/// Decodes a PDF text string: UTF-16BE with BOM, UTF-8 (optionally with
/// BOM), else byte-per-char.
fn decode_text_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }

    let bytes = bytes
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(bytes.as_slice());
    match std::str::from_utf8(bytes) {
        Ok(s) => Some(s.to_string()),
        Err(_) => Some(bytes.iter().map(|&b| b as char).collect()),
    }
}
