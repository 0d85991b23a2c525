// src/pdf_text.rs

use crate::error::ExtractError;
use lopdf::Document;
use std::cell::Cell;
use std::panic::{self, UnwindSafe};
use std::sync::Once;
use tracing::{debug, info, warn};

/// Result of attempting to extract text from a PDF.
#[derive(Debug)]
pub enum PdfContent {
    /// The PDF contains extractable text.
    Text(String),
    /// The PDF appears to be scanned or image-only and needs OCR.
    ScannedImage,
    /// Something went wrong during extraction.
    Error(String),
}

impl PdfContent {
    /// Text or an `Unreadable` error, for callers that only want the text.
    pub fn into_text(self) -> Result<String, ExtractError> {
        match self {
            PdfContent::Text(text) => Ok(text),
            PdfContent::ScannedImage => Err(ExtractError::Unreadable(
                "PDF is scanned or image-only, no text layer".to_string(),
            )),
            PdfContent::Error(e) => Err(ExtractError::Unreadable(e)),
        }
    }
}

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Main entry point: takes raw PDF bytes and returns `PdfContent`.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> PdfContent {
    // --- Phase 1: structural check with lopdf ---
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return PdfContent::ScannedImage;
    }

    // --- Phase 2: attempt full text extraction ---
    // pdf-extract panics on some malformed content streams
    let extracted = quietly(|| pdf_extract::extract_text_from_mem(pdf_bytes));
    let Ok(extracted) = extracted else {
        warn!("pdf-extract panicked — treating PDF as unreadable");
        return PdfContent::Error("Text extraction aborted on malformed content".to_string());
    };

    match extracted {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(
                    chars = meaningful,
                    "Extracted text too short — treating as scanned"
                );
                PdfContent::ScannedImage
            } else {
                info!(chars = meaningful, "Text extracted successfully");
                PdfContent::Text(text)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed — may be scanned or corrupted");
            PdfContent::Error(format!("Failed to extract text: {e}"))
        }
    }
}

thread_local! {
    static QUIET: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();

/// Run `f`, catching a panic. While it runs, panics on this thread are
/// logged at debug level instead of going to the default hook.
fn quietly<T>(f: impl FnOnce() -> T + UnwindSafe) -> std::thread::Result<T> {
    QUIET_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if QUIET.with(Cell::get) {
                debug!(panic = %info, "Panic inside PDF text extraction");
            } else {
                previous(info);
            }
        }));
    });

    QUIET.with(|q| q.set(true));
    let result = panic::catch_unwind(f);
    QUIET.with(|q| q.set(false));
    result
}

/// Heuristic: a page with XObject images but **no** Font resources is
/// almost certainly a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // Can't tell, let text extraction try
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Ok(page_dict) = page_obj.as_dict() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let non_empty_entry = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|f| doc.dereference(f).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if non_empty_entry(&b"XObject"[..]) && !non_empty_entry(&b"Font"[..]) {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    // If ≥80% of pages are image-only, treat the whole PDF as scanned
    ratio >= 0.8
}
