// src/batch.rs

use crate::error::ExtractError;
use crate::extractor::Extractor;
use crate::pdf_text;
use crate::sheet::SheetWriter;
use glob::{MatchOptions, Pattern, glob_with};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{Instrument, error, info, info_span, warn};

/// A document's provenance name and its raw text.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub file_name: String,
    pub text: String,
}

/// One entry of a batch: text ready for extraction, or the reason there
/// is none.
#[derive(Debug)]
pub enum DocumentInput {
    Ready(SourceDocument),
    Unreadable {
        file_name: String,
        error: ExtractError,
    },
}

impl DocumentInput {
    #[cfg(test)]
    pub fn from_text(file_name: impl Into<String>, text: impl Into<String>) -> Self {
        DocumentInput::Ready(SourceDocument {
            file_name: file_name.into(),
            text: text.into(),
        })
    }

    /// Run the PDF bytes through the text collaborator.
    pub fn from_pdf(file_name: impl Into<String>, pdf_bytes: &[u8]) -> Self {
        let file_name = file_name.into();
        match pdf_text::extract_text_from_pdf(pdf_bytes).into_text() {
            Ok(text) => DocumentInput::Ready(SourceDocument { file_name, text }),
            Err(error) => DocumentInput::Unreadable { file_name, error },
        }
    }

    pub fn from_path(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match fs::read(path) {
            Ok(bytes) => Self::from_pdf(file_name, &bytes),
            Err(e) => DocumentInput::Unreadable {
                file_name,
                error: ExtractError::Unreadable(format!("Failed to read file: {e}")),
            },
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            DocumentInput::Ready(doc) => &doc.file_name,
            DocumentInput::Unreadable { file_name, .. } => file_name,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub documents: usize,
    pub rows: usize,
    pub failures: usize,
}

/// Extract every document in order and write its rows. A failing document
/// gets an error row and the batch moves on; only fatal errors abort.
pub async fn process_documents<W, I>(
    extractor: &dyn Extractor,
    inputs: I,
    sheet: &mut SheetWriter<W>,
) -> Result<BatchSummary, ExtractError>
where
    W: Write,
    I: IntoIterator<Item = DocumentInput>,
{
    let mut summary = BatchSummary::default();

    for input in inputs {
        summary.documents += 1;
        let span = info_span!("extract", file = %input.file_name());

        let doc = match input {
            DocumentInput::Ready(doc) => doc,
            DocumentInput::Unreadable { file_name, error } => {
                span.in_scope(|| warn!(error = %error, "Skipping unreadable document"));
                sheet.write_error(&file_name, &error.to_string())?;
                summary.failures += 1;
                continue;
            }
        };

        match extractor.extract(&doc.text).instrument(span.clone()).await {
            Ok(result) => {
                let (filled, total) = result.header.coverage();
                let rows = sheet.write_result(&doc.file_name, &result)?;
                span.in_scope(|| {
                    info!(
                        filled,
                        total,
                        order_number = ?result.header.order_number,
                        invoice_number = ?result.header.invoice_number,
                        items = result.items.len(),
                        rows,
                        "Extraction result"
                    )
                });
            }
            Err(e) if e.is_fatal() => {
                span.in_scope(|| error!(error = %e, "Fatal extraction error, aborting batch"));
                return Err(e);
            }
            Err(e) => {
                span.in_scope(|| warn!(error = %e, "Extraction failed"));
                sheet.write_error(&doc.file_name, &e.to_string())?;
                summary.failures += 1;
            }
        }
    }

    summary.rows = sheet.rows();
    info!(
        documents = summary.documents,
        rows = summary.rows,
        failures = summary.failures,
        "Batch complete"
    );
    Ok(summary)
}

/// PDF files directly inside `dir`, sorted by name. The extension match
/// ignores case.
pub fn find_pdfs(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let pattern = format!("{}/*.pdf", Pattern::escape(&dir.to_string_lossy()));
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let mut files: Vec<PathBuf> = glob_with(&pattern, options)
        .map_err(|e| ExtractError::Config(format!("Bad input directory pattern: {e}")))?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Batch mode: every PDF in `input_dir` into one sheet at `output_path`.
pub async fn extract_directory(
    extractor: &dyn Extractor,
    input_dir: &Path,
    output_path: &Path,
) -> Result<BatchSummary, ExtractError> {
    let files = find_pdfs(input_dir)?;
    info!(
        dir = %input_dir.display(),
        count = files.len(),
        "PDF files to extract"
    );

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = BufWriter::new(File::create(output_path)?);
    let mut sheet = SheetWriter::new(file, extractor.layout())?;
    let summary = process_documents(
        extractor,
        files.iter().map(|p| DocumentInput::from_path(p)),
        &mut sheet,
    )
    .await?;
    sheet.finish()?.flush()?;

    Ok(summary)
}
