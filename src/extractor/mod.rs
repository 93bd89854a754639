// Document text extraction
// Turns uploaded DOCX/PDF bytes into plain text ahead of normalization and chunking

#[cfg(test)]
pub(crate) mod fixtures;

pub mod normalize;

use std::fmt;
use std::path::Path;

use docx_rs::{DocumentChild, ParagraphChild, RunChild, TableCellContent, TableChild, TableRowChild};
use thiserror::Error;
use tracing::{debug, warn};

pub use normalize::normalize_text;

/// Closed set of document formats the pipeline can extract text from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    /// Office Open XML word-processing document (`.docx`)
    Docx,
    /// Portable Document Format (`.pdf`)
    Pdf,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to read DOCX document: {0}")]
    Docx(String),
    #[error("Failed to read PDF document: {0}")]
    Pdf(String),
}

impl DocumentFormat {
    /// Select the format from a filename's extension, case-insensitively
    #[inline]
    pub fn from_filename(filename: &str) -> Result<Self, ExtractError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ExtractError::UnsupportedFormat(format!("'{}' has no file extension", filename))
            })?;

        if extension.eq_ignore_ascii_case("docx") {
            Ok(Self::Docx)
        } else if extension.eq_ignore_ascii_case("pdf") {
            Ok(Self::Pdf)
        } else {
            Err(ExtractError::UnsupportedFormat(format!(
                ".{} (accepted: .docx, .pdf)",
                extension
            )))
        }
    }

    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for DocumentFormat {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Docx => write!(f, "DOCX"),
            Self::Pdf => write!(f, "PDF"),
        }
    }
}

/// Extract all text from a document, preserving paragraph and page order.
///
/// Paragraphs (DOCX) and pages (PDF) are joined with `\n`. Whitespace-only
/// output is returned as-is; emptiness is judged after normalization.
#[inline]
pub fn extract_text(data: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    let text = match format {
        DocumentFormat::Docx => extract_docx(data)?,
        DocumentFormat::Pdf => extract_pdf(data)?,
    };

    debug!("Extracted {} characters from {} document", text.len(), format);
    Ok(text)
}

fn extract_docx(data: &[u8]) -> Result<String, ExtractError> {
    let docx = docx_rs::read_docx(data).map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(paragraph) => {
                paragraphs.push(paragraph_text(&paragraph.children));
            }
            DocumentChild::Table(table) => {
                for row in &table.rows {
                    #[expect(irrefutable_let_patterns, reason = "docx-rs may add row kinds")]
                    let TableChild::TableRow(row) = row else {
                        continue;
                    };
                    for cell in &row.cells {
                        #[expect(irrefutable_let_patterns, reason = "docx-rs may add cell kinds")]
                        let TableRowChild::TableCell(cell) = cell else {
                            continue;
                        };
                        for content in &cell.children {
                            if let TableCellContent::Paragraph(paragraph) = content {
                                paragraphs.push(paragraph_text(&paragraph.children));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}

fn paragraph_text(children: &[ParagraphChild]) -> String {
    let mut text = String::new();
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    match run_child {
                        RunChild::Text(t) => text.push_str(&t.text),
                        RunChild::Tab(_) => text.push('\t'),
                        RunChild::Break(_) => text.push('\n'),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => text.push_str(&paragraph_text(&link.children)),
            _ => {}
        }
    }
    text
}

fn extract_pdf(data: &[u8]) -> Result<String, ExtractError> {
    let document = lopdf::Document::load_mem(data).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                // Some font encodings trip lopdf; pdf-extract handles more of them
                warn!(
                    "Page {} text extraction failed ({}), retrying whole document",
                    page_number, e
                );
                return pdf_extract::extract_text_from_mem(data)
                    .map_err(|e| ExtractError::Pdf(e.to_string()));
            }
        }
    }

    Ok(pages.join("\n"))
}
