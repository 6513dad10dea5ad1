//! Document loading from PDF bytes, JSON, files and base64

use super::model::{Color, Document, DocumentInfo, Page, PageObject, TextChar};
use crate::error::{Error, Result};
use base64::Engine;
use pdfium_render::prelude::*;
use std::path::Path;

/// Loaded document plus a printable name for logs and results
pub struct ResolvedDocument {
    pub document: Document,
    pub source_name: String,
}

/// Resolve a file path to a document.
/// PDF files are detected by their `%PDF` header; anything else must be document JSON.
pub fn resolve_path<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<ResolvedDocument> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(Error::DocumentNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path).map_err(Error::Io)?;

    Ok(ResolvedDocument {
        document: load_bytes(&data, password)?,
        source_name: path.display().to_string(),
    })
}

/// Resolve base64 encoded PDF or document JSON
pub fn resolve_base64(base64_data: &str, password: Option<&str>) -> Result<ResolvedDocument> {
    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(base64_data)?;

    Ok(ResolvedDocument {
        document: load_bytes(&data, password)?,
        source_name: "<base64>".to_string(),
    })
}

/// Load a document from raw bytes, sniffing the format
pub fn load_bytes(data: &[u8], password: Option<&str>) -> Result<Document> {
    if is_pdf(data) {
        return load_pdf(data, password);
    }
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => Document::from_json(data),
        _ => Err(Error::InvalidDocument {
            reason: "Neither a PDF file nor document JSON".to_string(),
        }),
    }
}

fn is_pdf(data: &[u8]) -> bool {
    data.len() >= 4 && &data[0..4] == b"%PDF"
}

/// Get PDFium instance (creates new instance each time - PDFium is not thread-safe)
fn create_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::PasswordRequired
        }
        _ => Error::Pdfium {
            reason: format!("{}", err),
        },
    }
}

/// Read page geometry and character boxes from a PDF through PDFium.
///
/// Only text is imported; vector graphics and images stay behind.
pub fn load_pdf(data: &[u8], password: Option<&str>) -> Result<Document> {
    if !is_pdf(data) {
        return Err(Error::InvalidDocument {
            reason: "Not a valid PDF file".to_string(),
        });
    }

    let pdfium = create_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(data, password)
        .map_err(map_pdfium_error)?;

    let meta = document.metadata();
    let info = DocumentInfo {
        title: meta
            .get(PdfDocumentMetadataTagType::Title)
            .map(|t| t.value().to_string()),
        author: meta
            .get(PdfDocumentMetadataTagType::Author)
            .map(|t| t.value().to_string()),
    };

    let pages = document.pages();
    let mut out = Vec::with_capacity(pages.len() as usize);

    for index in 0..pages.len() {
        let page = pages.get(index).map_err(|e| Error::Pdfium {
            reason: format!("Failed to get page {}: {}", index + 1, e),
        })?;

        let mut model = Page::new(page.width().value, page.height().value);
        if let Ok(text) = page.text() {
            for segment in text.segments().iter() {
                let Ok(chars) = segment.chars() else {
                    continue;
                };
                for char_result in chars.iter() {
                    let Some(c) = char_result.unicode_char() else {
                        continue;
                    };
                    if let Ok(bounds) = char_result.loose_bounds() {
                        model.objects.push(PageObject::Text(TextChar {
                            char: c,
                            x: bounds.left().value,
                            y: bounds.top().value,
                            width: bounds.width().value,
                            height: bounds.height().value,
                            color: Color::BLACK,
                        }));
                    }
                }
            }
        }
        out.push(model);
    }

    tracing::debug!(pages = out.len(), "loaded PDF through PDFium");

    Ok(Document { info, pages: out })
}

/// Parse page range string (e.g., "1-5,10,15-20") into sorted, deduplicated 1-based pages
pub fn parse_page_range(range: &str, max_pages: u32) -> Result<Vec<u32>> {
    let invalid = || Error::InvalidPageRange {
        range: range.to_string(),
    };
    let mut pages = Vec::new();

    for part in range.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.trim().parse().map_err(|_| invalid())?;
            let end: u32 = end.trim().parse().map_err(|_| invalid())?;

            if start < 1 || end > max_pages || start > end {
                return Err(invalid());
            }
            pages.extend(start..=end);
        } else {
            let page: u32 = part.parse().map_err(|_| invalid())?;
            if page < 1 || page > max_pages {
                return Err(invalid());
            }
            pages.push(page);
        }
    }

    pages.sort_unstable();
    pages.dedup();

    Ok(pages)
}
