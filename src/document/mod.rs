//! Documents the progressive operations work on
//!
//! Documents are immutable once loaded and are shared between tasks through
//! `Arc<Document>`.

mod loader;
mod model;

pub use loader::{
    load_bytes, load_pdf, parse_page_range, resolve_base64, resolve_path, ResolvedDocument,
};
pub use model::{Color, Document, DocumentInfo, Page, PageObject, RectObject, TextChar};
