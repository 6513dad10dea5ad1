//! Concrete progressive operations
//!
//! Increment sizes:
//! - render: a fixed number of page objects
//! - reflow: a fixed number of pages
//! - index: a fixed number of pages, plus the final commit

mod index;
mod layout;
mod reflow;
mod render;

pub use index::{tokenize, IndexTask, SearchHit, SearchIndex, SearchOptions, SharedIndex};
pub use layout::{
    layout_lines, page_text, wrap_lines, ColumnMode, ParagraphMode, TextLayoutConfig, TextLine,
};
pub use reflow::{ReflowOptions, ReflowPage, ReflowTask};
pub use render::{RenderOptions, RenderTask};

pub(crate) use render::RenderLimits;
