//! Progressive reflow: reading-order text re-wrapped to a fixed line width

use super::layout::{layout_lines, wrap_lines, TextLayoutConfig};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::progress::{percent, ProgressiveTask, Step};
use serde::Serialize;
use std::sync::Arc;

/// Reflow options
#[derive(Debug, Clone, PartialEq)]
pub struct ReflowOptions {
    pub layout: TextLayoutConfig,
    /// Maximum characters per output line
    pub line_width: usize,
}

impl Default for ReflowOptions {
    fn default() -> Self {
        Self {
            layout: TextLayoutConfig::default(),
            line_width: 60,
        }
    }
}

/// Reflowed content of one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflowPage {
    /// Page number (1-indexed)
    pub page: u32,
    /// Wrapped lines; an empty line separates paragraphs
    pub lines: Vec<String>,
}

/// Reflows a selection of pages, a fixed number of pages per increment
pub struct ReflowTask {
    document: Arc<Document>,
    pages: Vec<u32>,
    options: ReflowOptions,
    pages_per_step: usize,
    next: usize,
    output: Vec<ReflowPage>,
}

impl ReflowTask {
    /// `pages` of `None` selects the whole document
    pub(crate) fn new(
        document: Arc<Document>,
        pages: Option<&[u32]>,
        options: ReflowOptions,
        pages_per_step: usize,
    ) -> Result<Self> {
        if options.line_width == 0 {
            return Err(Error::InvalidOptions {
                reason: "line_width must be at least 1".to_string(),
            });
        }

        let pages = match pages {
            Some(selection) => {
                for &page in selection {
                    document.page(page)?;
                }
                selection.to_vec()
            }
            None => (1..=document.page_count()).collect(),
        };

        Ok(Self {
            output: Vec::with_capacity(pages.len()),
            document,
            pages,
            options,
            pages_per_step: pages_per_step.max(1),
            next: 0,
        })
    }

    /// Pages reflowed so far, in selection order
    pub fn pages(&self) -> &[ReflowPage] {
        &self.output
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All reflowed pages joined with a form feed between pages
    pub fn text(&self) -> String {
        self.output
            .iter()
            .map(|p| p.lines.join("\n"))
            .collect::<Vec<_>>()
            .join("\n\x0c\n")
    }
}

impl ProgressiveTask for ReflowTask {
    fn name(&self) -> &'static str {
        "reflow"
    }

    fn step(&mut self) -> Result<Step> {
        let end = (self.next + self.pages_per_step).min(self.pages.len());
        while self.next < end {
            let page_num = self.pages[self.next];
            let page = self.document.page(page_num)?;
            let lines = layout_lines(page, &self.options.layout)?;
            self.output.push(ReflowPage {
                page: page_num,
                lines: wrap_lines(&lines, self.options.line_width),
            });
            self.next += 1;
        }

        if self.next >= self.pages.len() {
            Ok(Step::Done)
        } else {
            Ok(Step::Pending)
        }
    }

    fn ratio(&self) -> u8 {
        percent(self.next, self.pages.len())
    }

    fn discard(&mut self) {
        self.output = Vec::new();
    }
}
