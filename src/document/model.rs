//! In-memory document model
//!
//! Coordinates follow PDF user space: origin at the bottom-left corner of the
//! page, `y` growing upwards, and every object positioned by its top-left
//! corner (`x` = left edge, `y` = top edge).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// A single positioned character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChar {
    pub char: char,
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    pub width: f32,
    /// Glyph height, used as a font size proxy
    pub height: f32,
    #[serde(default)]
    pub color: Color,
}

/// A filled rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectObject {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub fill: Color,
}

/// Drawable content of a page, in painting order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageObject {
    Text(TextChar),
    Rect(RectObject),
}

impl PageObject {
    /// Bounding box as (left, top, width, height)
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        match self {
            PageObject::Text(c) => (c.x, c.y, c.width, c.height),
            PageObject::Rect(r) => (r.x, r.y, r.width, r.height),
        }
    }

    /// Reject geometry that cannot be laid out or painted
    pub fn validate(&self) -> Result<()> {
        let (x, y, width, height) = self.bounds();
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return Err(Error::InvalidDocument {
                reason: "object has non-finite coordinates".to_string(),
            });
        }
        if width < 0.0 || height < 0.0 {
            return Err(Error::InvalidDocument {
                reason: format!("object has negative size {}x{}", width, height),
            });
        }
        Ok(())
    }
}

/// A single page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Width in points (1 point = 1/72 inch)
    pub width: f32,
    /// Height in points
    pub height: f32,
    #[serde(default)]
    pub objects: Vec<PageObject>,
}

impl Page {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            objects: Vec::new(),
        }
    }

    pub fn chars(&self) -> impl Iterator<Item = &TextChar> {
        self.objects.iter().filter_map(|obj| match obj {
            PageObject::Text(c) => Some(c),
            PageObject::Rect(_) => None,
        })
    }

    /// Append a run of characters starting at (`x`, `y`) with a fixed advance
    pub fn push_text(&mut self, text: &str, x: f32, y: f32, size: f32) {
        let advance = size * 0.5;
        for (i, c) in text.chars().enumerate() {
            self.objects.push(PageObject::Text(TextChar {
                char: c,
                x: x + advance * i as f32,
                y,
                width: advance,
                height: size,
                color: Color::BLACK,
            }));
        }
    }

    pub fn push_rect(&mut self, x: f32, y: f32, width: f32, height: f32, fill: Color) {
        self.objects.push(PageObject::Rect(RectObject {
            x,
            y,
            width,
            height,
            fill,
        }));
    }
}

/// Document information dictionary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// An immutable document shared by the tasks operating on it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub info: DocumentInfo,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            info: DocumentInfo::default(),
            pages,
        }
    }

    /// Parse the JSON document format
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let doc: Document = serde_json::from_slice(data).map_err(|e| Error::InvalidDocument {
            reason: format!("Malformed document JSON: {}", e),
        })?;
        for (index, page) in doc.pages.iter().enumerate() {
            if !(page.width.is_finite() && page.height.is_finite())
                || page.width <= 0.0
                || page.height <= 0.0
            {
                return Err(Error::InvalidDocument {
                    reason: format!("page {} has invalid size", index + 1),
                });
            }
        }
        Ok(doc)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Get a page by 1-based number
    pub fn page(&self, page_num: u32) -> Result<&Page> {
        if page_num < 1 || page_num > self.page_count() {
            return Err(Error::PageOutOfBounds {
                page: page_num,
                total: self.page_count(),
            });
        }
        Ok(&self.pages[(page_num - 1) as usize])
    }
}
