//! Progressive page rendering into an RGBA bitmap

use crate::document::{Color, Document, PageObject};
use crate::error::{Error, Result};
use crate::progress::{percent, ProgressiveTask, Step};
use image::{ImageFormat, Rgba, RgbaImage};
use std::sync::Arc;

/// Page rendering options
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Pixels per point
    pub scale: f32,
    pub background: Color,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            background: Color::WHITE,
        }
    }
}

/// Limits applied while setting up a render
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderLimits {
    pub objects_per_step: usize,
    pub max_scale: f32,
    pub max_pixels: u64,
}

/// Paints the objects of one page in document order.
///
/// Each increment paints a fixed number of objects. Text characters are drawn
/// as solid glyph boxes; no font rasterisation is done.
pub struct RenderTask {
    document: Arc<Document>,
    page_num: u32,
    scale: f32,
    objects_per_step: usize,
    next: usize,
    bitmap: RgbaImage,
}

impl RenderTask {
    pub(crate) fn new(
        document: Arc<Document>,
        page_num: u32,
        options: &RenderOptions,
        limits: RenderLimits,
    ) -> Result<Self> {
        let page = document.page(page_num)?;

        if !options.scale.is_finite() || options.scale <= 0.0 || options.scale > limits.max_scale {
            return Err(Error::InvalidOptions {
                reason: format!(
                    "scale {} must be greater than 0 and at most {}",
                    options.scale, limits.max_scale
                ),
            });
        }

        let width = ((page.width * options.scale).ceil() as u32).max(1);
        let height = ((page.height * options.scale).ceil() as u32).max(1);
        let pixels = u64::from(width) * u64::from(height);
        if pixels > limits.max_pixels {
            return Err(Error::ImageDimensionExceeded {
                detail: format!(
                    "{}x{} = {} pixels exceeds the limit of {}",
                    width, height, pixels, limits.max_pixels
                ),
            });
        }

        let bg = options.background;
        let bitmap = RgbaImage::from_pixel(width, height, Rgba([bg.r, bg.g, bg.b, bg.a]));

        Ok(Self {
            document,
            page_num,
            scale: options.scale,
            objects_per_step: limits.objects_per_step.max(1),
            next: 0,
            bitmap,
        })
    }

    /// 1-based page number being rendered
    pub fn page(&self) -> u32 {
        self.page_num
    }

    /// The bitmap as painted so far. Empty after a failure.
    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    pub fn objects_painted(&self) -> usize {
        self.next
    }

    /// Encode the bitmap as PNG
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut png_bytes = Vec::new();
        self.bitmap
            .write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)
            .map_err(|e| Error::Encode {
                reason: format!("Failed to encode page {} as PNG: {}", self.page_num, e),
            })?;
        Ok(png_bytes)
    }

    fn total(&self) -> usize {
        self.document.pages[(self.page_num - 1) as usize].objects.len()
    }
}

impl ProgressiveTask for RenderTask {
    fn name(&self) -> &'static str {
        "render"
    }

    fn step(&mut self) -> Result<Step> {
        let page = &self.document.pages[(self.page_num - 1) as usize];
        let end = (self.next + self.objects_per_step).min(page.objects.len());

        for obj in &page.objects[self.next..end] {
            obj.validate()?;
            paint(&mut self.bitmap, obj, page.height, self.scale);
            self.next += 1;
        }

        if self.next >= page.objects.len() {
            Ok(Step::Done)
        } else {
            Ok(Step::Pending)
        }
    }

    fn ratio(&self) -> u8 {
        percent(self.next, self.total())
    }

    fn discard(&mut self) {
        self.bitmap = RgbaImage::new(0, 0);
    }
}

fn paint(bitmap: &mut RgbaImage, obj: &PageObject, page_height: f32, scale: f32) {
    let (x, top, width, height) = obj.bounds();
    let color = match obj {
        PageObject::Text(c) => c.color,
        PageObject::Rect(r) => r.fill,
    };
    if color.a == 0 {
        return;
    }

    // PDF space grows upwards, bitmap rows grow downwards
    let x0 = clamp_px(x * scale, bitmap.width());
    let x1 = clamp_px((x + width) * scale, bitmap.width());
    let y0 = clamp_px((page_height - top) * scale, bitmap.height());
    let y1 = clamp_px((page_height - top + height) * scale, bitmap.height());

    for py in y0..y1 {
        for px in x0..x1 {
            let dst = bitmap.get_pixel_mut(px, py);
            *dst = blend(*dst, color);
        }
    }
}

fn clamp_px(v: f32, limit: u32) -> u32 {
    v.round().clamp(0.0, limit as f32) as u32
}

/// Source-over compositing of `src` onto `dst`
fn blend(dst: Rgba<u8>, src: Color) -> Rgba<u8> {
    let a = u32::from(src.a);
    if a == 255 {
        return Rgba([src.r, src.g, src.b, 255]);
    }
    let inv = 255 - a;
    let mix = |s: u8, d: u8| ((u32::from(s) * a + u32::from(d) * inv + 127) / 255) as u8;
    let Rgba([dr, dg, db, da]) = dst;
    Rgba([
        mix(src.r, dr),
        mix(src.g, dg),
        mix(src.b, db),
        (a + (u32::from(da) * inv + 127) / 255).min(255) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;
    use crate::progress::{ProgressHandle, ProgressState};

    fn limits(objects_per_step: usize) -> RenderLimits {
        RenderLimits {
            objects_per_step,
            max_scale: 10.0,
            max_pixels: 1_000_000,
        }
    }

    fn doc_with_rects() -> Arc<Document> {
        let mut page = Page::new(20.0, 10.0);
        page.push_rect(0.0, 10.0, 10.0, 10.0, Color::rgb(255, 0, 0));
        page.push_rect(10.0, 10.0, 10.0, 5.0, Color::rgb(0, 0, 255));
        Arc::new(Document::new(vec![page]))
    }

    #[test]
    fn test_render_paints_in_pdf_coordinates() {
        let task =
            RenderTask::new(doc_with_rects(), 1, &RenderOptions::default(), limits(16)).unwrap();
        let handle = ProgressHandle::start(task, None);
        assert_eq!(handle.continue_progress(), ProgressState::Finished);

        handle.with_task(|t| {
            let bmp = t.bitmap();
            assert_eq!(bmp.dimensions(), (20, 10));
            assert_eq!(*bmp.get_pixel(2, 2), Rgba([255, 0, 0, 255]));
            // Blue rect covers only the top half of the right side
            assert_eq!(*bmp.get_pixel(15, 2), Rgba([0, 0, 255, 255]));
            assert_eq!(*bmp.get_pixel(15, 8), Rgba([255, 255, 255, 255]));
        });
    }

    #[test]
    fn test_render_scale() {
        let options = RenderOptions {
            scale: 2.0,
            ..RenderOptions::default()
        };
        let task = RenderTask::new(doc_with_rects(), 1, &options, limits(16)).unwrap();
        assert_eq!(task.bitmap().dimensions(), (40, 20));
    }

    #[test]
    fn test_render_one_object_per_step() {
        let mut task =
            RenderTask::new(doc_with_rects(), 1, &RenderOptions::default(), limits(1)).unwrap();
        assert_eq!(task.step().unwrap(), Step::Pending);
        assert_eq!(task.ratio(), 50);
        assert_eq!(task.step().unwrap(), Step::Done);
        assert_eq!(task.ratio(), 100);
    }

    #[test]
    fn test_render_empty_page_is_done_immediately() {
        let doc = Arc::new(Document::new(vec![Page::new(5.0, 5.0)]));
        let mut task = RenderTask::new(doc, 1, &RenderOptions::default(), limits(4)).unwrap();
        assert_eq!(task.step().unwrap(), Step::Done);
    }

    #[test]
    fn test_render_setup_errors() {
        let doc = doc_with_rects();
        assert!(matches!(
            RenderTask::new(doc.clone(), 2, &RenderOptions::default(), limits(1)),
            Err(Error::PageOutOfBounds { .. })
        ));

        let bad_scale = RenderOptions {
            scale: 0.0,
            ..RenderOptions::default()
        };
        assert!(matches!(
            RenderTask::new(doc.clone(), 1, &bad_scale, limits(1)),
            Err(Error::InvalidOptions { .. })
        ));

        let huge = RenderOptions {
            scale: 10.0,
            ..RenderOptions::default()
        };
        let tight = RenderLimits {
            max_pixels: 100,
            ..limits(1)
        };
        assert!(matches!(
            RenderTask::new(doc, 1, &huge, tight),
            Err(Error::ImageDimensionExceeded { .. })
        ));
    }

    #[test]
    fn test_render_malformed_object_fails_and_discards() {
        let mut page = Page::new(10.0, 10.0);
        page.push_rect(0.0, 10.0, 5.0, 5.0, Color::BLACK);
        page.push_rect(0.0, f32::NAN, 5.0, 5.0, Color::BLACK);
        let doc = Arc::new(Document::new(vec![page]));

        let task = RenderTask::new(doc, 1, &RenderOptions::default(), limits(16)).unwrap();
        let handle = ProgressHandle::start(task, None);
        assert_eq!(handle.continue_progress(), ProgressState::Error);
        assert_eq!(handle.rate_of_progress(), -1);
        assert_eq!(handle.with_task(|t| t.bitmap().dimensions()), (0, 0));
    }

    #[test]
    fn test_blend() {
        let dst = Rgba([255, 255, 255, 255]);
        assert_eq!(blend(dst, Color::rgba(0, 0, 0, 255)), Rgba([0, 0, 0, 255]));
        assert_eq!(blend(dst, Color::rgba(0, 0, 0, 0)), dst);
        let half = blend(dst, Color::rgba(0, 0, 0, 128));
        assert_eq!(half, Rgba([127, 127, 127, 255]));
    }

    #[test]
    fn test_encode_png_signature() {
        let task =
            RenderTask::new(doc_with_rects(), 1, &RenderOptions::default(), limits(16)).unwrap();
        let png = task.encode_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
