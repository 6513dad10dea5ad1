//! Reading-order text layout for a single page
//!
//! Characters are grouped into lines by vertical proximity, centred oversized
//! watermark lines are dropped, two-column pages are read column by column,
//! and paragraph breaks are inferred from vertical spacing.

use crate::document::Page;
use crate::error::Result;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Fixed thresholds used when dynamic thresholds are disabled
const FIXED_Y_TOLERANCE: f32 = 5.0;
const FIXED_SPACE_THRESHOLD: f32 = 10.0;

/// Paragraph detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphMode {
    /// Every line stays in one paragraph per column
    None,
    /// Break paragraphs on unusually large vertical gaps
    Spacing,
}

/// Column detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMode {
    None,
    Auto,
}

/// Layout analysis settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextLayoutConfig {
    pub paragraph_mode: ParagraphMode,
    /// Line gap multiplier (relative to glyph height) that starts a new paragraph
    pub paragraph_threshold: f32,
    pub column_mode: ColumnMode,
    /// Minimum horizontal gap in points for a column separator
    pub column_gap: f32,
    /// Drop centred, oversized, short lines
    pub filter_watermarks: bool,
    /// Derive line and word thresholds from the median glyph height
    pub dynamic_thresholds: bool,
}

impl Default for TextLayoutConfig {
    fn default() -> Self {
        Self {
            paragraph_mode: ParagraphMode::Spacing,
            paragraph_threshold: 1.5,
            column_mode: ColumnMode::Auto,
            column_gap: 30.0,
            filter_watermarks: true,
            dynamic_thresholds: true,
        }
    }
}

/// One line of text in reading order
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub starts_paragraph: bool,
}

#[derive(Debug, Clone)]
struct CharInfo {
    c: char,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Clone)]
struct LineInfo {
    chars: Vec<CharInfo>,
    y: f32,
    avg_height: f32,
    min_x: f32,
    max_x: f32,
}

impl LineInfo {
    fn new(mut chars: Vec<CharInfo>) -> Self {
        chars.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
        let avg_height = if chars.is_empty() {
            0.0
        } else {
            chars.iter().map(|c| c.height).sum::<f32>() / chars.len() as f32
        };
        let min_x = chars.iter().map(|c| c.x).fold(f32::MAX, f32::min);
        let max_x = chars.iter().map(|c| c.x + c.width).fold(f32::MIN, f32::max);
        let y = chars.first().map(|c| c.y).unwrap_or(0.0);

        Self {
            chars,
            y,
            avg_height,
            min_x,
            max_x,
        }
    }

    fn center(&self) -> f32 {
        (self.min_x + self.max_x) / 2.0
    }

    fn text(&self, space_threshold: f32) -> String {
        let mut out = String::with_capacity(self.chars.len());
        let mut prev_right: Option<f32> = None;
        for ch in &self.chars {
            if let Some(right) = prev_right {
                if ch.x - right > space_threshold && ch.c != ' ' && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            out.push(ch.c);
            prev_right = Some(ch.x + ch.width);
        }
        out.trim().to_string()
    }
}

/// Lay out the text of a page in reading order.
///
/// Fails if any character has malformed geometry.
pub fn layout_lines(page: &Page, config: &TextLayoutConfig) -> Result<Vec<TextLine>> {
    let mut chars = Vec::new();
    for obj in &page.objects {
        obj.validate()?;
    }
    for c in page.chars() {
        chars.push(CharInfo {
            c: c.char,
            x: c.x,
            y: c.y,
            width: c.width,
            height: c.height,
        });
    }
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let (y_tolerance, space_threshold) = if config.dynamic_thresholds {
        dynamic_thresholds(&chars)
    } else {
        (FIXED_Y_TOLERANCE, FIXED_SPACE_THRESHOLD)
    };

    let mut lines = group_into_lines(chars, y_tolerance);
    if config.filter_watermarks {
        lines = filter_watermarks(lines, page.width);
    }

    let columns = match config.column_mode {
        ColumnMode::Auto => {
            let kept: Vec<CharInfo> = lines.into_iter().flat_map(|line| line.chars).collect();
            split_columns(kept, config.column_gap)
                .into_iter()
                .map(|column| group_into_lines(column, y_tolerance))
                .collect()
        }
        ColumnMode::None => vec![lines],
    };

    let mut out = Vec::new();
    for column in columns {
        let mut prev: Option<&LineInfo> = None;
        for line in &column {
            let text = line.text(space_threshold);
            if text.is_empty() {
                continue;
            }
            let starts_paragraph = match prev {
                None => true,
                Some(p) => {
                    let gap = p.y - line.y;
                    let limit = p.avg_height.max(line.avg_height) * config.paragraph_threshold;
                    config.paragraph_mode == ParagraphMode::Spacing && gap > limit
                }
            };
            out.push(TextLine {
                text,
                starts_paragraph,
            });
            prev = Some(line);
        }
    }

    Ok(out)
}

/// Plain text of a page: one line per text line, blank line between paragraphs
pub fn page_text(page: &Page, config: &TextLayoutConfig) -> Result<String> {
    let mut out = String::new();
    for (i, line) in layout_lines(page, config)?.iter().enumerate() {
        if i > 0 {
            out.push('\n');
            if line.starts_paragraph {
                out.push('\n');
            }
        }
        out.push_str(&line.text);
    }
    Ok(out)
}

/// Join lines into paragraphs and word-wrap them to `width` columns.
///
/// Paragraphs are separated by an empty line. Words longer than `width` are
/// split across lines.
pub fn wrap_lines(lines: &[TextLine], width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut paragraphs: Vec<Vec<&str>> = Vec::new();
    for line in lines {
        if line.starts_paragraph || paragraphs.is_empty() {
            paragraphs.push(Vec::new());
        }
        if let Some(words) = paragraphs.last_mut() {
            words.extend(line.text.split_whitespace());
        }
    }

    let mut out = Vec::new();
    for (i, words) in paragraphs.iter().enumerate() {
        if i > 0 {
            out.push(String::new());
        }
        let mut current = String::new();
        for word in words {
            let mut word: &str = word;
            loop {
                let word_len = word.chars().count();
                let current_len = current.chars().count();
                let needed = if current.is_empty() {
                    word_len
                } else {
                    current_len + 1 + word_len
                };
                if needed <= width {
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(word);
                    break;
                }
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    continue;
                }
                // Word alone is wider than the line
                let split = word
                    .char_indices()
                    .nth(width)
                    .map(|(idx, _)| idx)
                    .unwrap_or(word.len());
                out.push(word[..split].to_string());
                word = &word[split..];
                if word.is_empty() {
                    break;
                }
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

fn dynamic_thresholds(chars: &[CharInfo]) -> (f32, f32) {
    let mut heights: Vec<f32> = chars
        .iter()
        .filter(|c| c.height > 0.0)
        .map(|c| c.height)
        .collect();
    if heights.is_empty() {
        return (FIXED_Y_TOLERANCE, FIXED_SPACE_THRESHOLD);
    }
    heights.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let median = heights[heights.len() / 2];

    // Baseline jitter within a line stays well under half the glyph height
    ((median * 0.4).max(2.0), (median * 0.3).max(3.0))
}

fn group_into_lines(mut chars: Vec<CharInfo>, y_tolerance: f32) -> Vec<LineInfo> {
    // Top to bottom, then left to right
    chars.sort_by(|a, b| match b.y.partial_cmp(&a.y).unwrap_or(Ordering::Equal) {
        Ordering::Equal => a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal),
        other => other,
    });

    let mut lines = Vec::new();
    let mut current: Vec<CharInfo> = Vec::new();
    let mut current_y: Option<f32> = None;

    for ch in chars {
        match current_y {
            Some(y) if (y - ch.y).abs() <= y_tolerance => current.push(ch),
            _ => {
                if !current.is_empty() {
                    lines.push(LineInfo::new(std::mem::take(&mut current)));
                }
                current_y = Some(ch.y);
                current.push(ch);
            }
        }
    }
    if !current.is_empty() {
        lines.push(LineInfo::new(current));
    }
    lines
}

fn filter_watermarks(lines: Vec<LineInfo>, page_width: f32) -> Vec<LineInfo> {
    if page_width <= 0.0 || lines.len() < 2 {
        return lines;
    }
    let avg_height = lines.iter().map(|l| l.avg_height).sum::<f32>() / lines.len() as f32;
    let page_center = page_width / 2.0;
    let center_tolerance = page_width * 0.2;

    lines
        .into_iter()
        .filter(|line| {
            let is_centered = (line.center() - page_center).abs() < center_tolerance;
            let is_large = line.avg_height > avg_height * 1.5;
            let is_short = line.chars.len() < 30;
            !(is_centered && is_large && is_short)
        })
        .collect()
}

/// Split characters at the most frequent wide horizontal gap, left column first
fn split_columns(chars: Vec<CharInfo>, column_gap: f32) -> Vec<Vec<CharInfo>> {
    let mut xs: Vec<f32> = chars.iter().map(|c| c.x).collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    // Bucket gap midpoints to 10pt so nearby separators agree
    let mut buckets: BTreeMap<i32, usize> = BTreeMap::new();
    for pair in xs.windows(2) {
        if pair[1] - pair[0] >= column_gap {
            let mid = ((pair[0] + pair[1]) / 2.0) as i32;
            *buckets.entry((mid / 10) * 10).or_insert(0) += 1;
        }
    }

    let Some(separator) = buckets
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(bucket, _)| *bucket as f32)
    else {
        return vec![chars];
    };

    let (left, right): (Vec<CharInfo>, Vec<CharInfo>) = chars
        .into_iter()
        .partition(|c| c.x + c.width / 2.0 < separator);
    match (left.is_empty(), right.is_empty()) {
        (false, false) => vec![left, right],
        (true, _) => vec![right],
        (_, true) => vec![left],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;
    use pretty_assertions::assert_eq;

    fn page_with(lines: &[(&str, f32, f32, f32)]) -> Page {
        let mut page = Page::new(600.0, 800.0);
        for (text, x, y, size) in lines {
            page.push_text(text, *x, *y, *size);
        }
        page
    }

    #[test]
    fn test_lines_in_reading_order() {
        let page = page_with(&[
            ("second line", 50.0, 688.0, 10.0),
            ("first line", 50.0, 700.0, 10.0),
        ]);
        let text = page_text(&page, &TextLayoutConfig::default()).unwrap();
        assert_eq!(text, "first line\nsecond line");
    }

    #[test]
    fn test_paragraph_break_from_spacing() {
        let page = page_with(&[
            ("one", 50.0, 700.0, 10.0),
            ("two", 50.0, 688.0, 10.0),
            ("three", 50.0, 650.0, 10.0),
        ]);
        let text = page_text(&page, &TextLayoutConfig::default()).unwrap();
        assert_eq!(text, "one\ntwo\n\nthree");

        let config = TextLayoutConfig {
            paragraph_mode: ParagraphMode::None,
            ..TextLayoutConfig::default()
        };
        assert_eq!(page_text(&page, &config).unwrap(), "one\ntwo\nthree");
    }

    #[test]
    fn test_word_gap_inserts_space() {
        let mut page = Page::new(600.0, 800.0);
        page.push_text("left", 50.0, 700.0, 10.0);
        page.push_text("right", 90.0, 700.0, 10.0);
        let text = page_text(&page, &TextLayoutConfig::default()).unwrap();
        assert_eq!(text, "left right");
    }

    #[test]
    fn test_watermark_filtered() {
        let page = page_with(&[
            ("body text here", 50.0, 700.0, 10.0),
            ("more body text", 50.0, 688.0, 10.0),
            ("DRAFT", 240.0, 400.0, 48.0),
            ("closing words", 50.0, 676.0, 10.0),
        ]);
        let text = page_text(&page, &TextLayoutConfig::default()).unwrap();
        assert!(!text.contains("DRAFT"));

        let config = TextLayoutConfig {
            filter_watermarks: false,
            ..TextLayoutConfig::default()
        };
        assert!(page_text(&page, &config).unwrap().contains("DRAFT"));
    }

    #[test]
    fn test_two_columns_read_left_first() {
        let page = page_with(&[
            ("left a", 50.0, 700.0, 10.0),
            ("right a", 350.0, 700.0, 10.0),
            ("left b", 50.0, 688.0, 10.0),
            ("right b", 350.0, 688.0, 10.0),
        ]);
        let lines = layout_lines(&page, &TextLayoutConfig::default()).unwrap();
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["left a", "left b", "right a", "right b"]);
        assert!(lines[2].starts_paragraph);
    }

    #[test]
    fn test_malformed_char_fails() {
        let mut page = Page::new(600.0, 800.0);
        page.push_text("ok", 50.0, 700.0, 10.0);
        page.push_text("x", f32::INFINITY, 700.0, 10.0);
        assert!(layout_lines(&page, &TextLayoutConfig::default()).is_err());
    }

    #[test]
    fn test_empty_page() {
        let page = Page::new(600.0, 800.0);
        assert!(layout_lines(&page, &TextLayoutConfig::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_wrap_lines() {
        let lines = vec![
            TextLine {
                text: "the quick brown".to_string(),
                starts_paragraph: true,
            },
            TextLine {
                text: "fox jumps".to_string(),
                starts_paragraph: false,
            },
            TextLine {
                text: "over".to_string(),
                starts_paragraph: true,
            },
        ];
        assert_eq!(
            wrap_lines(&lines, 10),
            vec!["the quick", "brown fox", "jumps", "", "over"]
        );
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let lines = vec![TextLine {
            text: "a abcdefghij b".to_string(),
            starts_paragraph: true,
        }];
        assert_eq!(wrap_lines(&lines, 4), vec!["a", "abcd", "efgh", "ij b"]);
    }
}
