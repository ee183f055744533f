//! Text measurement and drawing behind a small trait, plus greedy wrapping.

use image::Rgba;

use super::canvas::Canvas;

/// Size and weight of a run of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub bold: bool,
}

impl TextStyle {
    pub fn regular(size: f32) -> Self {
        Self { size, bold: false }
    }

    pub fn bold(size: f32) -> Self {
        Self { size, bold: true }
    }
}

/// Measures and rasterizes single-line text.
///
/// `draw` places the top of the line box at `y`.
pub trait Typesetter: Send {
    fn measure(&mut self, text: &str, style: TextStyle) -> f32;

    fn draw(
        &mut self,
        canvas: &mut Canvas,
        text: &str,
        x: f32,
        y: f32,
        style: TextStyle,
        color: Rgba<u8>,
    );
}

/// Split `text` into lines no wider than `max_width`, one code point at a
/// time. A single code point wider than the limit gets its own line.
pub fn wrap_text(
    typesetter: &mut dyn Typesetter,
    text: &str,
    style: TextStyle,
    max_width: f32,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if typesetter.measure(&candidate, style) <= max_width {
            current = candidate;
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// First `n` code points of `s`.
pub fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Font-free typesetter drawing each glyph as a solid cell.
///
/// ASCII advances half an em, everything else a full em. Used when no
/// font faces are available and in tests, where metrics must be stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTypesetter;

impl BlockTypesetter {
    pub fn advance(ch: char, size: f32) -> f32 {
        if ch.is_ascii() {
            size * 0.5
        } else {
            size
        }
    }
}

impl Typesetter for BlockTypesetter {
    fn measure(&mut self, text: &str, style: TextStyle) -> f32 {
        text.chars().map(|ch| Self::advance(ch, style.size)).sum()
    }

    fn draw(
        &mut self,
        canvas: &mut Canvas,
        text: &str,
        x: f32,
        y: f32,
        style: TextStyle,
        color: Rgba<u8>,
    ) {
        let top = (y + style.size * 0.15).round() as i32;
        let bottom = (y + style.size * 0.95).round() as i32;
        let mut pen = x;
        for ch in text.chars() {
            let advance = Self::advance(ch, style.size);
            if !ch.is_whitespace() {
                let x0 = pen.round() as i32;
                let x1 = (pen + advance - 1.0).round() as i32;
                for py in top..bottom {
                    for px in x0..x1.max(x0 + 1) {
                        canvas.blend(px, py, color, 255);
                    }
                }
            }
            pen += advance;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_width() {
        let mut ts = BlockTypesetter;
        let style = TextStyle::regular(10.0);
        // ascii advances 5px
        let lines = wrap_text(&mut ts, "abcdefghij", style, 20.0);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn wrap_handles_wide_and_empty() {
        let mut ts = BlockTypesetter;
        let style = TextStyle::regular(10.0);
        assert!(wrap_text(&mut ts, "", style, 100.0).is_empty());
        // each CJK glyph is wider than the limit
        let lines = wrap_text(&mut ts, "你好", style, 5.0);
        assert_eq!(lines, vec!["你", "好"]);
    }

    #[test]
    fn truncation_counts_code_points() {
        assert_eq!(truncate_chars("主播晚上好呀呀", 4), "主播晚上");
        assert_eq!(truncate_chars("ab", 12), "ab");
    }

    #[test]
    fn block_draw_marks_pixels() {
        let mut canvas = Canvas::new(40, 20, Rgba([0, 0, 0, 255]));
        let mut ts = BlockTypesetter;
        ts.draw(
            &mut canvas,
            "A B",
            0.0,
            0.0,
            TextStyle::regular(16.0),
            Rgba([255, 255, 255, 255]),
        );
        assert_eq!(canvas.pixel(2, 8), Rgba([255, 255, 255, 255]));
        // the space cell stays empty
        assert_eq!(canvas.pixel(10, 8), Rgba([0, 0, 0, 255]));
    }
}
