//! Pixel metrics derived from the configured font size.

use super::text::TextStyle;

/// Every spacing value the compositor uses, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutMetrics {
    pub font_size: i32,
    pub padding: i32,
    pub line_height: i32,
    pub item_gap: i32,
    pub bottom_margin: i32,
    pub header_padding_top: i32,
    pub header_height: i32,
    pub room_line_height: i32,
    pub header_total: i32,
    /// Minimum height of a highlight card.
    pub highlight_height: i32,
    pub time_width: i32,
}

fn scaled(fs: i32, factor: f32) -> i32 {
    (fs as f32 * factor) as i32
}

impl LayoutMetrics {
    pub fn for_font_size(font_size: u32) -> Self {
        let fs = font_size as i32;
        let line_height = fs + scaled(fs, 0.5).max(6);
        let item_gap = scaled(fs, 0.3).max(4);
        let header_padding_top = scaled(fs, 0.5).max(6);
        let header_height = fs + 8 + header_padding_top;
        let room_line_height = fs + 4;
        Self {
            font_size: fs,
            padding: scaled(fs, 0.7).max(8),
            line_height,
            item_gap,
            bottom_margin: scaled(fs, 0.3).max(4),
            header_padding_top,
            header_height,
            room_line_height,
            header_total: header_height + room_line_height + item_gap,
            highlight_height: line_height + scaled(fs, 0.4).max(6),
            time_width: scaled(fs, 2.8).max(35),
        }
    }

    /// Header clock.
    pub fn large(&self) -> TextStyle {
        TextStyle::regular((self.font_size + 4) as f32)
    }

    /// Body text.
    pub fn small(&self) -> TextStyle {
        TextStyle::regular(self.font_size as f32)
    }

    /// Highlight price.
    pub fn bold(&self) -> TextStyle {
        TextStyle::bold(self.font_size as f32)
    }
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self::for_font_size(14)
    }
}
