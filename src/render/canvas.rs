//! RGBA drawing target with an optional clip rectangle.

use image::{Rgba, RgbaImage};

/// Axis-aligned rectangle, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Frame being composed. Rows are stored top-down.
pub struct Canvas {
    image: RgbaImage,
    bounds: Rect,
    clip: Rect,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        let bounds = Rect::new(0, 0, width as i32, height as i32);
        Self {
            image: RgbaImage::from_pixel(width, height, background),
            bounds,
            clip: bounds,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Restrict drawing to `rect`; `None` restores the full canvas.
    pub fn set_clip(&mut self, rect: Option<Rect>) {
        self.clip = match rect {
            Some(rect) => rect.intersect(&self.bounds),
            None => self.bounds,
        };
    }

    /// Overwrite every pixel of `rect` (no blending).
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        let area = rect.intersect(&self.clip);
        for y in area.y0..area.y1 {
            for x in area.x0..area.x1 {
                self.image.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    /// One-pixel horizontal line from `x0` to `x1` inclusive.
    pub fn hline(&mut self, x0: i32, x1: i32, y: i32, color: Rgba<u8>) {
        self.fill_rect(Rect::new(x0, y, x1 + 1, y + 1), color);
    }

    /// Source-over blend of `color` at `coverage` (0..=255) onto one pixel.
    pub fn blend(&mut self, x: i32, y: i32, color: Rgba<u8>, coverage: u8) {
        if coverage == 0 || !self.clip.contains(x, y) {
            return;
        }
        let src_a = (color[3] as f32 / 255.0) * (coverage as f32 / 255.0);
        if src_a <= 0.0 {
            return;
        }
        let dst = self.image.get_pixel_mut(x as u32, y as u32);
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        for c in 0..3 {
            let value = (color[c] as f32 * src_a + dst[c] as f32 * dst_a * (1.0 - src_a)) / out_a;
            dst[c] = value.round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.image.get_pixel(x, y)
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: Rgba<u8> = Rgba([18, 18, 22, 255]);

    #[test]
    fn fill_respects_clip_and_bounds() {
        let mut canvas = Canvas::new(10, 10, BG);
        canvas.set_clip(Some(Rect::new(0, 5, 10, 10)));
        canvas.fill_rect(Rect::new(-5, 0, 20, 20), Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(3, 4), BG);
        assert_eq!(canvas.pixel(3, 5), Rgba([255, 0, 0, 255]));
        canvas.set_clip(None);
        canvas.hline(0, 9, 0, Rgba([0, 255, 0, 255]));
        assert_eq!(canvas.pixel(9, 0), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn blend_full_and_partial_coverage() {
        let mut canvas = Canvas::new(2, 1, Rgba([0, 0, 0, 255]));
        canvas.blend(0, 0, Rgba([200, 100, 50, 255]), 255);
        assert_eq!(canvas.pixel(0, 0), Rgba([200, 100, 50, 255]));
        canvas.blend(1, 0, Rgba([200, 200, 200, 255]), 128);
        let px = canvas.pixel(1, 0);
        assert!(px[0] > 95 && px[0] < 105);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn blend_outside_is_ignored() {
        let mut canvas = Canvas::new(2, 2, BG);
        canvas.blend(-1, 0, Rgba([255, 255, 255, 255]), 255);
        canvas.blend(0, 5, Rgba([255, 255, 255, 255]), 255);
        assert_eq!(canvas.into_image().pixels().filter(|p| **p != BG).count(), 0);
    }
}
