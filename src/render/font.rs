//! Font-backed typesetter using cosmic-text for shaping and swash for
//! rasterization.
//!
//! System fonts are loaded, plus an optional font file (typically a CJK
//! face) which then becomes the preferred family.

use std::collections::HashMap;
use std::path::Path;

use cosmic_text::{
    fontdb, Attrs, AttrsOwned, Buffer, Family, FontSystem, Metrics, Shaping, SwashCache,
    SwashContent, Weight,
};
use image::Rgba;
use tracing::{debug, info, warn};

use super::canvas::Canvas;
use super::text::{TextStyle, Typesetter};

/// Measurement cache is cleared once it grows past this many entries.
const MEASURE_CACHE_LIMIT: usize = 4096;

pub struct CosmicTypesetter {
    font_system: FontSystem,
    swash_cache: SwashCache,
    family: Option<String>,
    widths: HashMap<(String, u32, bool), f32>,
}

impl std::fmt::Debug for CosmicTypesetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmicTypesetter")
            .field("family", &self.family)
            .field("faces", &self.face_count())
            .finish()
    }
}

impl CosmicTypesetter {
    /// Load system fonts and, if given, the font file at `font_path`.
    pub fn new(font_path: Option<&Path>) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        let family = font_path.and_then(|path| match std::fs::read(path) {
            Ok(data) => {
                let family = family_name(&data);
                db.load_font_data(data);
                info!(path = %path.display(), family = ?family, "loaded overlay font");
                family
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read font file");
                None
            }
        });

        debug!(faces = db.len(), "font database ready");
        let font_system = FontSystem::new_with_locale_and_db("zh-CN".to_string(), db);

        Self {
            font_system,
            swash_cache: SwashCache::new(),
            family,
            widths: HashMap::new(),
        }
    }

    /// Number of faces available; zero means nothing can be drawn.
    pub fn face_count(&self) -> usize {
        self.font_system.db().len()
    }

    fn attrs(&self, style: TextStyle) -> AttrsOwned {
        let family = match self.family.as_deref() {
            Some(name) => Family::Name(name),
            None => Family::SansSerif,
        };
        let mut attrs = Attrs::new().family(family);
        if style.bold {
            attrs = attrs.weight(Weight::BOLD);
        }
        AttrsOwned::new(&attrs)
    }

    fn shape(&mut self, text: &str, style: TextStyle) -> Buffer {
        let metrics = Metrics::new(style.size, (style.size * 1.2).ceil());
        let attrs = self.attrs(style);
        let mut buffer = Buffer::new(&mut self.font_system, metrics);
        buffer.set_size(&mut self.font_system, None, None);
        buffer.set_text(
            &mut self.font_system,
            text,
            &attrs.as_attrs(),
            Shaping::Advanced,
            None,
        );
        buffer.shape_until_scroll(&mut self.font_system, false);
        buffer
    }
}

impl Typesetter for CosmicTypesetter {
    fn measure(&mut self, text: &str, style: TextStyle) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        let key = (text.to_string(), style.size.to_bits(), style.bold);
        if let Some(width) = self.widths.get(&key) {
            return *width;
        }
        let buffer = self.shape(text, style);
        let width = buffer
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0_f32, f32::max);
        if self.widths.len() >= MEASURE_CACHE_LIMIT {
            self.widths.clear();
        }
        self.widths.insert(key, width);
        width
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
        if text.is_empty() {
            return;
        }
        let buffer = self.shape(text, style);
        for run in buffer.layout_runs() {
            for glyph in run.glyphs.iter() {
                let pg = glyph.physical((x, y), 1.0);
                let Some(image) = self
                    .swash_cache
                    .get_image(&mut self.font_system, pg.cache_key)
                    .as_ref()
                else {
                    continue;
                };
                let origin_x = pg.x + image.placement.left;
                let origin_y = pg.y + run.line_y.round() as i32 - image.placement.top;
                blit_glyph(
                    canvas,
                    origin_x,
                    origin_y,
                    image.placement.width,
                    image.placement.height,
                    &image.data,
                    image.content,
                    color,
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn blit_glyph(
    canvas: &mut Canvas,
    origin_x: i32,
    origin_y: i32,
    width: u32,
    height: u32,
    data: &[u8],
    content: SwashContent,
    color: Rgba<u8>,
) {
    for gy in 0..height {
        for gx in 0..width {
            let px = origin_x + gx as i32;
            let py = origin_y + gy as i32;
            match content {
                SwashContent::Mask => {
                    let coverage = data.get((gy * width + gx) as usize).copied().unwrap_or(0);
                    canvas.blend(px, py, color, coverage);
                }
                SwashContent::SubpixelMask => {
                    let coverage = data
                        .get(((gy * width + gx) * 3) as usize)
                        .copied()
                        .unwrap_or(0);
                    canvas.blend(px, py, color, coverage);
                }
                SwashContent::Color => {
                    let idx = ((gy * width + gx) * 4) as usize;
                    let Some(rgba) = data.get(idx..idx + 4) else {
                        continue;
                    };
                    let alpha = (rgba[3] as u16 * color[3] as u16 / 255) as u8;
                    canvas.blend(px, py, Rgba([rgba[0], rgba[1], rgba[2], alpha]), 255);
                }
            }
        }
    }
}

fn family_name(data: &[u8]) -> Option<String> {
    let mut db = fontdb::Database::new();
    db.load_font_data(data.to_vec());
    let name = db
        .faces()
        .next()
        .and_then(|face| face.families.first())
        .map(|(name, _)| name.clone());
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_font_file_is_skipped() {
        let ts = CosmicTypesetter::new(Some(Path::new("/no/such/font.ttf")));
        assert!(ts.family.is_none());
    }

    #[test]
    fn family_name_of_garbage_is_none() {
        assert!(family_name(b"not a font").is_none());
    }

    #[test]
    fn measure_is_monotonic_when_faces_exist() {
        let mut ts = CosmicTypesetter::new(None);
        if ts.face_count() == 0 {
            return;
        }
        let style = TextStyle::regular(14.0);
        assert_eq!(ts.measure("", style), 0.0);
        let short = ts.measure("ab", style);
        let long = ts.measure("abcdef", style);
        assert!(long >= short);
        // served from the cache the second time
        assert_eq!(ts.measure("abcdef", style), long);
    }
}
