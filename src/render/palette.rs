//! Overlay colours. Active/dim pairs switch once a message is no longer new.

use image::Rgba;

pub type Rgb = [u8; 3];

pub const BG: Rgb = [18, 18, 22];
pub const HEADER: Rgb = [200, 200, 210];
pub const HEADER_DIM: Rgb = [90, 95, 105];
pub const SEPARATOR: Rgb = [45, 48, 58];
pub const TIME: Rgb = [60, 65, 75];

pub const USER: Rgb = [90, 170, 255];
pub const USER_DIM: Rgb = [60, 110, 160];
pub const TEXT: Rgb = [225, 228, 235];
pub const TEXT_DIM: Rgb = [140, 145, 155];
pub const MEDAL: Rgb = [200, 150, 80];

pub const GIFT: Rgb = [255, 160, 80];
pub const GIFT_DIM: Rgb = [160, 110, 60];

pub const SC_BG: Rgb = [50, 45, 30];
pub const SC_BORDER: Rgb = [180, 140, 50];
pub const SC_TEXT: Rgb = [255, 240, 200];
pub const SC_USER: Rgb = [255, 200, 100];
pub const SC_PRICE: Rgb = [255, 180, 60];

pub const ENTER: Rgb = [70, 160, 110];
pub const ENTER_DIM: Rgb = [45, 100, 70];
pub const FOLLOW: Rgb = [240, 90, 140];
pub const FOLLOW_DIM: Rgb = [160, 60, 100];
pub const GUARD: Rgb = [255, 200, 70];
pub const GUARD_DIM: Rgb = [180, 140, 50];

pub const ONLINE: Rgb = [70, 190, 110];
pub const CONNECTING: Rgb = [240, 180, 60];
pub const RECONNECT: Rgb = [240, 110, 80];

pub const WARNING: Rgb = [255, 80, 80];

/// Opaque colour.
pub fn solid(rgb: Rgb) -> Rgba<u8> {
    Rgba([rgb[0], rgb[1], rgb[2], 255])
}

/// Opaque colour with each channel scaled by `factor` (0..=1).
pub fn shade(rgb: Rgb, factor: f32) -> Rgba<u8> {
    let f = factor.clamp(0.0, 1.0);
    let scale = |c: u8| (c as f32 * f) as u8;
    Rgba([scale(rgb[0]), scale(rgb[1]), scale(rgb[2]), 255])
}

/// Colour with an explicit alpha in 0..=1.
pub fn with_alpha(rgb: Rgb, alpha: f32) -> Rgba<u8> {
    let a = (alpha.clamp(0.0, 1.0) * 255.0) as u8;
    Rgba([rgb[0], rgb[1], rgb[2], a])
}

/// Active colour for new messages, dim otherwise.
pub fn pick(is_new: bool, active: Rgb, dim: Rgb) -> Rgb {
    if is_new {
        active
    } else {
        dim
    }
}
