//! Frame handoff to the overlay surface.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{imageops, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, SurfaceError};

/// Row order of a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// First row is the top of the overlay.
    #[default]
    TopDown,
    /// First row is the bottom of the overlay (texture upload convention
    /// of some overlay runtimes).
    BottomUp,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopDown => write!(f, "top_down"),
            Self::BottomUp => write!(f, "bottom_up"),
        }
    }
}

impl FromStr for Orientation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top_down" | "topdown" => Ok(Self::TopDown),
            "bottom_up" | "bottomup" => Ok(Self::BottomUp),
            other => Err(ConfigError::Invalid(format!("FRAME_ORIENTATION = {}", other))),
        }
    }
}

/// Finished RGBA raster, rows already in `orientation` order.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbaImage,
    orientation: Orientation,
}

impl Frame {
    /// Wrap a top-down composed image, flipping it if the target wants
    /// bottom-up rows.
    pub fn from_top_down(mut image: RgbaImage, orientation: Orientation) -> Self {
        if orientation == Orientation::BottomUp {
            imageops::flip_vertical_in_place(&mut image);
        }
        Self { image, orientation }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA bytes in delivery order.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Consumer of rendered frames.
pub trait OverlaySurface: Send {
    /// Hidden surfaces are skipped without rendering.
    fn is_visible(&self) -> bool {
        true
    }

    fn update_texture(&mut self, frame: &Frame) -> Result<(), SurfaceError>;
}

/// Writes every frame to a PNG file for headless consumers.
///
/// Rows are written in delivery order. The file is replaced atomically so
/// readers never see a partial image.
#[derive(Debug)]
pub struct PngSurface {
    path: PathBuf,
    frames_written: u64,
}

impl PngSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "frame.png".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl OverlaySurface for PngSurface {
    fn update_texture(&mut self, frame: &Frame) -> Result<(), SurfaceError> {
        let tmp = self.temp_path();
        frame.image().save_with_format(&tmp, ImageFormat::Png)?;
        std::fs::rename(&tmp, &self.path)?;
        self.frames_written += 1;
        if self.frames_written == 1 {
            debug!(path = %self.path.display(), "first overlay frame written");
        }
        Ok(())
    }
}
