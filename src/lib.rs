//! Live-room danmaku aggregation and HUD overlay rendering.
//!
//! A session task keeps one live-room connection alive, normalizes raw
//! protocol commands into display messages, and appends them to a bounded
//! history (merging gift combos). A render loop reads snapshots of that
//! history plus the session status and composes fixed-size RGBA frames for
//! an overlay surface.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod render;
pub mod samples;
pub mod services;

pub use client::{LiveClient, RelayClient};
pub use config::{Config, DisplayConfig};
pub use error::{AppError, AppResult};
pub use render::{Compositor, OverlaySurface, PngSurface, RenderLoop};
pub use services::{ConnectionManager, History, SessionConfig, SessionHandle};
