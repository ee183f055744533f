//! Application configuration loaded from environment.

pub mod display;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::render::surface::Orientation;

pub use display::{spawn_reload, DisplayConfig};

/// Process configuration loaded from `.env` and environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Live room to join.
    pub room_id: u64,
    /// WebSocket relay that forwards decoded room commands.
    pub relay_url: String,
    /// Upper bound for one connect attempt.
    pub connect_timeout: Duration,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Font file added to the system fonts (CJK coverage recommended).
    pub font_path: Option<PathBuf>,
    /// JSON file with display toggles, font size, and background alpha.
    pub display_config_path: PathBuf,
    /// Where the PNG surface writes frames.
    pub frame_output: PathBuf,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Row order expected by the overlay consumer.
    pub orientation: Orientation,
    /// Log level: `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
    /// Optional file that receives relayed log records.
    pub log_journal: Option<PathBuf>,
    /// Seed the history with one sample message of each kind.
    pub demo_messages: bool,
}

impl Config {
    /// Load configuration from environment. Call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self, ConfigError> {
        let room_id = std::env::var("ROOM_ID")
            .map_err(|_| ConfigError::Missing("ROOM_ID".to_string()))?;
        let room_id = room_id
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ConfigError::Invalid("ROOM_ID must be a positive integer".to_string()))?;

        let relay_url =
            std::env::var("RELAY_URL").unwrap_or_else(|_| "ws://127.0.0.1:7790".to_string());
        let connect_timeout = Duration::from_secs(env_parse("CONNECT_TIMEOUT_SECS", 10)?);
        let reconnect_delay = Duration::from_millis(env_parse("RECONNECT_DELAY_MS", 3000)?);
        let font_path = std::env::var("FONT_PATH").ok().map(PathBuf::from);
        let display_config_path = std::env::var("DISPLAY_CONFIG")
            .unwrap_or_else(|_| "hud_display.json".to_string())
            .into();
        let frame_output = std::env::var("FRAME_OUTPUT")
            .unwrap_or_else(|_| "overlay_frame.png".to_string())
            .into();
        let frame_width = env_parse("FRAME_WIDTH", 450)?;
        let frame_height = env_parse("FRAME_HEIGHT", 400)?;
        let orientation = env_parse("FRAME_ORIENTATION", Orientation::TopDown)?;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_journal = std::env::var("LOG_JOURNAL").ok().map(PathBuf::from);
        let demo_messages = env_parse("DEMO_MESSAGES", false)?;

        Ok(Self {
            room_id,
            relay_url,
            connect_timeout,
            reconnect_delay,
            font_path,
            display_config_path,
            frame_output,
            frame_width,
            frame_height,
            orientation,
            log_level,
            log_journal,
            demo_messages,
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
