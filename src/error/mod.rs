//! Error types for the event pipeline, rendering, and configuration.
//!
//! None of these are fatal: connection errors drive the reconnect loop,
//! malformed events are dropped, and render errors skip a single tick.

use std::fmt;

use thiserror::Error;

/// Diagnostic class of a connection failure. Every class retries the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Network,
    Protocol,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::Protocol => "protocol",
            FailureKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Failure while connecting to or listening on the live room.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("connection timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection error: {0}")]
    Unknown(String),
}

impl ConnectError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ConnectError::Timeout => FailureKind::Timeout,
            ConnectError::Network(_) => FailureKind::Network,
            ConnectError::Protocol(_) => FailureKind::Protocol,
            ConnectError::Unknown(_) => FailureKind::Unknown,
        }
    }

    /// Classify an opaque error message from a protocol client.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            ConnectError::Timeout
        } else if lower.contains("connection") {
            ConnectError::Network(message.to_string())
        } else {
            ConnectError::Unknown(message.to_string())
        }
    }
}

impl From<std::io::Error> for ConnectError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => ConnectError::Timeout,
            _ => ConnectError::Network(e.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for ConnectError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ConnectError::Timeout
    }
}

/// A raw event whose shape does not match its declared type.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("malformed {cmd} event: {reason}")]
    Malformed { cmd: String, reason: String },
}

impl NormalizeError {
    pub fn malformed(cmd: &str, reason: impl Into<String>) -> Self {
        NormalizeError::Malformed {
            cmd: cmd.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure while composing a frame.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid frame size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}

/// Failure while handing a frame to the overlay surface.
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

/// Configuration that could not be loaded or applied.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration missing: {0}")]
    Missing(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced at startup or by a single render tick.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
}

pub type AppResult<T> = Result<T, AppError>;
