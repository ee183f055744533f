//! Event pipeline: normalization, bounded history, and the live-room session.

pub mod connection;
pub mod history;
pub mod normalizer;

pub use connection::{ConnectionManager, SessionConfig, SessionHandle};
pub use history::{AppendOutcome, History, Snapshot, HISTORY_CAPACITY};
pub use normalizer::{normalize, Update};
