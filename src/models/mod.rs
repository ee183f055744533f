//! Data models for raw events, normalized messages, and session state.

pub mod event;
pub mod message;
pub mod session;

pub use event::*;
pub use message::*;
pub use session::*;
