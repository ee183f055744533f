//! Live-room protocol client seam and the WebSocket relay implementation.

pub mod relay;

use async_trait::async_trait;

use crate::error::ConnectError;
use crate::models::RawEvent;

pub use relay::RelayClient;

/// A protocol client that joins one live room and yields its events.
///
/// The session drives one client at a time: `connect`, then `next_event`
/// until it fails or returns `Ok(None)`, then `connect` again.
#[async_trait]
pub trait LiveClient: Send {
    /// Join the room. Returns once events can be read.
    async fn connect(&mut self, room_id: u64) -> Result<(), ConnectError>;

    /// Next event, or `Ok(None)` when the remote side closed the session.
    async fn next_event(&mut self) -> Result<Option<RawEvent>, ConnectError>;

    /// Leave the room. Safe to call when not connected.
    async fn disconnect(&mut self) -> Result<(), ConnectError>;
}
