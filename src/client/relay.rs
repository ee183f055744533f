//! WebSocket relay client: one JSON command body per text frame.
//!
//! The relay is expected to have already decoded the platform's framing, so
//! each text frame looks like `{"cmd": "DANMU_MSG", "info": [...]}`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::LiveClient;
use crate::error::ConnectError;
use crate::models::RawEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to `{base_url}?room_id={room}` and reads command bodies.
pub struct RelayClient {
    base_url: String,
    stream: Option<WsStream>,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stream: None,
        }
    }

    /// The handshake needs a request path, so a bare authority gets `/`.
    pub fn room_url(&self, room_id: u64) -> String {
        let mut url = self.base_url.clone();
        let authority = url.find("://").map_or(0, |i| i + 3);
        let query = url[authority..].find('?').map(|i| authority + i);
        let path_end = query.unwrap_or(url.len());
        if !url[authority..path_end].contains('/') {
            url.insert(path_end, '/');
        }
        let sep = if query.is_some() { '&' } else { '?' };
        format!("{}{}room_id={}", url, sep, room_id)
    }
}

#[async_trait]
impl LiveClient for RelayClient {
    async fn connect(&mut self, room_id: u64) -> Result<(), ConnectError> {
        let url = self.room_url(room_id);
        let (stream, _response) = connect_async(url.as_str()).await.map_err(map_ws_error)?;
        info!(url = %url, "relay connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<RawEvent>, ConnectError> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            let frame = match stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(map_ws_error(e));
                }
                None => {
                    self.stream = None;
                    return Ok(None);
                }
            };

            match frame {
                Message::Text(text) => match parse_frame(&text) {
                    Some(event) => return Ok(Some(event)),
                    None => warn!(len = text.len(), "dropping unparseable relay frame"),
                },
                Message::Ping(payload) => {
                    stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(map_ws_error)?;
                }
                Message::Close(frame) => {
                    debug!(?frame, "relay closed the session");
                    self.stream = None;
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        if let Some(mut stream) = self.stream.take() {
            stream.close(None).await.map_err(map_ws_error)?;
        }
        Ok(())
    }
}

/// Parse one text frame into an event; `None` for non-JSON or cmd-less frames.
pub(crate) fn parse_frame(text: &str) -> Option<RawEvent> {
    let body: serde_json::Value = serde_json::from_str(text).ok()?;
    RawEvent::from_body(body)
}

fn map_ws_error(e: tungstenite::Error) -> ConnectError {
    use tungstenite::Error;
    match e {
        Error::Io(io) => ConnectError::from(io),
        Error::ConnectionClosed | Error::AlreadyClosed => {
            ConnectError::Network("connection closed".to_string())
        }
        Error::Protocol(_)
        | Error::Url(_)
        | Error::Http(_)
        | Error::HttpFormat(_)
        | Error::Utf8
        | Error::Capacity(_) => ConnectError::Protocol(e.to_string()),
        other => ConnectError::classify(&other.to_string()),
    }
}
