//! Raw live-room events as delivered by the protocol client.

use serde::{Deserialize, Serialize};

/// One already-parsed platform event: the declared command and its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub cmd: String,
    pub body: serde_json::Value,
}

impl RawEvent {
    pub fn new(cmd: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            cmd: cmd.into(),
            body,
        }
    }

    /// Build from a command body that carries its own `cmd` field.
    pub fn from_body(body: serde_json::Value) -> Option<Self> {
        let cmd = body.get("cmd")?.as_str()?.to_string();
        Some(Self { cmd, body })
    }

    /// Command name without protocol suffixes (`DANMU_MSG:4:0:2` -> `DANMU_MSG`).
    pub fn command(&self) -> &str {
        self.cmd.split(':').next().unwrap_or_default()
    }
}
