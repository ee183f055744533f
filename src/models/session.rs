//! Connection status published by the session to the render loop.

use serde::{Deserialize, Serialize};

/// Value snapshot of one live-room session. Published as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub connected: bool,
    pub online_count: u64,
    pub reconnect_attempts: u32,
    pub running: bool,
}

/// Header status line, chosen by priority:
/// disconnected with attempts > disconnected > online count > connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Reconnecting(u32),
    Connecting,
    Online(u64),
    Connected,
}

impl From<&SessionState> for ConnectionStatus {
    fn from(state: &SessionState) -> Self {
        if !state.connected {
            if state.reconnect_attempts > 0 {
                ConnectionStatus::Reconnecting(state.reconnect_attempts)
            } else {
                ConnectionStatus::Connecting
            }
        } else if state.online_count > 0 {
            ConnectionStatus::Online(state.online_count)
        } else {
            ConnectionStatus::Connected
        }
    }
}

impl ConnectionStatus {
    pub fn label(&self) -> String {
        match self {
            ConnectionStatus::Reconnecting(n) => format!("重连({})", n),
            ConnectionStatus::Connecting => "连接中".to_string(),
            ConnectionStatus::Online(n) => format!("观众 {}", n),
            ConnectionStatus::Connected => "●".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_priority() {
        let s = SessionState {
            connected: false,
            online_count: 120,
            reconnect_attempts: 2,
            running: true,
        };
        assert_eq!(ConnectionStatus::from(&s), ConnectionStatus::Reconnecting(2));
        assert_eq!(ConnectionStatus::from(&s).label(), "重连(2)");

        let s = SessionState {
            reconnect_attempts: 0,
            ..s
        };
        assert_eq!(ConnectionStatus::from(&s), ConnectionStatus::Connecting);

        let s = SessionState {
            connected: true,
            ..s
        };
        assert_eq!(ConnectionStatus::from(&s), ConnectionStatus::Online(120));
        assert_eq!(ConnectionStatus::from(&s).label(), "观众 120");

        let s = SessionState {
            online_count: 0,
            ..s
        };
        assert_eq!(ConnectionStatus::from(&s), ConnectionStatus::Connected);
    }
}
