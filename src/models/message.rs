//! Normalized live-room messages.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Fan medal attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medal {
    pub name: String,
    pub level: u32,
}

/// Paid subscription tier. `0` on the wire means none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardLevel {
    None,
    Governor,
    Admiral,
    Captain,
}

impl GuardLevel {
    pub fn from_wire(level: i64) -> Self {
        match level {
            1 => GuardLevel::Governor,
            2 => GuardLevel::Admiral,
            3 => GuardLevel::Captain,
            _ => GuardLevel::None,
        }
    }

    /// Display name of the tier, e.g. "舰长".
    pub fn title(&self) -> Option<&'static str> {
        match self {
            GuardLevel::Governor => Some("总督"),
            GuardLevel::Admiral => Some("提督"),
            GuardLevel::Captain => Some("舰长"),
            GuardLevel::None => None,
        }
    }

    /// Bracketed badge drawn before a chat username.
    pub fn badge(&self) -> Option<&'static str> {
        match self {
            GuardLevel::Governor => Some("[总督]"),
            GuardLevel::Admiral => Some("[提督]"),
            GuardLevel::Captain => Some("[舰长]"),
            GuardLevel::None => None,
        }
    }
}

/// Closed set of message kinds with their kind-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    Chat {
        medal: Option<Medal>,
        guard: GuardLevel,
    },
    Gift {
        gift_name: String,
        gift_count: u64,
    },
    SuperChat {
        price: u64,
    },
    Enter,
    Follow,
    Captain {
        guard: GuardLevel,
    },
    VipEnter,
    Warning,
}

/// Discriminant of [`MessageKind`], used for visibility lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindTag {
    Chat,
    Gift,
    SuperChat,
    Enter,
    Follow,
    Captain,
    VipEnter,
    Warning,
}

impl MessageKind {
    pub fn tag(&self) -> KindTag {
        match self {
            MessageKind::Chat { .. } => KindTag::Chat,
            MessageKind::Gift { .. } => KindTag::Gift,
            MessageKind::SuperChat { .. } => KindTag::SuperChat,
            MessageKind::Enter => KindTag::Enter,
            MessageKind::Follow => KindTag::Follow,
            MessageKind::Captain { .. } => KindTag::Captain,
            MessageKind::VipEnter => KindTag::VipEnter,
            MessageKind::Warning => KindTag::Warning,
        }
    }
}

/// One display-ready entry of the history buffer.
///
/// `seq` is assigned by the history on append and identifies the entry for
/// its whole life; only gift entries are updated in place afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub(crate) seq: u64,
    pub user: String,
    pub text: String,
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl Message {
    pub fn new(
        kind: MessageKind,
        user: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            seq: 0,
            user: user.into(),
            text: text.into(),
            timestamp,
            kind,
        }
    }

    /// Gift entry with the `"{gift_name} x{count}"` display text.
    pub fn gift(
        user: impl Into<String>,
        gift_name: impl Into<String>,
        count: u64,
        timestamp: DateTime<Local>,
    ) -> Self {
        let gift_name = gift_name.into();
        let text = gift_text(&gift_name, count);
        Self::new(
            MessageKind::Gift {
                gift_name,
                gift_count: count,
            },
            user,
            text,
            timestamp,
        )
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn tag(&self) -> KindTag {
        self.kind.tag()
    }

    /// Age in seconds relative to `now`, never negative.
    pub fn age_secs(&self, now: DateTime<Local>) -> f64 {
        let millis = (now - self.timestamp).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }
}

pub(crate) fn gift_text(gift_name: &str, count: u64) -> String {
    format!("{} x{}", gift_name, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn guard_level_from_wire() {
        assert_eq!(GuardLevel::from_wire(1), GuardLevel::Governor);
        assert_eq!(GuardLevel::from_wire(3), GuardLevel::Captain);
        assert_eq!(GuardLevel::from_wire(0), GuardLevel::None);
        assert_eq!(GuardLevel::from_wire(9), GuardLevel::None);
        assert_eq!(GuardLevel::Captain.badge(), Some("[舰长]"));
        assert_eq!(GuardLevel::None.badge(), None);
    }

    #[test]
    fn gift_message_text() {
        let msg = Message::gift("B", "rocket", 2, Local::now());
        assert_eq!(msg.text, "rocket x2");
        assert_eq!(msg.tag(), KindTag::Gift);
    }

    #[test]
    fn age_is_clamped_at_zero() {
        let now = Local::now();
        let msg = Message::new(MessageKind::Enter, "A", "", now + Duration::seconds(2));
        assert_eq!(msg.age_secs(now), 0.0);
        let msg = Message::new(MessageKind::Enter, "A", "", now - Duration::milliseconds(1500));
        assert!((msg.age_secs(now) - 1.5).abs() < 1e-9);
    }
}
