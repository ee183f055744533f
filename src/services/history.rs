//! Bounded, insertion-ordered message history with gift combo merging.
//!
//! The buffer is copy-on-write: `snapshot` hands out the current `Arc` and
//! `append` mutates through `Arc::make_mut`, so a reader never sees an entry
//! in the middle of an update.

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local};
use parking_lot::RwLock;
use tracing::debug;

use crate::models::{gift_text, Message, MessageKind};

/// Number of messages kept for display.
pub const HISTORY_CAPACITY: usize = 50;

/// Window in which repeated gifts from one user collapse into one entry.
pub const GIFT_COMBO_WINDOW: Duration = Duration::seconds(5);

/// What `append` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { seq: u64 },
    Merged { seq: u64, gift_count: u64 },
}

#[derive(Debug, Default)]
struct Buffer {
    entries: Arc<Vec<Message>>,
    last_seq: u64,
}

/// Shared handle to the session's message history. Cloning shares the buffer.
#[derive(Debug, Clone)]
pub struct History {
    capacity: usize,
    inner: Arc<RwLock<Buffer>>,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Arc::new(RwLock::new(Buffer::default())),
        }
    }

    pub fn append(&self, message: Message) -> AppendOutcome {
        self.append_at(message, Local::now())
    }

    /// Append `message` as of `now`. Gifts merge into a recent matching entry.
    pub fn append_at(&self, mut message: Message, now: DateTime<Local>) -> AppendOutcome {
        let mut buffer = self.inner.write();

        if let MessageKind::Gift {
            gift_name,
            gift_count: amount,
        } = &message.kind
        {
            let entries = Arc::make_mut(&mut buffer.entries);
            if let Some(existing) = find_combo(entries, &message.user, gift_name, now) {
                if let MessageKind::Gift {
                    gift_name,
                    gift_count,
                } = &mut existing.kind
                {
                    *gift_count += amount;
                    existing.text = gift_text(gift_name, *gift_count);
                    existing.timestamp = now;
                    debug!(user = %existing.user, gift = %gift_name, count = *gift_count, "gift combo merged");
                    return AppendOutcome::Merged {
                        seq: existing.seq,
                        gift_count: *gift_count,
                    };
                }
            }
        }

        buffer.last_seq += 1;
        let seq = buffer.last_seq;
        message.seq = seq;
        let capacity = self.capacity;
        let entries = Arc::make_mut(&mut buffer.entries);
        if entries.len() >= capacity {
            let overflow = entries.len() + 1 - capacity;
            entries.drain(..overflow);
        }
        entries.push(message);
        AppendOutcome::Appended { seq }
    }

    /// Immutable view of the buffer as of now, safe to hold across appends.
    pub fn snapshot(&self) -> Snapshot {
        let buffer = self.inner.read();
        Snapshot {
            entries: Arc::clone(&buffer.entries),
            last_seq: buffer.last_seq,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Sequence numbers keep increasing.
    pub fn clear(&self) {
        let mut buffer = self.inner.write();
        buffer.entries = Arc::new(Vec::new());
    }
}

/// Most recent gift from `user` for `gift_name` still inside the combo window.
fn find_combo<'a>(
    entries: &'a mut [Message],
    user: &str,
    gift_name: &str,
    now: DateTime<Local>,
) -> Option<&'a mut Message> {
    entries.iter_mut().rev().find(|m| {
        matches!(&m.kind, MessageKind::Gift { gift_name: name, .. } if name == gift_name)
            && m.user == user
            && now - m.timestamp < GIFT_COMBO_WINDOW
    })
}

/// Read-only copy of the history, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Arc<Vec<Message>>,
    last_seq: u64,
}

impl Snapshot {
    /// Sequence number of the newest message ever appended (0 when none).
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}

impl Deref for Snapshot {
    type Target = [Message];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}
