//! Preview messages for checking the overlay without a live room.

use chrono::{DateTime, Local};

use crate::models::{GuardLevel, KindTag, Medal, Message, MessageKind};
use crate::services::History;

const SAMPLE_USER: &str = "测试用户";

/// Every kind, in the order they are seeded.
pub const ALL_KINDS: [KindTag; 8] = [
    KindTag::Enter,
    KindTag::Follow,
    KindTag::VipEnter,
    KindTag::Chat,
    KindTag::Gift,
    KindTag::Captain,
    KindTag::SuperChat,
    KindTag::Warning,
];

/// A representative message of `kind`, stamped `now`.
pub fn sample(kind: KindTag, now: DateTime<Local>) -> Message {
    match kind {
        KindTag::Chat => Message::new(
            MessageKind::Chat {
                medal: Some(Medal {
                    name: "测试".to_string(),
                    level: 20,
                }),
                guard: GuardLevel::Captain,
            },
            SAMPLE_USER,
            "这是一条测试弹幕",
            now,
        ),
        KindTag::Gift => Message::gift(SAMPLE_USER, "小电视飞船", 1, now),
        KindTag::SuperChat => Message::new(
            MessageKind::SuperChat { price: 30 },
            SAMPLE_USER,
            "这是一条测试SC消息，用于测试显示效果，这是第二行，用于测试换行效果。",
            now,
        ),
        KindTag::Enter => Message::new(MessageKind::Enter, SAMPLE_USER, "进入直播间", now),
        KindTag::Follow => Message::new(MessageKind::Follow, SAMPLE_USER, "关注了直播间", now),
        KindTag::VipEnter => Message::new(MessageKind::VipEnter, SAMPLE_USER, "", now),
        KindTag::Captain => Message::new(
            MessageKind::Captain {
                guard: GuardLevel::Captain,
            },
            SAMPLE_USER,
            "开通了舰长",
            now,
        ),
        KindTag::Warning => Message::new(
            MessageKind::Warning,
            "[警告]",
            "直播内容涉及敏感话题，请注意规范",
            now,
        ),
    }
}

/// Append one sample of every kind to `history`.
pub fn seed(history: &History) {
    let now = Local::now();
    for kind in ALL_KINDS {
        history.append_at(sample(kind, now), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_match_their_kind() {
        let now = Local::now();
        for kind in ALL_KINDS {
            assert_eq!(sample(kind, now).tag(), kind);
        }
        assert_eq!(sample(KindTag::Gift, now).text, "小电视飞船 x1");
    }

    #[test]
    fn seed_fills_history() {
        let history = History::new();
        seed(&history);
        assert_eq!(history.len(), ALL_KINDS.len());
        assert_eq!(history.snapshot().last_seq(), ALL_KINDS.len() as u64);
    }
}
