//! Maps raw live-room events onto the closed set of message kinds.
//!
//! Unknown commands are ignored and malformed payloads are logged and
//! dropped; nothing here returns an error to the connection loop.

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::models::{GuardLevel, Medal, Message, MessageKind, RawEvent};

const UNKNOWN_USER: &str = "???";
const DEFAULT_GIFT_NAME: &str = "礼物";

/// Effect of one raw event on the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A message for the history (gifts go through the merge path).
    Message(Message),
    /// New audience count for the session state.
    OnlineCount(u64),
}

/// Normalize one event. Returns `None` for unknown, ignored, or malformed events.
pub fn normalize(event: &RawEvent, now: DateTime<Local>) -> Option<Update> {
    match try_normalize(event, now) {
        Ok(update) => update,
        Err(e) => {
            warn!(cmd = %event.cmd, error = %e, "dropping malformed event");
            None
        }
    }
}

fn try_normalize(event: &RawEvent, now: DateTime<Local>) -> Result<Option<Update>, NormalizeError> {
    let cmd = event.command();
    if !event.body.is_object() {
        return Err(NormalizeError::malformed(cmd, "body is not an object"));
    }
    let body = Field::of(&event.body);

    let update = match cmd {
        "DANMU_MSG" => Some(chat(cmd, body, now)?),
        "SEND_GIFT" => {
            let data = data_of(cmd, body)?;
            let user = user_or_unknown(data.key("uname").str());
            let gift_name = data
                .key("giftName")
                .str()
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_GIFT_NAME);
            let count = data.key("num").u64().unwrap_or(1);
            Some(Message::gift(user, strip_markup(gift_name), count, now))
        }
        "SUPER_CHAT_MESSAGE" => {
            let data = data_of(cmd, body)?;
            let user = user_or_unknown(data.key("user_info").key("uname").str());
            let text = strip_markup(data.key("message").str().unwrap_or_default());
            let price = data.key("price").u64().unwrap_or(0);
            Some(Message::new(MessageKind::SuperChat { price }, user, text, now))
        }
        "INTERACT_WORD" | "INTERACT_WORD_V2" => interaction(cmd, body, now)?,
        "ENTRY_EFFECT" => {
            let data = data_of(cmd, body)?;
            let user = strip_markup(data.key("copy_writing").str().unwrap_or_default());
            if user.is_empty() {
                None
            } else {
                Some(Message::new(MessageKind::VipEnter, user, "", now))
            }
        }
        "GUARD_BUY" => {
            let data = data_of(cmd, body)?;
            let user = user_or_unknown(data.key("username").str());
            let guard = GuardLevel::from_wire(data.key("guard_level").i64().unwrap_or(0));
            let title = match guard.title() {
                Some(title) => title.to_string(),
                None => data
                    .key("gift_name")
                    .str()
                    .map(strip_markup)
                    .unwrap_or_else(|| "舰长".to_string()),
            };
            Some(Message::new(
                MessageKind::Captain { guard },
                user,
                format!("开通了{}", title),
                now,
            ))
        }
        "WARNING" => Some(warning(cmd, body, "[警告]", "直播间收到警告", now)?),
        "CUT_OFF" => Some(warning(cmd, body, "[切断]", "直播被切断", now)?),
        "ROOM_LOCK" => Some(Message::new(
            MessageKind::Warning,
            "[封禁]",
            "直播间已被封禁",
            now,
        )),
        "ONLINE_RANK_COUNT" => {
            let data = data_of(cmd, body)?;
            return Ok(data
                .key("count")
                .u64()
                .filter(|count| *count > 0)
                .map(Update::OnlineCount));
        }
        other => {
            debug!(cmd = %other, "ignoring unhandled event");
            None
        }
    };

    Ok(update.map(Update::Message))
}

fn chat(cmd: &str, body: Field<'_>, now: DateTime<Local>) -> Result<Message, NormalizeError> {
    let info = body.key("info");
    if !info.is_array() {
        return Err(NormalizeError::malformed(cmd, "info is not an array"));
    }
    let user = user_or_unknown(info.index(2).index(1).str());
    let text = strip_markup(info.index(1).str().unwrap_or_default());

    // info[3] is [level, name, ...] or an empty list when no medal is worn.
    let medal_info = info.index(3);
    let medal = match (medal_info.index(0).u64(), medal_info.index(1).str()) {
        (Some(level), Some(name)) if !name.is_empty() => Some(Medal {
            name: name.to_string(),
            level: level as u32,
        }),
        _ => None,
    };
    let guard = GuardLevel::from_wire(info.index(7).i64().unwrap_or(0));

    Ok(Message::new(MessageKind::Chat { medal, guard }, user, text, now))
}

fn interaction(
    cmd: &str,
    body: Field<'_>,
    now: DateTime<Local>,
) -> Result<Option<Message>, NormalizeError> {
    let data = data_of(cmd, body)?;
    let payload = if data.key("pb_decoded").is_object() {
        data.key("pb_decoded")
    } else {
        data
    };

    let user = payload
        .key("uname")
        .str()
        .filter(|s| !s.is_empty())
        .or_else(|| payload.key("user_info").key("base").key("name").str());
    let user = user_or_unknown(user);

    let message = match payload.key("msg_type").i64().unwrap_or(1) {
        1 => Some(Message::new(MessageKind::Enter, user, "进入直播间", now)),
        2 => Some(Message::new(MessageKind::Follow, user, "关注了直播间", now)),
        other => {
            debug!(cmd = %cmd, msg_type = other, "ignoring interaction sub-kind");
            None
        }
    };
    Ok(message)
}

fn warning(
    cmd: &str,
    body: Field<'_>,
    label: &str,
    default_text: &str,
    now: DateTime<Local>,
) -> Result<Message, NormalizeError> {
    let data = body.key("data");
    let payload = if data.is_present() {
        if !data.is_object() {
            return Err(NormalizeError::malformed(cmd, "data is not an object"));
        }
        data
    } else {
        body
    };
    let text = payload
        .key("msg")
        .str()
        .map(strip_markup)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_text.to_string());
    Ok(Message::new(MessageKind::Warning, label, text, now))
}

/// The `data` object of a command body. Absent means all fields default.
fn data_of<'a>(cmd: &str, body: Field<'a>) -> Result<Field<'a>, NormalizeError> {
    let data = body.key("data");
    if data.is_present() && !data.is_object() {
        return Err(NormalizeError::malformed(cmd, "data is not an object"));
    }
    Ok(data)
}

fn user_or_unknown(user: Option<&str>) -> String {
    match user.map(strip_markup) {
        Some(user) if !user.is_empty() => user,
        _ => UNKNOWN_USER.to_string(),
    }
}

/// Remove the `<% ... %>` emphasis wrappers the platform puts around names.
pub fn strip_markup(text: &str) -> String {
    text.replace("<%", "").replace("%>", "").trim().to_string()
}

/// Optional view into a JSON value; missing steps stay missing.
#[derive(Debug, Clone, Copy)]
struct Field<'a>(Option<&'a Value>);

impl<'a> Field<'a> {
    fn of(value: &'a Value) -> Self {
        Field(Some(value))
    }

    fn key(self, key: &str) -> Self {
        Field(self.0.and_then(|v| v.get(key)))
    }

    fn index(self, index: usize) -> Self {
        Field(self.0.and_then(|v| v.get(index)))
    }

    fn is_present(self) -> bool {
        matches!(self.0, Some(v) if !v.is_null())
    }

    fn is_object(self) -> bool {
        matches!(self.0, Some(Value::Object(_)))
    }

    fn is_array(self) -> bool {
        matches!(self.0, Some(Value::Array(_)))
    }

    fn str(self) -> Option<&'a str> {
        self.0.and_then(Value::as_str)
    }

    fn i64(self) -> Option<i64> {
        match self.0? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn u64(self) -> Option<u64> {
        self.i64().map(|n| n.max(0) as u64)
    }
}
