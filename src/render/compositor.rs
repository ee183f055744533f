//! Frame compositor: header, super chat highlights, and the scrolling
//! message list.
//!
//! The compositor owns the scroll animation and the frame-rate gate. Each
//! accepted frame is composed top-down and handed over in the configured
//! [`Orientation`].

use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Local};
use image::Rgba;

use super::canvas::{Canvas, Rect};
use super::layout::LayoutMetrics;
use super::palette::{self, pick, shade, solid};
use super::surface::{Frame, Orientation};
use super::text::{truncate_chars, wrap_text, TextStyle, Typesetter};
use crate::config::DisplayConfig;
use crate::error::RenderError;
use crate::models::{ConnectionStatus, KindTag, Message, MessageKind, SessionState};

pub const ACTIVE_FRAME_INTERVAL: Duration = Duration::from_millis(50);
pub const IDLE_FRAME_INTERVAL: Duration = Duration::from_millis(200);

/// Super chats stay pinned this long after arrival.
pub const HIGHLIGHT_SECS: f64 = 30.0;
const HIGHLIGHT_FADE_SECS: f64 = 5.0;
pub const MAX_HIGHLIGHTS: usize = 2;

const NEW_MESSAGE_SECS: f64 = 3.0;
const FADE_FLOOR: f32 = 0.4;
const FADE_OUT_SECS: f64 = 60.0;
const SLIDE_SECS: f64 = 0.2;
const SLIDE_DISTANCE: f64 = 30.0;

const SCROLL_EASE: f32 = 0.3;
const SCROLL_SNAP: f32 = 1.0;
const SCROLL_ACTIVE: f32 = 0.5;

/// Below this much room after the chat prefix the body starts on the next line.
const NARROW_TEXT_WIDTH: f32 = 50.0;

const PLACEHOLDER: &str = "等待弹幕...";
const WEEKDAYS: [&str; 7] = ["一", "二", "三", "四", "五", "六", "日"];

/// Animation and pacing state carried between frames.
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    pub scroll_offset: f32,
    pub target_scroll: f32,
    /// Highest history sequence number already accounted for.
    pub last_seen_seq: u64,
    pub last_render: Option<Instant>,
    observed_seq: u64,
}

impl RenderState {
    pub fn is_scrolling(&self) -> bool {
        (self.target_scroll - self.scroll_offset).abs() > SCROLL_ACTIVE
    }

    /// Distance the list still has to travel upward.
    pub fn scroll_residual(&self) -> f32 {
        (self.target_scroll - self.scroll_offset).max(0.0)
    }
}

/// One easing step toward `target`, snapping once within a pixel.
pub fn ease_scroll(offset: f32, target: f32) -> f32 {
    if offset >= target {
        return offset;
    }
    let next = offset + (target - offset) * SCROLL_EASE;
    if target - next < SCROLL_SNAP {
        target
    } else {
        next
    }
}

/// Highlight opacity: full until the last five seconds, then linear to zero.
pub fn highlight_alpha(age_secs: f64) -> f32 {
    let remaining = (HIGHLIGHT_SECS - age_secs).max(0.0);
    if remaining < HIGHLIGHT_FADE_SECS {
        (remaining / HIGHLIGHT_FADE_SECS) as f32
    } else {
        1.0
    }
}

/// The newest live super chats, oldest first, with their opacity.
pub fn select_highlights<'a>(
    messages: &'a [Message],
    display: &DisplayConfig,
    now: DateTime<Local>,
) -> Vec<(&'a Message, f32)> {
    if !display.shows(KindTag::SuperChat) {
        return Vec::new();
    }
    let live: Vec<(&Message, f64)> = messages
        .iter()
        .filter(|m| m.tag() == KindTag::SuperChat)
        .map(|m| (m, m.age_secs(now)))
        .filter(|(_, age)| *age < HIGHLIGHT_SECS)
        .collect();
    let skip = live.len().saturating_sub(MAX_HIGHLIGHTS);
    live.into_iter()
        .skip(skip)
        .map(|(m, age)| (m, highlight_alpha(age)))
        .collect()
}

/// Keep the longest newest-first suffix of `items` whose heights fit.
pub fn fit_newest<T: Copy>(
    items: &[T],
    available: i32,
    mut height_of: impl FnMut(T) -> i32,
) -> Vec<(T, i32)> {
    let mut kept = Vec::new();
    let mut total = 0;
    for item in items.iter().rev() {
        let height = height_of(*item);
        if total + height > available {
            break;
        }
        total += height;
        kept.push((*item, height));
    }
    kept.reverse();
    kept
}

/// `"{month}/{day} 周{weekday}"`.
pub fn header_date(now: DateTime<Local>) -> String {
    let weekday = WEEKDAYS[now.weekday().num_days_from_monday() as usize];
    format!("{}/{} 周{}", now.month(), now.day(), weekday)
}

/// Per-message age effects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Appearance {
    pub is_new: bool,
    pub fade: f32,
    /// Horizontal slide-in offset in pixels.
    pub slide: f32,
}

impl Appearance {
    pub fn at(age_secs: f64) -> Self {
        let age_secs = age_secs.max(0.0);
        let slide = if age_secs < SLIDE_SECS {
            ((1.0 - age_secs / SLIDE_SECS) * SLIDE_DISTANCE) as i32 as f32
        } else {
            0.0
        };
        Self {
            is_new: age_secs < NEW_MESSAGE_SECS,
            fade: ((1.0 - age_secs / FADE_OUT_SECS) as f32).max(FADE_FLOOR),
            slide,
        }
    }
}

/// Guard badge, medal, and username drawn before a chat body.
struct ChatPrefix {
    badge: Option<&'static str>,
    medal: Option<String>,
    user: String,
}

impl ChatPrefix {
    fn of(message: &Message) -> Self {
        let (badge, medal) = match &message.kind {
            MessageKind::Chat { medal, guard } => (
                guard.badge(),
                medal
                    .as_ref()
                    .map(|m| format!("[{}{}]", truncate_chars(&m.name, 4), m.level)),
            ),
            _ => (None, None),
        };
        Self {
            badge,
            medal,
            user: format!("{}: ", truncate_chars(&message.user, 12)),
        }
    }

    fn width(&self, typesetter: &mut dyn Typesetter, metrics: &LayoutMetrics) -> f32 {
        let style = metrics.small();
        let mut width = metrics.padding as f32;
        if let Some(badge) = self.badge {
            width += typesetter.measure(badge, style) + 2.0;
        }
        if let Some(medal) = &self.medal {
            width += typesetter.measure(medal, style) + 2.0;
        }
        width + typesetter.measure(&self.user, style)
    }
}

/// Height a message occupies in the list.
fn message_height(
    typesetter: &mut dyn Typesetter,
    metrics: &LayoutMetrics,
    message: &Message,
    max_width: f32,
) -> i32 {
    if message.tag() != KindTag::Chat {
        return metrics.line_height;
    }
    let prefix = ChatPrefix::of(message).width(typesetter, metrics);
    let remaining = max_width - prefix;
    if remaining < NARROW_TEXT_WIDTH {
        let lines = wrap_text(
            typesetter,
            &message.text,
            metrics.small(),
            max_width - metrics.padding as f32,
        );
        metrics.line_height * (1 + lines.len() as i32)
    } else {
        let lines = wrap_text(typesetter, &message.text, metrics.small(), remaining);
        metrics.line_height * (lines.len() as i32).max(1)
    }
}

pub struct Compositor {
    width: u32,
    height: u32,
    display: DisplayConfig,
    metrics: LayoutMetrics,
    orientation: Orientation,
    typesetter: Box<dyn Typesetter>,
    state: RenderState,
}

impl Compositor {
    pub fn new(
        width: u32,
        height: u32,
        display: DisplayConfig,
        typesetter: Box<dyn Typesetter>,
    ) -> Self {
        Self {
            width,
            height,
            metrics: LayoutMetrics::for_font_size(display.font_size),
            display,
            orientation: Orientation::default(),
            typesetter,
            state: RenderState::default(),
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn metrics(&self) -> &LayoutMetrics {
        &self.metrics
    }

    pub fn display_config(&self) -> &DisplayConfig {
        &self.display
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Recompute layout metrics when the size changes.
    pub fn set_font_size(&mut self, font_size: u32) {
        if font_size != self.metrics.font_size as u32 {
            self.metrics = LayoutMetrics::for_font_size(font_size);
        }
        self.display.font_size = font_size;
    }

    /// Replace the display settings. A change counts as new content, so the
    /// next `should_render` accepts immediately.
    pub fn set_display_config(&mut self, display: DisplayConfig) {
        if display == self.display {
            return;
        }
        self.set_font_size(display.font_size);
        self.display = display;
        self.state.last_render = None;
    }

    /// Frame-rate gate. New content or an unfinished scroll raises the rate
    /// from the idle to the active interval. Records `now` when accepting.
    pub fn should_render(&mut self, last_seq: u64, now: Instant) -> bool {
        let has_new = last_seq != self.state.last_seen_seq;
        self.state.observed_seq = last_seq;
        let interval = if has_new || self.state.is_scrolling() {
            ACTIVE_FRAME_INTERVAL
        } else {
            IDLE_FRAME_INTERVAL
        };
        match self.state.last_render {
            Some(prev) if now.saturating_duration_since(prev) < interval => false,
            _ => {
                self.state.last_render = Some(now);
                true
            }
        }
    }

    pub fn render(
        &mut self,
        messages: &[Message],
        room_id: u64,
        session: &SessionState,
    ) -> Result<Frame, RenderError> {
        self.render_at(messages, room_id, session, Local::now())
    }

    /// Compose one frame as seen at wall-clock `now`.
    pub fn render_at(
        &mut self,
        messages: &[Message],
        room_id: u64,
        session: &SessionState,
        now: DateTime<Local>,
    ) -> Result<Frame, RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }
        let m = self.metrics;
        let background = palette::with_alpha(palette::BG, self.display.bg_alpha);
        let mut canvas = Canvas::new(self.width, self.height, background);

        let header_bottom = self.draw_header(&mut canvas, room_id, session, now);

        let highlights = select_highlights(messages, &self.display, now);
        let list: Vec<&Message> = messages
            .iter()
            .filter(|msg| msg.tag() != KindTag::SuperChat && self.display.shows(msg.tag()))
            .collect();

        let highlight_bottom = if highlights.is_empty() {
            header_bottom
        } else {
            self.draw_highlights(&mut canvas, &highlights, header_bottom)
        };

        let separator_y = highlight_bottom + m.item_gap / 2;
        canvas.hline(
            m.padding,
            self.width as i32 - m.padding,
            separator_y,
            solid(palette::SEPARATOR),
        );

        let arrived = list
            .iter()
            .filter(|msg| msg.seq() > self.state.last_seen_seq)
            .count();
        if arrived > 0 {
            self.state.target_scroll += (arrived as i32 * m.line_height) as f32;
        }
        self.state.scroll_offset = ease_scroll(self.state.scroll_offset, self.state.target_scroll);
        let newest = messages.iter().map(Message::seq).max().unwrap_or(0);
        self.state.last_seen_seq = self
            .state
            .last_seen_seq
            .max(newest)
            .max(self.state.observed_seq);

        self.draw_list(&mut canvas, &list, highlight_bottom + m.item_gap, now);

        Ok(Frame::from_top_down(canvas.into_image(), self.orientation))
    }

    fn draw_header(
        &mut self,
        canvas: &mut Canvas,
        room_id: u64,
        session: &SessionState,
        now: DateTime<Local>,
    ) -> i32 {
        let m = self.metrics;
        let width = self.width as f32;
        let top = m.header_padding_top as f32;

        let clock = now.format("%H:%M").to_string();
        self.typesetter
            .draw(canvas, &clock, m.padding as f32, top, m.large(), solid(palette::HEADER));

        let date = header_date(now);
        let date_width = self.typesetter.measure(&date, m.small());
        self.typesetter.draw(
            canvas,
            &date,
            ((width - date_width) / 2.0).floor(),
            top + 2.0,
            m.small(),
            solid(palette::HEADER_DIM),
        );

        let status = ConnectionStatus::from(session);
        let color = match status {
            ConnectionStatus::Reconnecting(_) => palette::RECONNECT,
            ConnectionStatus::Connecting => palette::CONNECTING,
            ConnectionStatus::Online(_) | ConnectionStatus::Connected => palette::ONLINE,
        };
        let label = status.label();
        let label_width = self.typesetter.measure(&label, m.small());
        self.typesetter.draw(
            canvas,
            &label,
            width - m.padding as f32 - label_width,
            top + 2.0,
            m.small(),
            solid(color),
        );

        let room_y = top + (m.font_size + 8) as f32;
        self.typesetter.draw(
            canvas,
            &format!("#{}", room_id),
            m.padding as f32,
            room_y,
            m.small(),
            solid(palette::HEADER_DIM),
        );

        m.header_total
    }

    fn draw_highlights(
        &mut self,
        canvas: &mut Canvas,
        highlights: &[(&Message, f32)],
        start_y: i32,
    ) -> i32 {
        let m = self.metrics;
        let width = self.width as i32;
        let small = m.small();
        let mut y = start_y;

        for (message, alpha) in highlights {
            let alpha = *alpha;
            let price = match &message.kind {
                MessageKind::SuperChat { price } => *price,
                _ => 0,
            };
            let price_text = format!("¥{}", price);
            let price_width = self.typesetter.measure(&price_text, m.bold());
            let user_text = format!("{}: ", truncate_chars(&message.user, 10));
            let user_width = self.typesetter.measure(&user_text, small);

            let content_x = m.padding as f32 + 6.0 + price_width + 6.0 + user_width;
            let text_width = width as f32 - content_x - m.padding as f32 - 6.0;
            let mut lines = wrap_text(self.typesetter.as_mut(), &message.text, small, text_width);
            if lines.is_empty() {
                lines.push(String::new());
            }
            let card_height = m
                .highlight_height
                .max(lines.len() as i32 * m.line_height + m.item_gap * 2);

            let card_alpha = (200.0 * alpha) as u8;
            let [r, g, b] = palette::SC_BG;
            canvas.fill_rect(
                Rect::new(m.padding, y, width - m.padding + 1, y + card_height + 1),
                Rgba([r, g, b, card_alpha]),
            );
            canvas.fill_rect(
                Rect::new(m.padding, y, m.padding + 4, y + card_height + 1),
                shade(palette::SC_BORDER, alpha),
            );

            let mut text_y = (y + m.item_gap) as f32;
            let price_x = (m.padding + 8) as f32;
            let user_x = price_x + price_width + 6.0;
            self.typesetter.draw(
                canvas,
                &price_text,
                price_x,
                text_y,
                m.bold(),
                shade(palette::SC_PRICE, alpha),
            );
            self.typesetter.draw(
                canvas,
                &user_text,
                user_x,
                text_y,
                small,
                shade(palette::SC_USER, alpha),
            );

            let text_color = shade(palette::SC_TEXT, alpha);
            for (i, line) in lines.iter().enumerate() {
                let x = if i == 0 {
                    content_x + 2.0
                } else {
                    text_y += m.line_height as f32;
                    user_x
                };
                self.typesetter.draw(canvas, line, x, text_y, small, text_color);
            }

            y += card_height + m.item_gap;
        }
        y
    }

    fn draw_list(
        &mut self,
        canvas: &mut Canvas,
        list: &[&Message],
        start_y: i32,
        now: DateTime<Local>,
    ) {
        let m = self.metrics;
        let bottom = self.height as i32 - m.bottom_margin;
        let max_width = (self.width as i32 - m.time_width - m.padding) as f32;

        if list.is_empty() {
            self.typesetter.draw(
                canvas,
                PLACEHOLDER,
                m.padding as f32,
                (start_y + m.line_height) as f32,
                m.small(),
                solid(palette::HEADER_DIM),
            );
            return;
        }

        let typesetter = self.typesetter.as_mut();
        let visible = fit_newest(list, bottom - start_y, |msg| {
            message_height(typesetter, &m, msg, max_width)
        });

        // Pending scroll pushes the list down; it glides up as the offset eases.
        let shift = self.state.scroll_residual().min(m.line_height as f32).round() as i32;
        canvas.set_clip(Some(Rect::new(0, start_y, self.width as i32, self.height as i32)));
        let mut y = start_y;
        for (message, height) in visible {
            if y + height > bottom {
                break;
            }
            let look = Appearance::at(message.age_secs(now));
            y = self.draw_message(canvas, message, y + shift, look, max_width) - shift;
        }
        canvas.set_clip(None);
    }

    fn draw_message(
        &mut self,
        canvas: &mut Canvas,
        message: &Message,
        y: i32,
        look: Appearance,
        max_width: f32,
    ) -> i32 {
        let m = self.metrics;
        let small = m.small();

        let time = message.timestamp.format("%H:%M").to_string();
        self.typesetter.draw(
            canvas,
            &time,
            (self.width as i32 - m.time_width) as f32 + look.slide,
            y as f32,
            small,
            shade(palette::TIME, look.fade),
        );

        let user = truncate_chars(&message.user, 12);
        let (text, rgb) = match &message.kind {
            MessageKind::Chat { .. } => return self.draw_chat(canvas, message, y, look, max_width),
            MessageKind::SuperChat { .. } => return y + m.line_height,
            MessageKind::Gift { .. } => (
                format!("[礼物] {} {}", user, message.text),
                pick(look.is_new, palette::GIFT, palette::GIFT_DIM),
            ),
            MessageKind::Enter => (
                format!("[加入] {} 进入", user),
                pick(look.is_new, palette::ENTER, palette::ENTER_DIM),
            ),
            MessageKind::Follow => (
                format!("[关注] {} 关注了直播间", user),
                pick(look.is_new, palette::FOLLOW, palette::FOLLOW_DIM),
            ),
            MessageKind::VipEnter => (
                format!("[舰长] {}", message.user),
                pick(look.is_new, palette::GUARD, palette::GUARD_DIM),
            ),
            MessageKind::Captain { .. } => (
                format!("[上舰] {} {}", user, message.text),
                pick(look.is_new, palette::GUARD, palette::GUARD_DIM),
            ),
            MessageKind::Warning => (
                format!("{} {}", message.user, message.text),
                palette::WARNING,
            ),
        };
        self.typesetter.draw(
            canvas,
            &text,
            m.padding as f32 + look.slide,
            y as f32,
            small,
            shade(rgb, look.fade),
        );
        y + m.line_height
    }

    fn draw_chat(
        &mut self,
        canvas: &mut Canvas,
        message: &Message,
        y: i32,
        look: Appearance,
        max_width: f32,
    ) -> i32 {
        let m = self.metrics;
        let small = m.small();
        let prefix = ChatPrefix::of(message);
        let left = m.padding as f32 + look.slide;
        let mut x = left;

        if let Some(badge) = prefix.badge {
            self.draw_run(canvas, badge, &mut x, y, small, shade(palette::GUARD, look.fade));
            x += 2.0;
        }
        if let Some(medal) = &prefix.medal {
            let color = shade(palette::MEDAL, look.fade * 0.7);
            self.draw_run(canvas, medal, &mut x, y, small, color);
            x += 2.0;
        }
        let user_color = shade(
            pick(look.is_new, palette::USER, palette::USER_DIM),
            look.fade,
        );
        self.draw_run(canvas, &prefix.user, &mut x, y, small, user_color);

        let text_color = shade(
            pick(look.is_new, palette::TEXT, palette::TEXT_DIM),
            look.fade,
        );
        let remaining = max_width - (x - look.slide);
        let (mut y, first_x, wrap_width) = if remaining < NARROW_TEXT_WIDTH {
            (y + m.line_height, left, max_width - m.padding as f32)
        } else {
            (y, x, remaining)
        };

        let lines = wrap_text(self.typesetter.as_mut(), &message.text, small, wrap_width);
        if lines.is_empty() {
            return y + m.line_height;
        }
        for (i, line) in lines.iter().enumerate() {
            let x = if i == 0 { first_x } else { left };
            self.typesetter.draw(canvas, line, x, y as f32, small, text_color);
            y += m.line_height;
        }
        y
    }

    /// Draw `text` at `x` and advance `x` past it.
    fn draw_run(
        &mut self,
        canvas: &mut Canvas,
        text: &str,
        x: &mut f32,
        y: i32,
        style: TextStyle,
        color: Rgba<u8>,
    ) {
        self.typesetter.draw(canvas, text, *x, y as f32, style, color);
        *x += self.typesetter.measure(text, style);
    }
}
