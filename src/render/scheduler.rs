//! Render loop: polls the history and session state on a fixed tick and
//! pushes accepted frames to the overlay surface.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::compositor::Compositor;
use super::surface::OverlaySurface;
use crate::config::DisplayConfig;
use crate::error::AppResult;
use crate::models::SessionState;
use crate::services::History;

pub const RENDER_TICK: Duration = Duration::from_millis(50);

/// Shared inputs the render loop reads each tick.
#[derive(Clone)]
pub struct FrameSource {
    pub room_id: u64,
    pub history: History,
    pub session: watch::Receiver<SessionState>,
    /// Display settings pushed by whoever controls the overlay.
    pub display: watch::Receiver<DisplayConfig>,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Hidden,
    Skipped,
    Rendered,
    Failed,
}

/// Frame counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub rendered: u64,
    pub failed: u64,
}

pub struct RenderLoop {
    compositor: Compositor,
    surface: Box<dyn OverlaySurface>,
    source: FrameSource,
    tick: Duration,
}

impl RenderLoop {
    pub fn new(compositor: Compositor, surface: Box<dyn OverlaySurface>, source: FrameSource) -> Self {
        Self {
            compositor,
            surface,
            source,
            tick: RENDER_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    /// Run one iteration: apply display updates, gate, compose, deliver.
    /// Errors are logged and reported in the outcome; they never end the loop.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.source.display.has_changed().unwrap_or(false) {
            let updated = self.source.display.borrow_and_update().clone();
            debug!(font_size = updated.font_size, "display settings updated");
            self.compositor.set_display_config(updated);
        }
        if !self.surface.is_visible() {
            return TickOutcome::Hidden;
        }
        match self.render_frame(now) {
            Ok(true) => TickOutcome::Rendered,
            Ok(false) => TickOutcome::Skipped,
            Err(e) => {
                warn!(error = %e, "overlay frame failed");
                TickOutcome::Failed
            }
        }
    }

    fn render_frame(&mut self, now: Instant) -> AppResult<bool> {
        let snapshot = self.source.history.snapshot();
        if !self.compositor.should_render(snapshot.last_seq(), now) {
            return Ok(false);
        }
        let session = *self.source.session.borrow();
        let frame = self.compositor.render(&snapshot, self.source.room_id, &session)?;
        self.surface.update_texture(&frame)?;
        Ok(true)
    }

    pub fn spawn(self) -> RenderLoopHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        RenderLoopHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> RenderStats {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = RenderStats::default();
        info!(tick_ms = self.tick.as_millis() as u64, "render loop started");

        let mut this = self;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = interval.tick() => {}
            }
            // shaping, encoding and file output block; keep them off the async workers
            let joined = tokio::task::spawn_blocking(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| this.tick(Instant::now())));
                (this, outcome)
            })
            .await;
            let outcome = match joined {
                Ok((returned, outcome)) => {
                    this = returned;
                    outcome
                }
                Err(e) => {
                    error!(error = %e, "render worker lost");
                    break;
                }
            };
            match outcome {
                Ok(TickOutcome::Rendered) => stats.rendered += 1,
                Ok(TickOutcome::Failed) => stats.failed += 1,
                Ok(TickOutcome::Hidden | TickOutcome::Skipped) => {}
                Err(_) => {
                    stats.failed += 1;
                    error!("render tick panicked; continuing");
                }
            }
        }

        debug!(rendered = stats.rendered, failed = stats.failed, "render loop stopped");
        stats
    }
}

/// Owning handle for the render task.
pub struct RenderLoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<RenderStats>,
}

impl RenderLoopHandle {
    /// Idempotent, non-blocking.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn join(self) -> RenderStats {
        self.stop();
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "render task ended abnormally");
                RenderStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;
    use crate::models::{GuardLevel, Message, MessageKind};
    use crate::render::surface::Frame;
    use crate::render::text::BlockTypesetter;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingSurface {
        frames: Arc<Mutex<Vec<(u32, u32)>>>,
        hidden: bool,
        failing: bool,
    }

    impl OverlaySurface for RecordingSurface {
        fn is_visible(&self) -> bool {
            !self.hidden
        }

        fn update_texture(&mut self, frame: &Frame) -> Result<(), SurfaceError> {
            if self.failing {
                return Err(SurfaceError::Io(std::io::Error::other("device lost")));
            }
            self.frames.lock().push((frame.width(), frame.height()));
            Ok(())
        }
    }

    struct Inputs {
        _session: watch::Sender<SessionState>,
        display: watch::Sender<DisplayConfig>,
    }

    fn render_loop(surface: impl OverlaySurface + 'static, history: History) -> (RenderLoop, Inputs) {
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (display_tx, display_rx) = watch::channel(DisplayConfig::default());
        let compositor = Compositor::new(120, 80, DisplayConfig::default(), Box::new(BlockTypesetter));
        let source = FrameSource {
            room_id: 5,
            history,
            session: state_rx,
            display: display_rx,
        };
        let inputs = Inputs {
            _session: state_tx,
            display: display_tx,
        };
        (RenderLoop::new(compositor, Box::new(surface), source), inputs)
    }

    fn chat(text: &str) -> Message {
        Message::new(
            MessageKind::Chat {
                medal: None,
                guard: GuardLevel::None,
            },
            "A",
            text,
            chrono::Local::now(),
        )
    }

    #[test]
    fn tick_gates_and_delivers() {
        let surface = RecordingSurface::default();
        let frames = surface.frames.clone();
        let history = History::new();
        let (mut lp, _state) = render_loop(surface, history.clone());

        let t0 = Instant::now();
        assert_eq!(lp.tick(t0), TickOutcome::Rendered);
        assert_eq!(lp.tick(t0 + Duration::from_millis(60)), TickOutcome::Skipped);

        history.append(chat("hi"));
        assert_eq!(lp.tick(t0 + Duration::from_millis(60)), TickOutcome::Rendered);
        assert_eq!(frames.lock().as_slice(), &[(120, 80), (120, 80)]);
    }

    #[test]
    fn hidden_and_failing_surfaces() {
        let hidden = RecordingSurface {
            hidden: true,
            ..RecordingSurface::default()
        };
        let (mut lp, _state) = render_loop(hidden, History::new());
        assert_eq!(lp.tick(Instant::now()), TickOutcome::Hidden);

        let failing = RecordingSurface {
            failing: true,
            ..RecordingSurface::default()
        };
        let (mut lp, _state) = render_loop(failing, History::new());
        let t0 = Instant::now();
        assert_eq!(lp.tick(t0), TickOutcome::Failed);
        // a failed frame does not stop later ticks
        assert_eq!(lp.tick(t0 + Duration::from_millis(250)), TickOutcome::Failed);
    }

    #[tokio::test]
    async fn spawned_loop_renders_until_stopped() {
        let surface = RecordingSurface::default();
        let frames = surface.frames.clone();
        let (lp, _state) = render_loop(surface, History::new());
        let handle = lp.with_tick(Duration::from_millis(5)).spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop();
        handle.stop();
        let stats = handle.join().await;
        assert!(stats.rendered >= 1);
        assert_eq!(stats.rendered as usize, frames.lock().len());
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn display_update_applies_on_next_tick() {
        let history = History::new();
        history.append(chat("hi"));
        let (mut lp, inputs) = render_loop(RecordingSurface::default(), history);

        let t0 = Instant::now();
        assert_eq!(lp.tick(t0), TickOutcome::Rendered);
        assert_eq!(lp.tick(t0 + Duration::from_millis(10)), TickOutcome::Skipped);

        inputs.display.send_replace(DisplayConfig {
            show_chat: false,
            font_size: 18,
            ..DisplayConfig::default()
        });
        assert_eq!(lp.tick(t0 + Duration::from_millis(20)), TickOutcome::Rendered);
        let display = lp.compositor_mut().display_config().clone();
        assert!(!display.show_chat);
        assert_eq!(display.font_size, 18);
        assert_eq!(lp.compositor_mut().metrics().font_size as u32, 18);
    }

    /// Panics on its first frame, then records like `RecordingSurface`.
    struct FlakySurface {
        panicked: AtomicBool,
        frames: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl OverlaySurface for FlakySurface {
        fn update_texture(&mut self, frame: &Frame) -> Result<(), SurfaceError> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("texture upload blew up");
            }
            self.frames.lock().push((frame.width(), frame.height()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn loop_survives_a_panicking_tick() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let surface = FlakySurface {
            panicked: AtomicBool::new(false),
            frames: frames.clone(),
        };
        let history = History::new();
        let (lp, _inputs) = render_loop(surface, history.clone());
        let handle = lp.with_tick(Duration::from_millis(5)).spawn();

        // the idle gate reopens after 200ms; new content reopens it sooner
        let deadline = Instant::now() + Duration::from_secs(3);
        while frames.lock().is_empty() && Instant::now() < deadline {
            history.append(chat("still here"));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let stats = handle.join().await;
        assert_eq!(stats.failed, 1);
        assert!(stats.rendered >= 1);
        assert_eq!(stats.rendered as usize, frames.lock().len());
    }
}
