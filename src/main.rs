//! Entry point: load config, start the room session and the render loop,
//! and shut both down on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use danmaku_overlay::config::{spawn_reload, Config, DisplayConfig};
use danmaku_overlay::logging::{JournalSink, LogRelay, RelayLayer};
use danmaku_overlay::render::{
    BlockTypesetter, Compositor, CosmicTypesetter, FrameSource, PngSurface, RenderLoop, Typesetter,
};
use danmaku_overlay::services::{ConnectionManager, SessionConfig};
use danmaku_overlay::{samples, AppError, RelayClient};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DISPLAY_RELOAD_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(AppError::from)?;

    let relay = LogRelay::new();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(RelayLayer::new(relay.clone()))
        .init();

    if let Some(path) = &config.log_journal {
        match JournalSink::open(path) {
            Ok(sink) => relay.attach(Arc::new(sink)),
            Err(e) => warn!(path = %path.display(), error = %e, "log journal unavailable"),
        }
    }

    let display = DisplayConfig::load(&config.display_config_path);
    let typesetter: Box<dyn Typesetter> = {
        let cosmic = CosmicTypesetter::new(config.font_path.as_deref());
        if cosmic.face_count() > 0 {
            Box::new(cosmic)
        } else {
            warn!("no font faces found, drawing text as blocks");
            Box::new(BlockTypesetter)
        }
    };
    let (display_tx, display_rx) = watch::channel(display.clone());
    let reload = spawn_reload(config.display_config_path.clone(), DISPLAY_RELOAD_INTERVAL, display_tx);
    let compositor = Compositor::new(config.frame_width, config.frame_height, display, typesetter)
        .with_orientation(config.orientation);
    let surface = PngSurface::new(&config.frame_output);

    let session_config = SessionConfig {
        room_id: config.room_id,
        reconnect_delay: config.reconnect_delay,
        connect_timeout: config.connect_timeout,
    };
    let session = ConnectionManager::spawn(RelayClient::new(&config.relay_url), session_config);
    if config.demo_messages {
        samples::seed(session.history());
    }

    let source = FrameSource {
        room_id: config.room_id,
        history: session.history().clone(),
        session: session.subscribe(),
        display: display_rx,
    };
    let render = RenderLoop::new(compositor, Box::new(surface), source).spawn();

    info!(
        room_id = config.room_id,
        session_id = %session.id(),
        relay = %config.relay_url,
        output = %config.frame_output.display(),
        orientation = %config.orientation,
        "overlay running"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    reload.abort();
    session.stop();
    render.stop();
    session.join().await;
    let stats = render.join().await;
    info!(rendered = stats.rendered, failed = stats.failed, "overlay stopped");

    relay.shutdown();
    Ok(())
}
