//! Live-room session: connect, listen, and reconnect after a fixed delay.
//!
//! One task per session owns the protocol client, the normalizer step, and
//! the only write access to the history. Status is published as a whole
//! [`SessionState`] through a watch channel.

use std::time::Duration;

use chrono::Local;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::client::LiveClient;
use crate::error::{ConnectError, FailureKind};
use crate::models::{KindTag, MessageKind, SessionState};
use crate::services::history::{AppendOutcome, History, Snapshot};
use crate::services::normalizer::{normalize, Update};

/// Delay between a failure and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Timing knobs for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub room_id: u64,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(room_id: u64) -> Self {
        Self {
            room_id,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives one [`LiveClient`] through connect / listen / reconnect.
pub struct ConnectionManager<C> {
    client: C,
    config: SessionConfig,
    history: History,
    state: watch::Sender<SessionState>,
    shutdown: watch::Receiver<bool>,
}

/// Owning handle for a running session task.
pub struct SessionHandle {
    id: Uuid,
    room_id: u64,
    history: History,
    state: watch::Receiver<SessionState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<C: LiveClient + 'static> ConnectionManager<C> {
    /// Start the session task with a fresh history.
    pub fn spawn(client: C, config: SessionConfig) -> SessionHandle {
        Self::spawn_with_history(client, config, History::new())
    }

    /// Start the session task writing into `history`.
    pub fn spawn_with_history(client: C, config: SessionConfig, history: History) -> SessionHandle {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(SessionState {
            running: true,
            ..SessionState::default()
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let manager = ConnectionManager {
            client,
            config,
            history: history.clone(),
            state: state_tx,
            shutdown: shutdown_rx,
        };
        let span = tracing::info_span!("session", session_id = %id, room_id = config.room_id);
        let task = tokio::spawn(manager.run().instrument(span));

        SessionHandle {
            id,
            room_id: config.room_id,
            history,
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(mut self) {
        let mut shutdown = self.shutdown.clone();
        let room_id = self.config.room_id;

        loop {
            if *shutdown.borrow() {
                break;
            }

            info!(room_id, "connecting to room");
            let outcome = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                outcome = self.connect_and_listen() => outcome,
            };

            self.state.send_modify(|s| s.connected = false);
            match outcome {
                Ok(()) => info!(room_id, "room closed by remote"),
                Err(e) => log_failure(&e),
            }

            if *shutdown.borrow() {
                break;
            }
            let attempt = self.bump_attempts();
            warn!(
                attempt,
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "reconnecting after delay"
            );
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "ignoring error while closing client");
        }
        self.state.send_modify(|s| {
            s.connected = false;
            s.running = false;
        });
        info!(room_id, "session stopped");
    }

    async fn connect_and_listen(&mut self) -> Result<(), ConnectError> {
        tokio::time::timeout(
            self.config.connect_timeout,
            self.client.connect(self.config.room_id),
        )
        .await??;

        self.state.send_modify(|s| {
            s.connected = true;
            s.reconnect_attempts = 0;
        });
        info!(room_id = self.config.room_id, "connected to room");

        while let Some(event) = self.client.next_event().await? {
            if let Some(update) = normalize(&event, Local::now()) {
                self.apply(update);
            }
        }
        Ok(())
    }

    fn apply(&self, update: Update) {
        match update {
            Update::OnlineCount(count) => {
                self.state.send_modify(|s| s.online_count = count);
            }
            Update::Message(message) => {
                let kind = message.tag();
                let price = match &message.kind {
                    MessageKind::SuperChat { price } => Some(*price),
                    _ => None,
                };
                let user = message.user.clone();
                let text = message.text.clone();
                match self.history.append(message) {
                    AppendOutcome::Appended { seq } => {
                        if kind == KindTag::Warning {
                            warn!(seq, label = %user, text = %text, "room warning");
                        } else {
                            info!(seq, ?kind, user = %user, text = %text, price, "message received");
                        }
                    }
                    AppendOutcome::Merged { seq, gift_count } => {
                        info!(seq, user = %user, gift_count, "gift combo");
                    }
                }
            }
        }
    }

    fn bump_attempts(&self) -> u32 {
        let mut attempt = 0;
        self.state.send_modify(|s| {
            s.reconnect_attempts += 1;
            attempt = s.reconnect_attempts;
        });
        attempt
    }
}

fn log_failure(e: &ConnectError) {
    match e.kind() {
        FailureKind::Timeout => error!(kind = %e.kind(), "connection timed out"),
        FailureKind::Network => error!(kind = %e.kind(), error = %e, "network connection failed"),
        FailureKind::Protocol | FailureKind::Unknown => {
            error!(kind = %e.kind(), error = %e, "connection error")
        }
    }
}

/// Resolves once shutdown is requested or the handle is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn room_id(&self) -> u64 {
        self.room_id
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn snapshot(&self) -> Snapshot {
        self.history.snapshot()
    }

    /// Current session status as one consistent value.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver for status updates, for the render loop.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Ask the session to stop. Idempotent and non-blocking.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Stop and wait for the session task to finish closing the client.
    pub async fn join(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(error = %e, "session task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawEvent;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted client: connect results are popped in order; once the script
    /// runs out every connect succeeds. After a successful connect, queued
    /// events are delivered and then the client idles forever.
    struct ScriptedClient {
        connects: VecDeque<Result<(), ConnectError>>,
        events: VecDeque<RawEvent>,
        close_after_events: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ScriptedClient {
        fn new(connects: Vec<Result<(), ConnectError>>) -> (Self, Arc<Mutex<Vec<&'static str>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    connects: connects.into(),
                    events: VecDeque::new(),
                    close_after_events: false,
                    log: log.clone(),
                },
                log,
            )
        }
    }

    #[async_trait]
    impl LiveClient for ScriptedClient {
        async fn connect(&mut self, _room_id: u64) -> Result<(), ConnectError> {
            self.log.lock().push("connect");
            self.connects.pop_front().unwrap_or(Ok(()))
        }

        async fn next_event(&mut self) -> Result<Option<RawEvent>, ConnectError> {
            if let Some(event) = self.events.pop_front() {
                return Ok(Some(event));
            }
            if self.close_after_events {
                return Ok(None);
            }
            std::future::pending().await
        }

        async fn disconnect(&mut self) -> Result<(), ConnectError> {
            self.log.lock().push("disconnect");
            Err(ConnectError::Network("already closed".to_string()))
        }
    }

    fn fail() -> Result<(), ConnectError> {
        Err(ConnectError::Network("Connection refused".to_string()))
    }

    fn connect_count(log: &Mutex<Vec<&'static str>>) -> usize {
        log.lock().iter().filter(|e| **e == "connect").count()
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_count_failures_and_reset_on_connect() {
        let (client, log) = ScriptedClient::new(vec![fail(), fail(), fail()]);
        let handle = ConnectionManager::spawn(client, SessionConfig::new(1));
        let mut state = handle.subscribe();

        let mut seen = Vec::new();
        let connected = state
            .wait_for(|s| {
                if seen.last() != Some(&s.reconnect_attempts) {
                    seen.push(s.reconnect_attempts);
                }
                s.connected
            })
            .await
            .unwrap()
            .clone();
        assert_eq!(seen, vec![0, 1, 2, 3, 0]);
        assert_eq!(connected.reconnect_attempts, 0);
        assert_eq!(connect_count(&log), 4);

        handle.join().await;
        assert_eq!(log.lock().last(), Some(&"disconnect"));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_waits_fixed_delay() {
        let (client, log) = ScriptedClient::new(vec![fail(), fail()]);
        let handle = ConnectionManager::spawn(client, SessionConfig::new(1));
        let mut state = handle.subscribe();

        let start = tokio::time::Instant::now();
        state.wait_for(|s| s.connected).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= DEFAULT_RECONNECT_DELAY * 2);
        assert!(elapsed < DEFAULT_RECONNECT_DELAY * 3);
        assert_eq!(connect_count(&log), 3);
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_delay_skips_next_attempt() {
        let (client, log) = ScriptedClient::new(vec![fail(), fail(), fail()]);
        let handle = ConnectionManager::spawn(client, SessionConfig::new(1));
        let mut state = handle.subscribe();

        state.wait_for(|s| s.reconnect_attempts == 1).await.unwrap();
        handle.stop();
        handle.stop();
        let mut state = handle.subscribe();
        let start = tokio::time::Instant::now();
        handle.join().await;

        assert!(start.elapsed() < DEFAULT_RECONNECT_DELAY);
        assert_eq!(connect_count(&log), 1);
        let last = *state.borrow_and_update();
        assert!(!last.running);
        assert!(!last.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_a_failure() {
        struct Hanging;

        #[async_trait]
        impl LiveClient for Hanging {
            async fn connect(&mut self, _room_id: u64) -> Result<(), ConnectError> {
                std::future::pending().await
            }
            async fn next_event(&mut self) -> Result<Option<RawEvent>, ConnectError> {
                Ok(None)
            }
            async fn disconnect(&mut self) -> Result<(), ConnectError> {
                Ok(())
            }
        }

        let handle = ConnectionManager::spawn(Hanging, SessionConfig::new(1));
        let mut state = handle.subscribe();
        state.wait_for(|s| s.reconnect_attempts == 2).await.unwrap();
        assert!(!handle.state().connected);
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn events_flow_into_history_and_state() {
        let (mut client, _log) = ScriptedClient::new(vec![]);
        client.events = vec![
            RawEvent::new("DANMU_MSG", json!({ "info": [[0], "hello", [1, "A"]] })),
            RawEvent::new("SEND_GIFT", json!({ "data": { "uname": "B", "giftName": "rocket", "num": 1 } })),
            RawEvent::new("SEND_GIFT", json!({ "data": { "uname": "B", "giftName": "rocket", "num": 2 } })),
            RawEvent::new("ONLINE_RANK_COUNT", json!({ "data": { "count": 88 } })),
            RawEvent::new("SEND_GIFT", json!("garbage")),
        ]
        .into();
        client.close_after_events = true;

        let handle = ConnectionManager::spawn(client, SessionConfig::new(7));
        let mut state = handle.subscribe();
        // Remote close after the events counts as one reconnect.
        state.wait_for(|s| s.reconnect_attempts == 1).await.unwrap();

        let snap = handle.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[1].text, "rocket x3");
        assert_eq!(handle.state().online_count, 88);
        handle.join().await;
    }

    #[test]
    fn stopped_resolves_only_after_stop() {
        let (tx, mut rx) = watch::channel(false);
        let mut fut = tokio_test::task::spawn(async move { stopped(&mut rx).await });
        tokio_test::assert_pending!(fut.poll());
        tx.send_replace(true);
        tokio_test::assert_ready!(fut.poll());
    }
}
