//! Log relay: forwards this crate's tracing events to an attachable sink.
//!
//! Records produced before a sink is attached are buffered (bounded, oldest
//! dropped) and flushed on attach. A record whose delivery fails goes back
//! into the buffer. After shutdown everything is dropped.

use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Records kept while no sink is attached.
pub const PENDING_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        match level {
            Level::ERROR => Severity::Error,
            Level::WARN => Severity::Warning,
            Level::INFO => Severity::Info,
            _ => Severity::Debug,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub message: String,
    pub severity: Severity,
}

impl LogRecord {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Receiver of relayed records. Implementations must not emit tracing
/// events from `deliver`.
pub trait LogSink: Send + Sync {
    fn deliver(&self, record: &LogRecord) -> io::Result<()>;
}

#[derive(Default)]
struct RelayInner {
    sink: Option<Arc<dyn LogSink>>,
    pending: VecDeque<LogRecord>,
    closed: bool,
}

impl RelayInner {
    fn hold(&mut self, record: LogRecord) {
        if self.pending.len() >= PENDING_LIMIT {
            self.pending.pop_front();
        }
        self.pending.push_back(record);
    }
}

/// Cloneable handle to the shared relay.
#[derive(Clone, Default)]
pub struct LogRelay {
    inner: Arc<Mutex<RelayInner>>,
}

impl LogRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, message: impl Into<String>, severity: Severity) {
        self.record(LogRecord::new(message, severity));
    }

    /// Deliver now, or hold until a sink accepts it.
    pub fn record(&self, record: LogRecord) {
        let sink = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            match inner.sink.clone() {
                Some(sink) => sink,
                None => {
                    inner.hold(record);
                    return;
                }
            }
        };
        if sink.deliver(&record).is_err() {
            let mut inner = self.inner.lock();
            if !inner.closed {
                inner.hold(record);
            }
        }
    }

    /// Flush everything held so far to `sink`, oldest first, then install it.
    /// Records arriving mid-flush are held and flushed in the next batch, so
    /// the sink sees them in order. Flush failures are dropped.
    pub fn attach(&self, sink: Arc<dyn LogSink>) {
        loop {
            let batch: Vec<LogRecord> = {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return;
                }
                if inner.pending.is_empty() {
                    inner.sink = Some(sink);
                    return;
                }
                inner.sink = None;
                inner.pending.drain(..).collect()
            };
            for record in &batch {
                let _ = sink.deliver(record);
            }
        }
    }

    /// Stop relaying. Held and future records are discarded.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.sink = None;
        inner.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

/// `tracing_subscriber` layer feeding a [`LogRelay`].
///
/// Only events whose target starts with this crate's name are relayed.
pub struct RelayLayer {
    relay: LogRelay,
    target_prefix: String,
}

impl RelayLayer {
    pub fn new(relay: LogRelay) -> Self {
        Self {
            relay,
            target_prefix: env!("CARGO_CRATE_NAME").to_string(),
        }
    }
}

impl<S> Layer<S> for RelayLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with(&self.target_prefix) {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.relay
            .record(LogRecord::new(visitor.finish(), Severity::from(*metadata.level())));
    }
}

/// Collects the message and `key=value` fields of an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        let mut line = self.message;
        for (key, value) in self.fields {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&key);
            line.push('=');
            line.push_str(&value);
        }
        line
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.push((field.name().to_string(), rendered));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }
}

/// Appends `[severity] message` lines to a file.
pub struct JournalSink {
    file: Mutex<File>,
}

impl JournalSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for JournalSink {
    fn deliver(&self, record: &LogRecord) -> io::Result<()> {
        let mut file = self.file.lock();
        writeln!(file, "[{}] {}", record.severity, record.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing_subscriber::prelude::*;

    #[derive(Default)]
    struct Collect {
        records: Mutex<Vec<LogRecord>>,
        failing: AtomicBool,
    }

    impl LogSink for Collect {
        fn deliver(&self, record: &LogRecord) -> io::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(io::Error::other("sink unavailable"));
            }
            self.records.lock().push(record.clone());
            Ok(())
        }
    }

    fn messages(sink: &Collect) -> Vec<String> {
        sink.records.lock().iter().map(|r| r.message.clone()).collect()
    }

    #[test]
    fn held_records_flush_on_attach() {
        let relay = LogRelay::new();
        relay.log("first", Severity::Info);
        relay.log("second", Severity::Error);
        assert_eq!(relay.pending_len(), 2);

        let sink = Arc::new(Collect::default());
        relay.attach(sink.clone());
        assert_eq!(relay.pending_len(), 0);
        relay.log("third", Severity::Warning);
        assert_eq!(messages(&sink), vec!["first", "second", "third"]);
        assert_eq!(sink.records.lock()[1].severity, Severity::Error);
    }

    /// Sink that logs back into the relay while the first record is flushed.
    struct Echo {
        relay: LogRelay,
        inner: Collect,
    }

    impl LogSink for Echo {
        fn deliver(&self, record: &LogRecord) -> io::Result<()> {
            if record.message == "first" {
                self.relay.log("during flush", Severity::Info);
            }
            self.inner.deliver(record)
        }
    }

    #[test]
    fn records_during_flush_follow_held_ones() {
        let relay = LogRelay::new();
        relay.log("first", Severity::Info);
        relay.log("second", Severity::Info);
        let sink = Arc::new(Echo {
            relay: relay.clone(),
            inner: Collect::default(),
        });
        relay.attach(sink.clone());
        relay.log("after", Severity::Info);
        assert_eq!(
            messages(&sink.inner),
            vec!["first", "second", "during flush", "after"]
        );
        assert_eq!(relay.pending_len(), 0);
    }

    #[test]
    fn pending_is_bounded_oldest_dropped() {
        let relay = LogRelay::new();
        for i in 0..(PENDING_LIMIT + 5) {
            relay.log(format!("m{}", i), Severity::Debug);
        }
        assert_eq!(relay.pending_len(), PENDING_LIMIT);
        let sink = Arc::new(Collect::default());
        relay.attach(sink.clone());
        let got = messages(&sink);
        assert_eq!(got.first().map(String::as_str), Some("m5"));
        assert_eq!(got.len(), PENDING_LIMIT);
    }

    #[test]
    fn failed_delivery_is_requeued() {
        let relay = LogRelay::new();
        let sink = Arc::new(Collect::default());
        sink.failing.store(true, Ordering::SeqCst);
        relay.attach(sink.clone());
        relay.log("lost?", Severity::Info);
        assert_eq!(relay.pending_len(), 1);

        sink.failing.store(false, Ordering::SeqCst);
        relay.attach(sink.clone());
        assert_eq!(messages(&sink), vec!["lost?"]);
    }

    #[test]
    fn shutdown_drops_everything() {
        let relay = LogRelay::new();
        relay.log("held", Severity::Info);
        relay.shutdown();
        relay.log("after", Severity::Info);
        assert_eq!(relay.pending_len(), 0);
        let sink = Arc::new(Collect::default());
        relay.attach(sink.clone());
        relay.log("ignored", Severity::Info);
        assert!(messages(&sink).is_empty());
    }

    #[test]
    fn layer_relays_crate_events_with_fields() {
        let relay = LogRelay::new();
        let sink = Arc::new(Collect::default());
        relay.attach(sink.clone());
        let subscriber = tracing_subscriber::registry().with(RelayLayer::new(relay.clone()));
        let dispatch = tracing::Dispatch::new(subscriber);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!(attempt = 2, "reconnecting after delay");
            tracing::info!(target: "hyper::proto", "not ours");
        });

        let records = sink.records.lock().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "reconnecting after delay attempt=2");
        assert_eq!(records[0].severity, Severity::Warning);
    }

    #[test]
    fn journal_appends_lines() {
        let path = std::env::temp_dir().join(format!("journal-{}.log", uuid::Uuid::new_v4()));
        let sink = JournalSink::open(&path).unwrap();
        sink.deliver(&LogRecord::new("connected to room", Severity::Info))
            .unwrap();
        sink.deliver(&LogRecord::new("connection timed out", Severity::Error))
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(text, "[info] connected to room\n[error] connection timed out\n");
    }
}
