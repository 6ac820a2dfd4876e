//! Fire-and-forget status reporting.
//!
//! The pipeline emits human-readable progress and error strings to a
//! [`StatusSink`]. The core never blocks on a sink and never depends on one
//! having a listener; a slow or absent consumer must not stall provisioning.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

/// Receiver of human-readable progress and error strings.
pub trait StatusSink: Send + Sync {
    fn status(&self, message: &str);

    fn error(&self, message: &str) {
        self.status(message);
    }
}

/// Sink that routes status lines into the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn status(&self, message: &str) {
        info!("{message}");
    }

    fn error(&self, message: &str) {
        warn!("{message}");
    }
}

/// Sink that drops everything. Used in tests and quiet runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn status(&self, _message: &str) {}
}

/// Terminal sink: a spinner whose message tracks the latest status line,
/// with errors printed above it.
pub struct SpinnerSink {
    bar: ProgressBar,
}

impl SpinnerSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Stop the spinner, leaving a final line behind.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for SpinnerSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for SpinnerSink {
    fn status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn error(&self, message: &str) {
        self.bar.println(format!("error: {message}"));
    }
}

/// A status line delivered over a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Progress(String),
    Error(String),
}

impl StatusEvent {
    pub fn message(&self) -> &str {
        match self {
            StatusEvent::Progress(m) | StatusEvent::Error(m) => m,
        }
    }
}

/// Sink that forwards events over a bounded channel without ever blocking.
///
/// When the channel is full or the receiver is gone the event is dropped; the
/// UI side is strictly an observer of the pipeline.
pub struct ChannelSink {
    tx: Sender<StatusEvent>,
}

impl ChannelSink {
    /// Create a sink and its receiving end with the given buffer capacity.
    pub fn bounded(capacity: usize) -> (ChannelSink, Receiver<StatusEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (ChannelSink { tx }, rx)
    }

    fn push(&self, event: StatusEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("status channel full, dropping: {}", event.message());
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl StatusSink for ChannelSink {
    fn status(&self, message: &str) {
        self.push(StatusEvent::Progress(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(StatusEvent::Error(message.to_string()));
    }
}
