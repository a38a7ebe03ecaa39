//! Buffered log entries awaiting the next heartbeat flush.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a buffered log entry, as understood by the tracking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSeverity {
    Info,
    Warning,
    Error,
}

/// One log line destined for the tracking service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub message_time: DateTime<Utc>,
    pub severity: MessageSeverity,
    pub message_text: String,
}

impl LogEntry {
    pub fn new(severity: MessageSeverity, text: impl Into<String>) -> Self {
        Self {
            message_time: Utc::now(),
            severity,
            message_text: text.into(),
        }
    }
}

/// Thread-safe append/drain buffer of log entries.
///
/// `append` may race `drain` freely: every entry lands in exactly one drain
/// result. The run body's log calls and the heartbeat flush are the two
/// writers; everything else in a run scope is single-owner.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    entries: Mutex<Vec<LogEntry>>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: LogEntry) {
        self.entries.lock().expect("message buffer poisoned").push(entry);
    }

    /// Atomically take and clear all buffered entries.
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock().expect("message buffer poisoned"))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().expect("message buffer poisoned").is_empty()
    }
}
