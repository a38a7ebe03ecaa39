//! Per-run logger feeding the heartbeat message buffer.

use std::sync::Arc;

use tracing::Level;

use super::buffer::{LogEntry, MessageBuffer, MessageSeverity};

/// Cheaply cloneable handle binding one run's log channel to its buffer.
///
/// Messages at INFO/WARN/ERROR are buffered for the next heartbeat flush and
/// mirrored to the process-wide `tracing` subscriber tagged with the run
/// name. Other levels are ignored: never buffered, never an error. Callers
/// format the text before logging; nothing is deferred past the call.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_name: Arc<str>,
    buffer: Arc<MessageBuffer>,
}

impl RunLogger {
    pub fn new(run_name: &str, buffer: Arc<MessageBuffer>) -> Self {
        Self {
            run_name: Arc::from(run_name),
            buffer,
        }
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Buffer a message at the given level; TRACE/DEBUG are dropped.
    pub fn log(&self, level: Level, text: impl Into<String>) {
        let Some(severity) = severity_for(level) else {
            return;
        };
        let text = text.into();
        match severity {
            MessageSeverity::Info => tracing::info!("[{}] {}", self.run_name, text),
            MessageSeverity::Warning => tracing::warn!("[{}] {}", self.run_name, text),
            MessageSeverity::Error => tracing::error!("[{}] {}", self.run_name, text),
        }
        self.buffer.append(LogEntry::new(severity, text));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(Level::INFO, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.log(Level::WARN, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(Level::ERROR, text);
    }
}

fn severity_for(level: Level) -> Option<MessageSeverity> {
    if level == Level::INFO {
        Some(MessageSeverity::Info)
    } else if level == Level::WARN {
        Some(MessageSeverity::Warning)
    } else if level == Level::ERROR {
        Some(MessageSeverity::Error)
    } else {
        None
    }
}
