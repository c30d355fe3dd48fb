// Log sink for transfer progress and warnings
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives the operator-facing messages produced while storing a package.
///
/// Message text is stable: hosts may match on it.
pub trait LogSink: Send + Sync {
    /// Progress message
    fn message(&self, text: &str);

    /// Non-fatal problem
    fn warn(&self, text: &str);

    /// Fatal problem for one storage
    fn error(&self, text: &str);
}

/// Forwards messages to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn message(&self, text: &str) {
        tracing::info!("{}", text);
    }

    fn warn(&self, text: &str) {
        tracing::warn!("{}", text);
    }

    fn error(&self, text: &str) {
        tracing::error!("{}", text);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Message,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub text: String,
}

/// In-memory sink; also forwards to `tracing` so nothing is lost
#[derive(Debug, Default, Clone)]
pub struct CapturedLog {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl CapturedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far
    pub fn events(&self) -> Vec<LogEvent> {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.texts(LogLevel::Message)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.texts(LogLevel::Warn)
    }

    pub fn errors(&self) -> Vec<String> {
        self.texts(LogLevel::Error)
    }

    fn texts(&self, level: LogLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.text)
            .collect()
    }

    fn push(&self, level: LogLevel, text: &str) {
        self.lock().push(LogEvent {
            level,
            text: text.to_string(),
        });
    }

    /// A panic while recording must not lose what was already captured
    fn lock(&self) -> MutexGuard<'_, Vec<LogEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for CapturedLog {
    fn message(&self, text: &str) {
        TracingSink.message(text);
        self.push(LogLevel::Message, text);
    }

    fn warn(&self, text: &str) {
        TracingSink.warn(text);
        self.push(LogLevel::Warn, text);
    }

    fn error(&self, text: &str) {
        TracingSink.error(text);
        self.push(LogLevel::Error, text);
    }
}
