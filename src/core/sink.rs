//! PT-011: Log sink - where user-facing compiler messages go.

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Debug => write!(f, "DEBUG"),
        }
    }
}

/// Receiver of compiler log lines.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Success => tracing::info!(outcome = "success", "{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Debug => tracing::debug!("{}", message),
        }
    }
}

/// Captures every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries().iter().filter(|(l, _)| *l == level).count()
    }

    /// Whether any line at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

/// Banner line between phases.
pub fn section(sink: &dyn LogSink, title: &str) {
    sink.log(LogLevel::Info, &format!("===== {} =====", title));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pt011_level_display() {
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
        assert_eq!(LogLevel::Success.to_string(), "SUCCESS");
    }

    #[test]
    fn test_pt011_memory_sink() {
        let sink = MemorySink::new();
        sink.log(LogLevel::Info, "one");
        sink.log(LogLevel::Error, "bad thing");
        section(&sink, "Verify");
        assert_eq!(sink.entries().len(), 3);
        assert_eq!(sink.count(LogLevel::Info), 2);
        assert!(sink.contains(LogLevel::Error, "bad"));
        assert!(!sink.contains(LogLevel::Info, "bad"));
        assert!(sink.contains(LogLevel::Info, "===== Verify ====="));
    }

    #[test]
    fn test_pt011_tracing_sink_does_not_panic() {
        let sink = TracingSink;
        for level in [
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Success,
            LogLevel::Debug,
        ] {
            sink.log(level, "message");
        }
    }
}
