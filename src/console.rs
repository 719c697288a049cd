use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::Source;

/// Receives console output produced inside a sandbox. Purely advisory:
/// nothing a sink does can change an evaluation's results.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, level: Source, text: &str);
}

/// Forwards sandbox console output to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, level: Source, text: &str) {
        match level {
            Source::Error => log::error!(target: "challenge_runner::console", "{}", text),
            Source::Warn => log::warn!(target: "challenge_runner::console", "{}", text),
            Source::Info => log::info!(target: "challenge_runner::console", "{}", text),
            _ => log::debug!(target: "challenge_runner::console", "{}", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub level: Source,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Keeps every line so callers can show the learner their own output.
#[derive(Debug, Default, Clone)]
pub struct CapturedConsole {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CapturedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.text).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl DiagnosticSink for CapturedConsole {
    fn record(&self, level: Source, text: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                level,
                text: text.to_string(),
                at: Utc::now(),
            });
        }
    }
}
