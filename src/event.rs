use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Category of an [`LogEntry`], shown to the user next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    System,
    Info,
    Success,
    Warning,
    Error,
    DigitInput,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::System => write!(f, "system"),
            LogKind::Info => write!(f, "info"),
            LogKind::Success => write!(f, "success"),
            LogKind::Warning => write!(f, "warning"),
            LogKind::Error => write!(f, "error"),
            LogKind::DigitInput => write!(f, "digit_input"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}

/// Append-only record of what happened during the current call.
///
/// Entries keep insertion order; nothing is reordered or deduplicated.
/// The only way to remove entries is [`EventLog::clear`], which the session
/// runs when an ended call resets to idle.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, kind: LogKind, message: impl Into<String>) -> &LogEntry {
        self.entries.push(LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        });
        // just pushed
        &self.entries[self.entries.len() - 1]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: LogKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }
}
