use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{self, schema::LoggingConfig};

// ---------------------------------------------------------------------------
// Event log entry (JSONL)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ChatTurn,
    ToolCall,
    Notification,
    FrameError,
    Connection,
}

/// A single entry in the event log (`~/.voltguard/events.jsonl`).
///
/// `detail` depends on the kind: the outcome of a chat turn, the tool name,
/// the notification level, the frame error message, or the connection
/// target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub timestamp: String,
    pub kind: EventKind,
    #[serde(default)]
    pub detail: String,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latency_ms: Option<u64>,
    /// Number of items involved (tool calls in a turn, frames received, …).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub count: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl EventEntry {
    pub fn new(kind: EventKind, detail: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            kind,
            detail: detail.into(),
            success,
            latency_ms: None,
            count: None,
        }
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }

    pub fn count(mut self, n: u64) -> Self {
        self.count = Some(n);
        self
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Append-only JSONL event log. Logging never fails the caller.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    pub fn from_config(config: &LoggingConfig) -> Self {
        let path = if config.enabled {
            config::expand_tilde(&config.path)
        } else {
            None
        };
        Self { path }
    }

    /// Log to an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A log that discards everything.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, entry: &EventEntry) {
        if let Some(path) = &self.path {
            let _ = append_entry(path, entry);
        }
    }

    pub fn chat_turn(&self, outcome: &str, success: bool, latency_ms: u64, tool_calls: usize) {
        self.record(
            &EventEntry::new(EventKind::ChatTurn, outcome, success)
                .latency_ms(latency_ms)
                .count(tool_calls as u64),
        );
    }

    pub fn tool_call(&self, name: &str, success: bool, latency_ms: u64) {
        self.record(&EventEntry::new(EventKind::ToolCall, name, success).latency_ms(latency_ms));
    }

    pub fn notification(&self, level: &str) {
        self.record(&EventEntry::new(EventKind::Notification, level, true));
    }

    /// One entry per feed run; `errors` is the run's total.
    pub fn frame_error(&self, last_message: &str, errors: u64) {
        self.record(&EventEntry::new(EventKind::FrameError, last_message, false).count(errors));
    }

    pub fn connection(&self, target: &str, success: bool) {
        self.record(&EventEntry::new(EventKind::Connection, target, success));
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// Every entry in the log. Malformed lines are skipped; a missing file
    /// reads as empty.
    pub fn read_all(&self) -> Vec<EventEntry> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let Ok(file) = fs::File::open(path) else {
            return Vec::new();
        };
        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str::<EventEntry>(&line).ok())
            .collect()
    }

    /// Entries from the last `days` days, or all entries for `None`.
    pub fn read_since_days(&self, days: Option<u32>) -> Vec<EventEntry> {
        let entries = self.read_all();
        let Some(days) = days else {
            return entries;
        };
        let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
        entries
            .into_iter()
            .filter(|e| e.timestamp >= cutoff)
            .collect()
    }
}

fn append_entry(path: &Path, entry: &EventEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(entry)?;
    writeln!(file, "{json}")?;
    Ok(())
}
