//! Analytics reporter: aggregation and daily trends over the event log.
//!
//! Reads the JSONL event log and provides:
//! - **Stats**: chat turn outcomes, tool usage, notifications by level
//! - **Trends**: per-day activity over a time window

use std::collections::{BTreeMap, HashMap};

use crate::analytics::logger::{EventEntry, EventKind, EventLog};

// ---------------------------------------------------------------------------
// Aggregated stats
// ---------------------------------------------------------------------------

/// Summary statistics for `voltguard stats`.
#[derive(Debug, Default)]
pub struct Stats {
    pub total_events: usize,
    pub chat_turns: usize,
    pub chat_failures: usize,
    pub avg_turn_latency_ms: f64,
    pub tool_calls: usize,
    pub tool_failures: usize,
    pub tool_stats: Vec<ToolStat>,
    /// Notification counts keyed by level, sorted by level name.
    pub notifications: BTreeMap<String, usize>,
    pub frame_errors: usize,
    pub connection_failures: usize,
}

impl Stats {
    pub fn chat_success_pct(&self) -> f64 {
        pct(self.chat_turns - self.chat_failures, self.chat_turns)
    }

    pub fn tool_success_pct(&self) -> f64 {
        pct(self.tool_calls - self.tool_failures, self.tool_calls)
    }
}

/// Per-tool aggregated statistics.
#[derive(Debug, Clone)]
pub struct ToolStat {
    pub tool: String,
    pub calls: usize,
    pub failures: usize,
    pub avg_latency_ms: f64,
}

/// A single data point in a time-based trend.
#[derive(Debug, Clone)]
pub struct TrendEntry {
    pub date: String,
    pub chat_turns: usize,
    pub tool_calls: usize,
    pub notifications: usize,
    pub frame_errors: usize,
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

fn avg_latency(entries: &[&EventEntry]) -> f64 {
    let latencies: Vec<u64> = entries.iter().filter_map(|e| e.latency_ms).collect();
    if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Stats computation
// ---------------------------------------------------------------------------

/// Compute aggregate stats from the log, optionally filtered to the last
/// `days` days.
pub fn compute_stats(log: &EventLog, days: Option<u32>) -> Stats {
    build_stats(&log.read_since_days(days))
}

pub fn build_stats(entries: &[EventEntry]) -> Stats {
    let of_kind = |kind: EventKind| -> Vec<&EventEntry> {
        entries.iter().filter(|e| e.kind == kind).collect()
    };

    let turns = of_kind(EventKind::ChatTurn);
    let tools = of_kind(EventKind::ToolCall);

    let mut notifications: BTreeMap<String, usize> = BTreeMap::new();
    for entry in of_kind(EventKind::Notification) {
        *notifications.entry(entry.detail.clone()).or_default() += 1;
    }

    Stats {
        total_events: entries.len(),
        chat_turns: turns.len(),
        chat_failures: turns.iter().filter(|e| !e.success).count(),
        avg_turn_latency_ms: avg_latency(&turns),
        tool_calls: tools.len(),
        tool_failures: tools.iter().filter(|e| !e.success).count(),
        tool_stats: compute_tool_stats(&tools),
        notifications,
        frame_errors: of_kind(EventKind::FrameError)
            .iter()
            .map(|e| frame_error_count(e))
            .sum(),
        connection_failures: of_kind(EventKind::Connection)
            .iter()
            .filter(|e| !e.success)
            .count(),
    }
}

/// A frame-error entry may summarise a whole feed run.
fn frame_error_count(entry: &EventEntry) -> usize {
    entry.count.map_or(1, |n| n as usize)
}

/// Group tool calls by tool name. Most-used first; ties by name.
fn compute_tool_stats(tools: &[&EventEntry]) -> Vec<ToolStat> {
    let mut groups: HashMap<&str, Vec<&EventEntry>> = HashMap::new();
    for entry in tools {
        groups.entry(entry.detail.as_str()).or_default().push(entry);
    }

    let mut stats: Vec<ToolStat> = groups
        .into_iter()
        .map(|(tool, group)| ToolStat {
            tool: tool.to_string(),
            calls: group.len(),
            failures: group.iter().filter(|e| !e.success).count(),
            avg_latency_ms: avg_latency(&group),
        })
        .collect();

    stats.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.tool.cmp(&b.tool)));
    stats
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Compute daily trend data over the last `days` days.
pub fn compute_trends(log: &EventLog, days: u32) -> Vec<TrendEntry> {
    build_trends(&log.read_since_days(Some(days)))
}

pub fn build_trends(entries: &[EventEntry]) -> Vec<TrendEntry> {
    // Keyed by the YYYY-MM-DD prefix of the RFC 3339 timestamp.
    let mut daily: BTreeMap<String, TrendEntry> = BTreeMap::new();
    for entry in entries {
        let date = entry.timestamp.get(..10).unwrap_or("unknown").to_string();
        let day = daily.entry(date.clone()).or_insert_with(|| TrendEntry {
            date,
            chat_turns: 0,
            tool_calls: 0,
            notifications: 0,
            frame_errors: 0,
        });
        match entry.kind {
            EventKind::ChatTurn => day.chat_turns += 1,
            EventKind::ToolCall => day.tool_calls += 1,
            EventKind::Notification => day.notifications += 1,
            EventKind::FrameError => day.frame_errors += frame_error_count(entry),
            EventKind::Connection => {}
        }
    }
    daily.into_values().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
