//! Push notifications: deduplication, the capped display list, the single
//! auto-dismissing banner, and the desktop-alert permission gate.
//!
//! The backend replays its stored notifications to every new connection and
//! also broadcasts each new one, so the same id routinely arrives more than
//! once. An id is processed at most once per session.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::schema::NotificationsConfig;
use crate::socket::{ChannelListener, Emit};

/// Inbound event carrying one notification.
pub const NOTIFICATION_EVENT: &str = "notification";

/// Title used for desktop alerts.
pub const ALERT_TITLE: &str = "VoltGuard Alert";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Level::Info),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            other => anyhow::bail!("unknown notification level '{other}'"),
        }
    }
}

/// Notification creation time: epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

impl Timestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            Timestamp::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(
                f,
                "{}",
                dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            None => match self {
                Timestamp::Millis(ms) => write!(f, "{ms}"),
                Timestamp::Text(s) => f.write_str(s),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default)]
    pub level: Level,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Parse a `notification` event payload.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        Notification::deserialize(payload).context("malformed notification payload")
    }
}

// ---------------------------------------------------------------------------
// Seen-set
// ---------------------------------------------------------------------------

/// Membership set of processed notification ids.
///
/// Unbounded by default. With a capacity, the oldest id is forgotten once
/// the set is full.
#[derive(Debug, Default)]
pub struct SeenSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl SeenSet {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if let Some(cap) = self.capacity {
            while self.order.len() >= cap {
                match self.order.pop_front() {
                    Some(old) => {
                        self.ids.remove(&old);
                    }
                    None => break,
                }
            }
            self.order.push_back(id.to_string());
        }
        self.ids.insert(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Notification center
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Banner {
    notification: Notification,
    expires_at: Instant,
}

/// Deduplicated notification list plus the single active banner.
#[derive(Debug)]
pub struct NotificationCenter {
    seen: SeenSet,
    list: VecDeque<Notification>,
    max_displayed: usize,
    banner: Option<Banner>,
    banner_duration: Duration,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(&NotificationsConfig::default())
    }
}

impl NotificationCenter {
    pub fn new(config: &NotificationsConfig) -> Self {
        let seen = if config.seen_capacity == 0 {
            SeenSet::unbounded()
        } else {
            SeenSet::bounded(config.seen_capacity)
        };
        Self {
            seen,
            list: VecDeque::new(),
            max_displayed: config.max_displayed.max(1),
            banner: None,
            banner_duration: Duration::from_millis(config.banner_ms),
        }
    }

    /// Process one notification. Returns whether it was accepted.
    ///
    /// An already-seen id is a no-op. Otherwise the notification is
    /// prepended to the list (dropping the oldest past the cap) and becomes
    /// the banner, replacing any banner currently shown and restarting the
    /// dismissal timer from `now`.
    pub fn receive(&mut self, notification: Notification, now: Instant) -> bool {
        if !self.seen.insert(&notification.id) {
            return false;
        }
        self.list.push_front(notification.clone());
        self.list.truncate(self.max_displayed);
        self.banner = Some(Banner {
            notification,
            expires_at: now + self.banner_duration,
        });
        true
    }

    /// Displayed notifications, most recent first.
    pub fn list(&self) -> impl Iterator<Item = &Notification> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.list.iter().filter(|n| !n.read).count()
    }

    /// Banner visible at `now`, if any.
    pub fn banner(&self, now: Instant) -> Option<&Notification> {
        self.banner
            .as_ref()
            .filter(|b| now < b.expires_at)
            .map(|b| &b.notification)
    }

    /// Expire the banner if its time is up. Returns the dismissed notification.
    pub fn tick(&mut self, now: Instant) -> Option<Notification> {
        if self.banner.as_ref().is_some_and(|b| now >= b.expires_at) {
            return self.banner.take().map(|b| b.notification);
        }
        None
    }

    /// Dismiss the banner immediately (user interaction).
    pub fn dismiss_banner(&mut self) -> Option<Notification> {
        self.banner.take().map(|b| b.notification)
    }

    /// Mark a displayed notification as read.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.list.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    /// Empty the displayed list and banner. Seen ids are kept.
    pub fn clear(&mut self) {
        self.list.clear();
        self.banner = None;
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }
}

// ---------------------------------------------------------------------------
// Desktop alerts
// ---------------------------------------------------------------------------

/// OS-level notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Not yet asked.
    Default,
    Granted,
    Denied,
}

/// Platform hook for native alerts.
pub trait Notifier {
    /// Ask the user for permission. Called at most once.
    fn request_permission(&mut self) -> Permission;

    fn notify(&mut self, title: &str, body: &str);
}

/// Permission gate in front of a [`Notifier`].
pub struct DesktopAlerts<N: Notifier> {
    notifier: N,
    permission: Permission,
}

impl<N: Notifier> DesktopAlerts<N> {
    pub fn new(notifier: N, permission: Permission) -> Self {
        Self {
            notifier,
            permission,
        }
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Request permission if it has never been asked for.
    pub fn ensure_permission(&mut self) {
        if self.permission == Permission::Default {
            self.permission = self.notifier.request_permission();
        }
    }

    /// Raise an alert for `notification` if permission is granted.
    pub fn alert(&mut self, notification: &Notification) -> bool {
        if self.permission != Permission::Granted {
            return false;
        }
        self.notifier.notify(ALERT_TITLE, &notification.message);
        true
    }
}

// ---------------------------------------------------------------------------
// Alert view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => Severity::High,
            Level::Warning => Severity::Medium,
            Level::Info => Severity::Low,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// Row shown in the alert history.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertView {
    pub id: String,
    /// Device name, or `System` for backend-wide notices.
    pub source: String,
    /// First three words of the message.
    pub headline: String,
    pub severity: Severity,
    pub time: String,
}

impl From<&Notification> for AlertView {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.clone(),
            source: n
                .device
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "System".to_string()),
            headline: n.message.split(' ').take(3).collect::<Vec<_>>().join(" "),
            severity: n.level.into(),
            time: n.timestamp.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel listener
// ---------------------------------------------------------------------------

/// Rendering hook for notification activity. All methods default to no-ops.
pub trait NotificationView {
    fn accepted(&mut self, _notification: &Notification) {}

    fn banner_expired(&mut self, _notification: &Notification) {}

    fn malformed(&mut self, _error: &anyhow::Error) {}
}

impl NotificationView for () {}

/// Feeds `notification` events into a [`NotificationCenter`].
pub struct NotificationListener<V: NotificationView, N: Notifier> {
    center: NotificationCenter,
    view: V,
    alerts: Option<DesktopAlerts<N>>,
    connected: bool,
    received: u64,
    duplicates: u64,
}

impl<V: NotificationView, N: Notifier> NotificationListener<V, N> {
    pub fn new(center: NotificationCenter, view: V, alerts: Option<DesktopAlerts<N>>) -> Self {
        Self {
            center,
            view,
            alerts,
            connected: false,
            received: 0,
            duplicates: 0,
        }
    }

    pub fn center(&self) -> &NotificationCenter {
        &self.center
    }

    pub fn center_mut(&mut self) -> &mut NotificationCenter {
        &mut self.center
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Total notification events received, duplicates included.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    fn handle_notification(&mut self, payload: &Value, now: Instant) {
        let notification = match Notification::from_payload(payload) {
            Ok(n) => n,
            Err(e) => {
                self.view.malformed(&e);
                return;
            }
        };
        self.received += 1;
        if !self.center.receive(notification.clone(), now) {
            self.duplicates += 1;
            return;
        }
        self.view.accepted(&notification);
        if let Some(alerts) = self.alerts.as_mut() {
            alerts.alert(&notification);
        }
    }
}

impl<V: NotificationView, N: Notifier> ChannelListener for NotificationListener<V, N> {
    fn on_connect(&mut self, _out: &mut dyn Emit, _now: Instant) {
        self.connected = true;
        if let Some(alerts) = self.alerts.as_mut() {
            alerts.ensure_permission();
        }
    }

    fn on_disconnect(&mut self, _reason: &str, _now: Instant) {
        self.connected = false;
    }

    fn on_event(&mut self, name: &str, payload: &Value, _out: &mut dyn Emit, now: Instant) {
        if name == NOTIFICATION_EVENT {
            self.handle_notification(payload, now);
        }
    }

    fn on_tick(&mut self, _out: &mut dyn Emit, now: Instant) {
        if let Some(expired) = self.center.tick(now) {
            self.view.banner_expired(&expired);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
