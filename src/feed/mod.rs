//! Live camera feed: frame model and the pull-based frame requester.
//!
//! The backend never pushes frames unprompted. Every displayed `frame`
//! triggers exactly one `get_frame`, so the frame rate is set by the
//! backend and the round trip. A frame-stream `error` schedules a single
//! delayed retry according to the [`RetryPolicy`].

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::schema::FeedConfig;
use crate::socket::{ChannelListener, Emit};

/// Outbound event asking the backend for the next frame.
pub const GET_FRAME: &str = "get_frame";

/// Per-frame light detection counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    #[serde(default)]
    pub lights_on: u32,
    #[serde(default)]
    pub lights_off: u32,
}

/// One annotated video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Base64-encoded JPEG.
    pub image: String,
    #[serde(default)]
    pub stats: FrameStats,
}

impl Frame {
    /// Parse a `frame` event payload.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        Frame::deserialize(payload).context("malformed frame payload")
    }

    /// Decode the JPEG bytes. Accepts a bare base64 string or a data URL.
    pub fn decode_image(&self) -> Result<Vec<u8>> {
        let data = match self.image.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => self.image.as_str(),
        };
        STANDARD
            .decode(data.trim())
            .context("frame image is not valid base64")
    }
}

/// How frame-stream errors are retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub interval: Duration,
    /// Give up after this many consecutive errors. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Multiplier applied to the delay for each further consecutive error.
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: None,
            backoff: 1.0,
        }
    }
}

impl From<&FeedConfig> for RetryPolicy {
    fn from(config: &FeedConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.retry_interval_ms),
            max_attempts: (config.retry_max_attempts > 0).then_some(config.retry_max_attempts),
            backoff: if config.retry_backoff.is_finite() && config.retry_backoff >= 1.0 {
                config.retry_backoff
            } else {
                1.0
            },
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// policy is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        let factor = self.backoff.powi(attempt.saturating_sub(1) as i32);
        Some(self.interval.mul_f64(factor))
    }
}

/// Frame requester lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Connected,
    AwaitingFrame,
    Displaying,
    /// An error was received; a retry is scheduled.
    RetryPending,
    /// The retry policy was exhausted. No further requests are made.
    GaveUp,
    /// Terminal.
    Disconnected,
}

/// Receives each frame as it is displayed.
pub trait FrameDisplay {
    fn show(&mut self, frame: &Frame);
}

impl<F: FnMut(&Frame)> FrameDisplay for F {
    fn show(&mut self, frame: &Frame) {
        self(frame)
    }
}

/// Pull-loop state machine for the live feed.
pub struct FrameRequester<D: FrameDisplay> {
    display: D,
    policy: RetryPolicy,
    state: FeedState,
    latest: Option<Frame>,
    retry_at: Option<Instant>,
    consecutive_errors: u32,
    frames_received: u64,
    errors_total: u64,
    last_error: Option<String>,
}

impl<D: FrameDisplay> FrameRequester<D> {
    pub fn new(policy: RetryPolicy, display: D) -> Self {
        Self {
            display,
            policy,
            state: FeedState::Idle,
            latest: None,
            retry_at: None,
            consecutive_errors: 0,
            frames_received: 0,
            errors_total: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Most recently displayed frame. Only one frame is ever retained.
    pub fn latest(&self) -> Option<&Frame> {
        self.latest.as_ref()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn errors_total(&self) -> u64 {
        self.errors_total
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// When the pending retry fires, if one is scheduled.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// A failed emit on a live channel is a frame-stream error and goes
    /// through the retry policy like any other.
    fn request_frame(&mut self, out: &mut dyn Emit, now: Instant) {
        if !out.is_connected() {
            return;
        }
        match out.emit(GET_FRAME, json!({})) {
            Ok(()) => self.state = FeedState::AwaitingFrame,
            Err(e) => self.handle_error(format!("{GET_FRAME} failed: {e:#}"), now),
        }
    }

    fn handle_frame(&mut self, payload: &Value, out: &mut dyn Emit, now: Instant) {
        let frame = match Frame::from_payload(payload) {
            Ok(frame) => frame,
            Err(e) => {
                self.handle_error(format!("{e:#}"), now);
                return;
            }
        };
        self.state = FeedState::Displaying;
        self.display.show(&frame);
        self.latest = Some(frame);
        self.frames_received += 1;
        self.consecutive_errors = 0;
        // A frame supersedes any pending retry.
        self.retry_at = None;
        self.request_frame(out, now);
    }

    fn handle_error(&mut self, message: String, now: Instant) {
        self.errors_total += 1;
        self.last_error = Some(message);
        if self.retry_at.is_some() {
            return;
        }
        self.consecutive_errors += 1;
        match self.policy.delay_for(self.consecutive_errors) {
            Some(delay) => {
                self.retry_at = Some(now + delay);
                self.state = FeedState::RetryPending;
            }
            None => self.state = FeedState::GaveUp,
        }
    }
}

/// Extract a human-readable message from an `error` event payload.
pub fn error_message(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        Value::Null => "frame error".to_string(),
        other => other.to_string(),
    }
}

impl<D: FrameDisplay> ChannelListener for FrameRequester<D> {
    fn on_connect(&mut self, out: &mut dyn Emit, now: Instant) {
        if self.state == FeedState::Disconnected {
            return;
        }
        self.state = FeedState::Connected;
        self.request_frame(out, now);
    }

    fn on_disconnect(&mut self, _reason: &str, _now: Instant) {
        self.state = FeedState::Disconnected;
        self.retry_at = None;
    }

    fn on_event(&mut self, name: &str, payload: &Value, out: &mut dyn Emit, now: Instant) {
        if matches!(self.state, FeedState::Disconnected | FeedState::GaveUp) {
            return;
        }
        match name {
            "frame" => self.handle_frame(payload, out, now),
            "error" => self.handle_error(error_message(payload), now),
            _ => {}
        }
    }

    fn on_tick(&mut self, out: &mut dyn Emit, now: Instant) {
        if let Some(at) = self.retry_at
            && now >= at
        {
            self.retry_at = None;
            self.request_frame(out, now);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        connected: bool,
        emitted: Vec<(String, Value)>,
    }

    impl Recorder {
        fn connected() -> Self {
            Self {
                connected: true,
                emitted: Vec::new(),
            }
        }
    }

    impl Emit for Recorder {
        fn emit(&mut self, name: &str, payload: Value) -> Result<()> {
            self.emitted.push((name.to_string(), payload));
            Ok(())
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    /// Connected channel whose sends fail until `fail_sends` is cleared.
    struct Flaky {
        fail_sends: bool,
        sent: usize,
    }

    impl Emit for Flaky {
        fn emit(&mut self, _name: &str, _payload: Value) -> Result<()> {
            if self.fail_sends {
                anyhow::bail!("polling POST failed");
            }
            self.sent += 1;
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    fn frame_payload(on: u32, off: u32) -> Value {
        json!({"image": STANDARD.encode(b"jpeg"), "stats": {"lights_on": on, "lights_off": off}})
    }

    fn requester() -> FrameRequester<impl FnMut(&Frame)> {
        FrameRequester::new(RetryPolicy::default(), |_: &Frame| {})
    }

    #[test]
    fn connect_requests_first_frame() {
        let mut feed = requester();
        let mut out = Recorder::connected();
        feed.on_connect(&mut out, Instant::now());
        assert_eq!(out.emitted, vec![(GET_FRAME.to_string(), json!({}))]);
        assert_eq!(feed.state(), FeedState::AwaitingFrame);
    }

    #[test]
    fn each_frame_triggers_exactly_one_request() {
        let mut shown = Vec::new();
        let mut feed = FrameRequester::new(RetryPolicy::default(), |f: &Frame| {
            shown.push(f.stats)
        });
        let mut out = Recorder::connected();
        let now = Instant::now();
        feed.on_event("frame", &frame_payload(2, 1), &mut out, now);
        assert_eq!(out.emitted.len(), 1);
        feed.on_event("frame", &frame_payload(3, 0), &mut out, now);
        assert_eq!(out.emitted.len(), 2);
        assert_eq!(feed.frames_received(), 2);
        assert_eq!(feed.latest().unwrap().stats.lights_on, 3);
        drop(feed);
        assert_eq!(shown.len(), 2);
    }

    #[test]
    fn no_request_when_not_connected() {
        let mut feed = requester();
        let mut out = Recorder {
            connected: false,
            emitted: Vec::new(),
        };
        feed.on_event("frame", &frame_payload(1, 1), &mut out, Instant::now());
        assert!(out.emitted.is_empty());
        assert_eq!(feed.state(), FeedState::Displaying);
    }

    #[test]
    fn error_schedules_one_retry_after_interval() {
        let mut feed = requester();
        let mut out = Recorder::connected();
        let t0 = Instant::now();
        feed.on_event("error", &json!({"message": "camera busy"}), &mut out, t0);
        feed.on_event("error", &json!("again"), &mut out, t0);
        assert_eq!(feed.state(), FeedState::RetryPending);
        assert_eq!(feed.retry_at(), Some(t0 + Duration::from_millis(1000)));
        assert_eq!(feed.errors_total(), 2);
        assert_eq!(feed.last_error(), Some("again"));

        feed.on_tick(&mut out, t0 + Duration::from_millis(999));
        assert!(out.emitted.is_empty());
        feed.on_tick(&mut out, t0 + Duration::from_millis(1000));
        assert_eq!(out.emitted.len(), 1);
        assert_eq!(feed.state(), FeedState::AwaitingFrame);
        feed.on_tick(&mut out, t0 + Duration::from_millis(5000));
        assert_eq!(out.emitted.len(), 1);
    }

    #[test]
    fn failed_request_schedules_retry() {
        let mut feed = requester();
        let mut out = Flaky {
            fail_sends: true,
            sent: 0,
        };
        let t0 = Instant::now();
        feed.on_connect(&mut out, t0);
        assert_eq!(feed.state(), FeedState::RetryPending);
        assert_eq!(feed.errors_total(), 1);
        assert!(feed.last_error().unwrap().contains("polling POST failed"));
        assert_eq!(feed.retry_at(), Some(t0 + Duration::from_millis(1000)));

        // Still failing: the retry itself fails and another one is scheduled.
        let t1 = t0 + Duration::from_secs(1);
        feed.on_tick(&mut out, t1);
        assert_eq!(feed.errors_total(), 2);
        assert_eq!(feed.retry_at(), Some(t1 + Duration::from_millis(1000)));

        out.fail_sends = false;
        feed.on_tick(&mut out, t0 + Duration::from_secs(60));
        assert_eq!(out.sent, 1);
        assert_eq!(feed.state(), FeedState::AwaitingFrame);
        assert_eq!(feed.retry_at(), None);
    }

    #[test]
    fn malformed_frame_counts_as_error() {
        let mut feed = requester();
        let mut out = Recorder::connected();
        feed.on_event("frame", &json!({"stats": {}}), &mut out, Instant::now());
        assert_eq!(feed.state(), FeedState::RetryPending);
        assert!(out.emitted.is_empty());
    }

    #[test]
    fn disconnect_is_terminal() {
        let mut feed = requester();
        let mut out = Recorder::connected();
        let t0 = Instant::now();
        feed.on_event("error", &Value::Null, &mut out, t0);
        feed.on_disconnect("transport close", t0);
        feed.on_tick(&mut out, t0 + Duration::from_secs(10));
        feed.on_event("frame", &frame_payload(1, 0), &mut out, t0);
        feed.on_connect(&mut out, t0);
        assert!(out.emitted.is_empty());
        assert_eq!(feed.state(), FeedState::Disconnected);
    }

    #[test]
    fn bounded_policy_gives_up() {
        let policy = RetryPolicy {
            interval: Duration::from_millis(100),
            max_attempts: Some(2),
            backoff: 2.0,
        };
        let mut feed = FrameRequester::new(policy, |_: &Frame| {});
        let mut out = Recorder::connected();
        let mut now = Instant::now();

        feed.on_event("error", &Value::Null, &mut out, now);
        assert_eq!(feed.retry_at(), Some(now + Duration::from_millis(100)));
        now += Duration::from_millis(100);
        feed.on_tick(&mut out, now);

        feed.on_event("error", &Value::Null, &mut out, now);
        assert_eq!(feed.retry_at(), Some(now + Duration::from_millis(200)));
        now += Duration::from_millis(200);
        feed.on_tick(&mut out, now);

        feed.on_event("error", &Value::Null, &mut out, now);
        assert_eq!(feed.state(), FeedState::GaveUp);
        assert_eq!(feed.retry_at(), None);
        assert_eq!(out.emitted.len(), 2);
    }

    #[test]
    fn frame_resets_consecutive_errors() {
        let policy = RetryPolicy {
            max_attempts: Some(1),
            ..RetryPolicy::default()
        };
        let mut feed = FrameRequester::new(policy, |_: &Frame| {});
        let mut out = Recorder::connected();
        let t0 = Instant::now();
        feed.on_event("error", &Value::Null, &mut out, t0);
        feed.on_tick(&mut out, t0 + Duration::from_secs(1));
        feed.on_event("frame", &frame_payload(0, 0), &mut out, t0);
        feed.on_event("error", &Value::Null, &mut out, t0);
        assert_eq!(feed.state(), FeedState::RetryPending);
    }

    #[test]
    fn policy_from_config() {
        let config = FeedConfig {
            retry_interval_ms: 250,
            retry_max_attempts: 0,
            retry_backoff: 0.5,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, None);
        assert_eq!(policy.backoff, 1.0);
    }

    #[test]
    fn decodes_image_from_data_url() {
        let frame = Frame {
            image: format!("data:image/jpeg;base64,{}", STANDARD.encode(b"\xff\xd8")),
            stats: FrameStats::default(),
        };
        assert_eq!(frame.decode_image().unwrap(), vec![0xff, 0xd8]);
        let bad = Frame {
            image: "not base64!".into(),
            stats: FrameStats::default(),
        };
        assert!(bad.decode_image().is_err());
    }
}
