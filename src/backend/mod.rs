/// REST client for the VoltGuard backend.
///
/// The same service that hosts the socket channel also exposes a small HTTP
/// API for notification history and live detection counts. The backend
/// reports failures as a `200` with an `{"error": "..."}` body, so every
/// response is checked for that shape before it is decoded.
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::schema::SocketConfig;
use crate::feed::FrameStats;
use crate::notifications::{Level, Notification};

/// Response to `POST /api/notifications/send`.
#[derive(Debug, Deserialize)]
struct SendResponse {
    notification: Notification,
}

/// Synchronous client for the backend's REST endpoints.
#[derive(Debug)]
pub struct BackendClient {
    base_url: String,
    timeout: Duration,
}

impl BackendClient {
    /// Build a client against the socket channel's host.
    pub fn from_config(config: &SocketConfig) -> Self {
        Self::new(&config.url, Duration::from_millis(config.connect_timeout_ms))
    }

    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        // "localhost" may resolve to ::1 first while the backend binds IPv4 only.
        format!("{}{path}", self.base_url).replace("://localhost", "://127.0.0.1")
    }

    /// Most recent stored notifications, newest first.
    pub fn recent_notifications(&self, limit: usize) -> Result<Vec<Notification>> {
        let resp = ureq::get(&self.url("/api/notifications"))
            .timeout(self.timeout)
            .query("limit", &limit.to_string())
            .call()
            .context("notification history request failed")?;
        decode(resp.into_json().context("failed to read notification history")?)
    }

    /// Publish a notification through the backend. Returns it as stored.
    pub fn send_notification(
        &self,
        message: &str,
        device: Option<&str>,
        level: Level,
    ) -> Result<Notification> {
        let mut req = ureq::post(&self.url("/api/notifications/send"))
            .timeout(self.timeout)
            .query("message", message)
            .query("level", &level.to_string());
        if let Some(device) = device {
            req = req.query("device", device);
        }
        let resp = req.call().context("send notification request failed")?;
        let sent: SendResponse =
            decode(resp.into_json().context("failed to read send response")?)?;
        Ok(sent.notification)
    }

    /// Delete the stored notification history.
    pub fn clear_notifications(&self) -> Result<()> {
        let resp = ureq::delete(&self.url("/api/notifications"))
            .timeout(self.timeout)
            .call()
            .context("clear notifications request failed")?;
        let _: Value = decode(resp.into_json().context("failed to read clear response")?)?;
        Ok(())
    }

    /// Current light detection counts.
    pub fn stats(&self) -> Result<FrameStats> {
        let resp = ureq::get(&self.url("/api/stats"))
            .timeout(self.timeout)
            .call()
            .context("stats request failed")?;
        decode(resp.into_json().context("failed to read stats")?)
    }
}

/// Reject `{"error": ...}` bodies, otherwise decode into `T`.
fn decode<T: DeserializeOwned>(body: Value) -> Result<T> {
    if let Some(message) = body.get("error").and_then(Value::as_str) {
        bail!("backend error: {message}");
    }
    serde_json::from_value(body).context("unexpected backend response shape")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_surfaces_backend_errors() {
        let err = decode::<FrameStats>(json!({"error": "Redis not available"})).unwrap_err();
        assert!(err.to_string().contains("Redis not available"));
    }

    #[test]
    fn decode_stats() {
        let stats: FrameStats = decode(json!({"lights_on": 3, "lights_off": 1})).unwrap();
        assert_eq!(stats.lights_on, 3);
        assert_eq!(stats.lights_off, 1);
    }

    #[test]
    fn client_from_default_config() {
        let client = BackendClient::from_config(&SocketConfig::default());
        assert_eq!(client.base_url, "http://localhost:8000");
        assert_eq!(client.url("/api/stats"), "http://127.0.0.1:8000/api/stats");
    }

    #[test]
    fn client_strips_trailing_slash() {
        let client = BackendClient::new("http://backend:8000/", Duration::from_secs(1));
        assert_eq!(client.url("/api/stats"), "http://backend:8000/api/stats");
    }
}
