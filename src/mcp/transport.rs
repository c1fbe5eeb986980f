//! MCP client transports.
//!
//! * [`StreamableHttpTransport`]: each request is a `POST` whose response is
//!   either a JSON body or a short event stream carrying the reply.
//! * [`SseTransport`]: the older HTTP+SSE scheme. A long-lived `GET`
//!   announces a message endpoint; requests are `POST`ed there and every
//!   reply arrives on the stream.

use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;

use super::protocol::RpcMessage;
use super::sse::{self, SseReader};

/// Header carrying the streamable-HTTP session id.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Moves JSON-RPC envelopes to and from a tool server.
pub trait McpTransport: Send {
    /// Send request `id` and wait for its response.
    fn request(&mut self, id: u64, body: &Value, timeout: Option<Duration>) -> Result<RpcMessage>;

    /// Send a notification. No response is expected.
    fn notify(&mut self, body: &Value) -> Result<()>;

    /// Protocol revision to announce in `initialize`.
    fn protocol_version(&self) -> &'static str;

    /// Release the session. Best-effort.
    fn close(&mut self);
}

/// Pick the reply to `id` out of a JSON body (single message or batch).
fn find_response(body: Value, id: u64) -> Result<Option<RpcMessage>> {
    let messages: Vec<RpcMessage> = match body {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()
            .context("malformed JSON-RPC batch")?,
        other => vec![serde_json::from_value(other).context("malformed JSON-RPC message")?],
    };
    Ok(messages.into_iter().find(|m| m.answers(id)))
}

fn ureq_error(e: ureq::Error) -> anyhow::Error {
    match e {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            anyhow!("tool server returned HTTP {code}: {}", body.trim())
        }
        other => anyhow!("tool server request failed: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Streamable HTTP
// ---------------------------------------------------------------------------

pub struct StreamableHttpTransport {
    agent: ureq::Agent,
    url: String,
    session_id: Option<String>,
}

impl StreamableHttpTransport {
    pub fn new(url: &str, connect_timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect_timeout)
                .build(),
            url: url.to_string(),
            session_id: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn post(&mut self, body: &Value, timeout: Option<Duration>) -> Result<ureq::Response> {
        let mut req = self
            .agent
            .post(&self.url)
            .set("Accept", "application/json, text/event-stream");
        if let Some(sid) = &self.session_id {
            req = req.set(SESSION_HEADER, sid);
        }
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let resp = req.send_json(body).map_err(ureq_error)?;
        if let Some(sid) = resp.header(SESSION_HEADER) {
            self.session_id = Some(sid.to_string());
        }
        Ok(resp)
    }
}

impl McpTransport for StreamableHttpTransport {
    fn request(&mut self, id: u64, body: &Value, timeout: Option<Duration>) -> Result<RpcMessage> {
        let resp = self.post(body, timeout)?;
        if resp.content_type() == "text/event-stream" {
            let mut events = SseReader::new(BufReader::new(resp.into_reader()));
            while let Some(event) = events.next_event()? {
                if event.event != "message" {
                    continue;
                }
                let value: Value =
                    serde_json::from_str(&event.data).context("malformed event-stream message")?;
                if let Some(message) = find_response(value, id)? {
                    return Ok(message);
                }
            }
            bail!("event stream ended without a response to request {id}");
        }
        let value: Value = resp.into_json().context("malformed tool server response")?;
        find_response(value, id)?
            .with_context(|| format!("tool server did not answer request {id}"))
    }

    fn notify(&mut self, body: &Value) -> Result<()> {
        self.post(body, None)?;
        Ok(())
    }

    fn protocol_version(&self) -> &'static str {
        super::protocol::STREAMABLE_PROTOCOL_VERSION
    }

    fn close(&mut self) {
        if let Some(sid) = self.session_id.take() {
            let _ = self
                .agent
                .delete(&self.url)
                .set(SESSION_HEADER, &sid)
                .timeout(Duration::from_secs(5))
                .call();
        }
    }
}

// ---------------------------------------------------------------------------
// Legacy HTTP+SSE
// ---------------------------------------------------------------------------

/// How often an idle event-stream reader checks whether it was closed.
const STREAM_POLL: Duration = Duration::from_secs(1);

pub struct SseTransport {
    agent: ureq::Agent,
    endpoint: String,
    events: Receiver<Result<(String, String)>>,
    /// Tells the reader thread to drop the stream.
    stop: Arc<AtomicBool>,
}

impl SseTransport {
    /// Open the event stream and wait for the `endpoint` announcement.
    pub fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .build();
        // The stream gets its own agent: reads time out so the reader thread
        // can notice `close` even when the server is silent.
        let resp = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(STREAM_POLL)
            .build()
            .get(url)
            .set("Accept", "text/event-stream")
            .call()
            .map_err(ureq_error)?;

        let stream = resp.into_reader();
        let (tx, events) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);
        thread::spawn(move || {
            let mut reader = SseReader::new(BufReader::new(stream));
            // Returning drops the response and with it the connection.
            while !stopped.load(Ordering::Relaxed) {
                let next = match reader.next_event() {
                    Ok(Some(event)) => Ok((event.event, event.data)),
                    Ok(None) => Err(anyhow!("tool server closed the event stream")),
                    Err(e) if sse::is_timeout(&e) => continue,
                    Err(e) => Err(e),
                };
                let done = next.is_err();
                if tx.send(next).is_err() || done {
                    return;
                }
            }
        });

        let deadline = Instant::now() + connect_timeout;
        let endpoint = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(Ok((kind, data))) if kind == "endpoint" => break resolve_endpoint(url, data.trim()),
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    stop.store(true, Ordering::Relaxed);
                    return Err(e);
                }
                Err(_) => {
                    stop.store(true, Ordering::Relaxed);
                    bail!("tool server did not announce a message endpoint")
                }
            }
        };

        Ok(Self {
            agent,
            endpoint,
            events,
            stop,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post(&self, body: &Value) -> Result<()> {
        self.agent
            .post(&self.endpoint)
            .send_json(body)
            .map_err(ureq_error)?;
        Ok(())
    }
}

impl McpTransport for SseTransport {
    fn request(&mut self, id: u64, body: &Value, timeout: Option<Duration>) -> Result<RpcMessage> {
        self.post(body)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let next = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.events.recv_timeout(remaining) {
                        Ok(next) => next,
                        Err(RecvTimeoutError::Timeout) => {
                            bail!("tool server did not answer request {id} in time")
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            bail!("tool server event stream is closed")
                        }
                    }
                }
                None => self
                    .events
                    .recv()
                    .map_err(|_| anyhow!("tool server event stream is closed"))?,
            };
            let (kind, data) = next?;
            if kind != "message" {
                continue;
            }
            let value: Value =
                serde_json::from_str(&data).context("malformed event-stream message")?;
            if let Some(message) = find_response(value, id)? {
                return Ok(message);
            }
        }
    }

    fn notify(&mut self, body: &Value) -> Result<()> {
        self.post(body)
    }

    fn protocol_version(&self) -> &'static str {
        super::protocol::SSE_PROTOCOL_VERSION
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let (_, closed) = mpsc::channel();
        self.events = closed;
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Resolve the announced endpoint against the stream URL.
pub fn resolve_endpoint(stream_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    let authority_start = stream_url.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = stream_url[authority_start..]
        .find('/')
        .map(|i| i + authority_start)
        .unwrap_or(stream_url.len());
    if endpoint.starts_with('/') {
        return format!("{}{endpoint}", &stream_url[..path_start]);
    }
    let path = stream_url.split(['?', '#']).next().unwrap_or(stream_url);
    let dir_end = path.rfind('/').filter(|&i| i >= path_start).map(|i| i + 1);
    match dir_end {
        Some(end) => format!("{}{endpoint}", &path[..end]),
        None => format!("{path}/{endpoint}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_absolute_path_endpoint() {
        assert_eq!(
            resolve_endpoint(
                "http://localhost:8000/lou/mcp/sse",
                "/messages/?session_id=abc"
            ),
            "http://localhost:8000/messages/?session_id=abc"
        );
    }

    #[test]
    fn resolves_relative_endpoint() {
        assert_eq!(
            resolve_endpoint("http://localhost:8000/lou/mcp/sse", "messages/?session_id=abc"),
            "http://localhost:8000/lou/mcp/messages/?session_id=abc"
        );
        assert_eq!(
            resolve_endpoint("http://localhost:8000", "messages"),
            "http://localhost:8000/messages"
        );
    }

    #[test]
    fn keeps_full_url_endpoint() {
        assert_eq!(
            resolve_endpoint("http://a/sse", "http://b/messages"),
            "http://b/messages"
        );
    }

    #[test]
    fn finds_response_in_batch() {
        let batch = json!([
            {"jsonrpc": "2.0", "method": "notifications/message", "params": {}},
            {"jsonrpc": "2.0", "id": 2, "result": {"ok": true}}
        ]);
        let found = find_response(batch, 2).unwrap().unwrap();
        assert_eq!(found.result, Some(json!({"ok": true})));
        assert!(find_response(json!({"jsonrpc": "2.0", "id": 1, "result": {}}), 2).unwrap().is_none());
    }
}
