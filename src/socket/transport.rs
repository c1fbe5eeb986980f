//! Engine.IO transports: WebSocket (primary) and HTTP long-polling (fallback).
//!
//! Both transports complete the Engine.IO handshake in their constructor and
//! then expose the same packet-level interface. Neither reconnects on its
//! own; a failed transport reports an error and the channel surfaces it as a
//! `disconnect`.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tungstenite::{Message, WebSocket};

use super::packet::{EnginePacket, OpenHandshake, split_payload};
use crate::config::schema::TransportKind;

/// Engine.IO protocol revision spoken by this client.
pub const ENGINE_IO_VERSION: &str = "4";

/// Packet-level access to an established Engine.IO session.
pub trait Transport: Send {
    /// Which transport this is.
    fn kind(&self) -> TransportKind;

    /// Handshake data from the server's `open` packet.
    fn handshake(&self) -> &OpenHandshake;

    /// Send one packet.
    fn send(&mut self, packet: &EnginePacket) -> Result<()>;

    /// Wait up to `timeout` for the next inbound packet. `Ok(None)` means
    /// nothing arrived in time.
    fn recv(&mut self, timeout: Duration) -> Result<Option<EnginePacket>>;

    /// Release the underlying connection. Best-effort.
    fn close(&mut self);
}

/// Open a transport of the given kind against `base_url` + `path`.
pub fn open(
    kind: TransportKind,
    base_url: &str,
    path: &str,
    connect_timeout: Duration,
) -> Result<Box<dyn Transport>> {
    match kind {
        TransportKind::Websocket => Ok(Box::new(WebSocketTransport::connect(
            base_url,
            path,
            connect_timeout,
        )?)),
        TransportKind::Polling => Ok(Box::new(PollingTransport::connect(
            base_url,
            path,
            connect_timeout,
        )?)),
    }
}

/// Join a base URL and an endpoint path without doubling slashes.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    format!("{base}{path}")
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Engine.IO over a plain `ws://` WebSocket.
pub struct WebSocketTransport {
    socket: WebSocket<TcpStream>,
    handshake: OpenHandshake,
}

impl WebSocketTransport {
    /// Connect, upgrade, and read the server's `open` packet.
    pub fn connect(base_url: &str, path: &str, connect_timeout: Duration) -> Result<Self> {
        let url = websocket_url(base_url, path)?;
        let (host, port) = host_and_port(&url)?;

        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {host}:{port}"))?
            .next()
            .with_context(|| format!("no address for {host}:{port}"))?;
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)
            .with_context(|| format!("websocket connect to {addr} failed"))?;
        stream.set_read_timeout(Some(connect_timeout))?;

        let (mut socket, _response) = tungstenite::client(url.as_str(), stream)
            .map_err(|e| anyhow!("websocket handshake with {url} failed: {e}"))?;

        let handshake = loop {
            match socket.read().context("no engine.io open packet on websocket")? {
                Message::Text(text) => match EnginePacket::decode(&text)? {
                    EnginePacket::Open(handshake) => break handshake,
                    other => bail!("expected engine.io open packet, got {other:?}"),
                },
                Message::Close(_) => bail!("websocket closed during handshake"),
                _ => continue,
            }
        };

        Ok(Self { socket, handshake })
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    fn handshake(&self) -> &OpenHandshake {
        &self.handshake
    }

    fn send(&mut self, packet: &EnginePacket) -> Result<()> {
        self.socket
            .send(Message::Text(packet.encode()))
            .context("websocket send failed")
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<EnginePacket>> {
        // A zero read timeout is rejected by the OS.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.get_mut().set_read_timeout(Some(timeout))?;

        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(EnginePacket::decode(&text)?)),
            Ok(Message::Close(_)) => Ok(Some(EnginePacket::Close)),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(e) => Err(anyhow!("websocket read failed: {e}")),
        }
    }

    fn close(&mut self) {
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
    }
}

/// Build the Engine.IO WebSocket URL from the HTTP base URL.
pub fn websocket_url(base_url: &str, path: &str) -> Result<String> {
    let http = endpoint_url(base_url, path);
    let ws = if let Some(rest) = http.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if http.starts_with("https://") {
        bail!("secure websocket is not supported; use the polling transport for https backends");
    } else if http.starts_with("ws://") {
        http
    } else {
        bail!("unsupported socket url scheme: {base_url}");
    };
    Ok(format!(
        "{ws}?EIO={ENGINE_IO_VERSION}&transport=websocket"
    ))
}

/// Extract host and port (default 80) from a `ws://` URL.
fn host_and_port(url: &str) -> Result<(String, u16)> {
    let rest = url
        .strip_prefix("ws://")
        .with_context(|| format!("not a ws:// url: {url}"))?;
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid port in {url}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), 80)),
    }
}

// ---------------------------------------------------------------------------
// Long-polling
// ---------------------------------------------------------------------------

/// Engine.IO over HTTP long-polling.
///
/// A background thread keeps one `GET` outstanding and forwards every packet
/// it receives; [`recv`](Transport::recv) waits on that queue with a timeout
/// so the caller's event pump stays responsive while the server holds the
/// request open.
pub struct PollingTransport {
    agent: ureq::Agent,
    url: String,
    handshake: OpenHandshake,
    pending: VecDeque<EnginePacket>,
    inbound: Receiver<Result<String>>,
    closed: Arc<AtomicBool>,
}

impl PollingTransport {
    /// Perform the polling handshake and start the receive loop.
    pub fn connect(base_url: &str, path: &str, connect_timeout: Duration) -> Result<Self> {
        let url = endpoint_url(base_url, path);

        let body = ureq::get(&url)
            .timeout(connect_timeout)
            .query("EIO", ENGINE_IO_VERSION)
            .query("transport", "polling")
            .call()
            .with_context(|| format!("polling handshake with {url} failed"))?
            .into_string()
            .context("failed to read polling handshake body")?;

        let mut packets = split_payload(&body).into_iter();
        let first = packets.next().context("empty polling handshake")?;
        let EnginePacket::Open(handshake) = EnginePacket::decode(first)? else {
            bail!("expected engine.io open packet in polling handshake");
        };
        let pending = packets
            .map(EnginePacket::decode)
            .collect::<Result<VecDeque<_>>>()?;

        // The server holds each GET for up to one ping interval.
        let hold = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(hold + Duration::from_secs(5))
            .build();

        let (tx, inbound) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        {
            let agent = agent.clone();
            let url = url.clone();
            let sid = handshake.sid.clone();
            let closed = Arc::clone(&closed);
            thread::spawn(move || {
                while !closed.load(Ordering::SeqCst) {
                    let result = agent
                        .get(&url)
                        .query("EIO", ENGINE_IO_VERSION)
                        .query("transport", "polling")
                        .query("sid", &sid)
                        .call()
                        .map_err(|e| anyhow!("polling GET failed: {e}"))
                        .and_then(|resp| {
                            resp.into_string()
                                .context("failed to read polling body")
                        });
                    match result {
                        Ok(body) => {
                            for raw in split_payload(&body) {
                                let is_close = raw == "1";
                                if tx.send(Ok(raw.to_string())).is_err() || is_close {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            if !closed.load(Ordering::SeqCst) {
                                let _ = tx.send(Err(e));
                            }
                            return;
                        }
                    }
                }
            });
        }

        Ok(Self {
            agent,
            url,
            handshake,
            pending,
            inbound,
            closed,
        })
    }

    fn post(&self, body: String) -> Result<()> {
        self.agent
            .post(&self.url)
            .query("EIO", ENGINE_IO_VERSION)
            .query("transport", "polling")
            .query("sid", &self.handshake.sid)
            .set("Content-Type", "text/plain;charset=UTF-8")
            .send_string(&body)
            .map_err(|e| anyhow!("polling POST failed: {e}"))?;
        Ok(())
    }
}

impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn handshake(&self) -> &OpenHandshake {
        &self.handshake
    }

    fn send(&mut self, packet: &EnginePacket) -> Result<()> {
        self.post(packet.encode())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<EnginePacket>> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(Some(packet));
        }
        match self.inbound.recv_timeout(timeout) {
            Ok(Ok(raw)) => Ok(Some(EnginePacket::decode(&raw)?)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => bail!("polling stream ended"),
        }
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.post(EnginePacket::Close.encode());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
