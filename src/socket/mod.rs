//! Socket channel client for the VoltGuard video/notification backend.
//!
//! A [`SocketChannel`] owns one Socket.IO connection. It is created by
//! [`SocketChannel::connect`], released exactly once by
//! [`SocketChannel::close`] (or on drop), and never reconnects on its own.
//! Components consume it through the [`ChannelListener`] callbacks driven by
//! [`SocketChannel::run`], and publish through the [`Emit`] trait so they can
//! be exercised without a network.

pub mod packet;
pub mod transport;

use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use serde_json::Value;

use crate::config::schema::SocketConfig;
use packet::{DEFAULT_NAMESPACE, EnginePacket, SocketPacket};
use transport::Transport;

/// Something that happened on the channel, as seen by listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The Socket.IO namespace handshake completed.
    Connect,
    /// The connection is gone. Terminal.
    Disconnect { reason: String },
    /// A named server event such as `frame`, `notification` or `error`.
    Named { name: String, payload: Value },
}

/// Outbound side of a channel.
pub trait Emit {
    /// Publish a named event.
    fn emit(&mut self, name: &str, payload: Value) -> Result<()>;

    /// Whether the namespace handshake has completed and the channel is open.
    fn is_connected(&self) -> bool;
}

/// Callbacks invoked by [`SocketChannel::run`]. All methods default to no-ops.
///
/// `now` is passed explicitly so timers can be driven deterministically.
pub trait ChannelListener {
    fn on_connect(&mut self, _out: &mut dyn Emit, _now: Instant) {}

    fn on_disconnect(&mut self, _reason: &str, _now: Instant) {}

    fn on_event(&mut self, _name: &str, _payload: &Value, _out: &mut dyn Emit, _now: Instant) {}

    /// Called once per pump iteration, before waiting for the next event.
    fn on_tick(&mut self, _out: &mut dyn Emit, _now: Instant) {}
}

/// One Socket.IO connection on the default namespace.
pub struct SocketChannel {
    transport: Box<dyn Transport>,
    tick: Duration,
    connected: bool,
    closed: bool,
    last_seen: Instant,
}

impl SocketChannel {
    /// Connect using the configured transport preference order.
    ///
    /// Each transport is tried in turn; the first one that completes the
    /// Engine.IO handshake is kept. Fails only if every transport fails.
    pub fn connect(config: &SocketConfig) -> Result<Self> {
        if config.transports.is_empty() {
            bail!("no socket transports configured");
        }
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);

        let mut failures = Vec::new();
        for kind in &config.transports {
            match transport::open(*kind, &config.url, &config.path, connect_timeout) {
                Ok(transport) => {
                    let mut channel = Self::from_transport(transport);
                    channel.tick = Duration::from_millis(config.tick_ms.max(1));
                    channel
                        .transport
                        .send(&SocketPacket::Connect {
                            namespace: DEFAULT_NAMESPACE.to_string(),
                            data: None,
                        }
                        .to_engine())?;
                    return Ok(channel);
                }
                Err(e) => failures.push(format!("{kind}: {e:#}")),
            }
        }
        bail!(
            "could not connect to {}: {}",
            config.url,
            failures.join("; ")
        )
    }

    /// Wrap an already-open transport. The namespace `CONNECT` is not sent.
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            tick: Duration::from_millis(100),
            connected: false,
            closed: false,
            last_seen: Instant::now(),
        }
    }

    /// Transport in use.
    pub fn transport_kind(&self) -> crate::config::schema::TransportKind {
        self.transport.kind()
    }

    /// Engine.IO session id.
    pub fn session_id(&self) -> &str {
        &self.transport.handshake().sid
    }

    /// Wait up to `timeout` for the next listener-visible event.
    ///
    /// Pings are answered here and never surfaced. Transport failures, a
    /// server close, `CONNECT_ERROR` and a missed ping deadline all become
    /// [`ChannelEvent::Disconnect`]; after that the channel is closed and
    /// further calls return `None`.
    pub fn next_event(&mut self, timeout: Duration) -> Option<ChannelEvent> {
        if self.closed {
            return None;
        }

        let handshake = self.transport.handshake();
        let deadline = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
        if self.last_seen.elapsed() > deadline {
            return Some(self.disconnect("ping timeout"));
        }

        let packet = match self.transport.recv(timeout) {
            Ok(Some(packet)) => packet,
            Ok(None) => return None,
            Err(e) => return Some(self.disconnect(&format!("transport error: {e:#}"))),
        };
        self.last_seen = Instant::now();

        match packet {
            EnginePacket::Ping(data) => {
                if let Err(e) = self.transport.send(&EnginePacket::Pong(data)) {
                    return Some(self.disconnect(&format!("transport error: {e:#}")));
                }
                None
            }
            EnginePacket::Close => Some(self.disconnect("transport close")),
            EnginePacket::Message(raw) => match SocketPacket::decode(&raw) {
                Ok(packet) => self.handle_socket_packet(packet),
                // A malformed packet is dropped; the stream continues.
                Err(_) => None,
            },
            EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {
                None
            }
        }
    }

    fn handle_socket_packet(&mut self, packet: SocketPacket) -> Option<ChannelEvent> {
        match packet {
            SocketPacket::Connect { namespace, .. } if namespace == DEFAULT_NAMESPACE => {
                if self.connected {
                    return None;
                }
                self.connected = true;
                Some(ChannelEvent::Connect)
            }
            SocketPacket::Disconnect { namespace } if namespace == DEFAULT_NAMESPACE => {
                Some(self.disconnect("io server disconnect"))
            }
            SocketPacket::ConnectError { namespace, message } if namespace == DEFAULT_NAMESPACE => {
                Some(self.disconnect(&format!("connect error: {message}")))
            }
            SocketPacket::Event {
                namespace,
                name,
                payload,
                ..
            } if namespace == DEFAULT_NAMESPACE => Some(ChannelEvent::Named { name, payload }),
            _ => None,
        }
    }

    fn disconnect(&mut self, reason: &str) -> ChannelEvent {
        self.close();
        ChannelEvent::Disconnect {
            reason: reason.to_string(),
        }
    }

    /// Drive `listener` until it asks to stop or the channel disconnects.
    ///
    /// Each iteration calls [`ChannelListener::on_tick`] and then waits at
    /// most one tick for the next event, so listener timers fire on time.
    /// The channel is closed when this returns.
    pub fn run<L, F>(&mut self, listener: &mut L, mut should_stop: F)
    where
        L: ChannelListener,
        F: FnMut(&L) -> bool,
    {
        while !self.closed && !should_stop(listener) {
            listener.on_tick(self, Instant::now());
            let tick = self.tick;
            match self.next_event(tick) {
                Some(ChannelEvent::Connect) => listener.on_connect(self, Instant::now()),
                Some(ChannelEvent::Disconnect { reason }) => {
                    listener.on_disconnect(&reason, Instant::now());
                    break;
                }
                Some(ChannelEvent::Named { name, payload }) => {
                    listener.on_event(&name, &payload, self, Instant::now());
                }
                None => {}
            }
        }
        self.close();
    }

    /// Close the connection. Only the first call has any effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connected = false;
        let _ = self.transport.send(
            &SocketPacket::Disconnect {
                namespace: DEFAULT_NAMESPACE.to_string(),
            }
            .to_engine(),
        );
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Emit for SocketChannel {
    fn emit(&mut self, name: &str, payload: Value) -> Result<()> {
        if !self.is_connected() {
            bail!("socket channel is not connected");
        }
        self.transport
            .send(&SocketPacket::event(name, payload).to_engine())
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.closed
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TransportKind;
    use packet::OpenHandshake;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted transport that records everything sent.
    struct ScriptedTransport {
        handshake: OpenHandshake,
        inbound: VecDeque<Result<Option<EnginePacket>>>,
        sent: Arc<Mutex<Vec<String>>>,
        closes: Arc<Mutex<u32>>,
    }

    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Polling
        }
        fn handshake(&self) -> &OpenHandshake {
            &self.handshake
        }
        fn send(&mut self, packet: &EnginePacket) -> Result<()> {
            self.sent.lock().unwrap().push(packet.encode());
            Ok(())
        }
        fn recv(&mut self, _timeout: Duration) -> Result<Option<EnginePacket>> {
            self.inbound.pop_front().unwrap_or(Ok(None))
        }
        fn close(&mut self) {
            *self.closes.lock().unwrap() += 1;
        }
    }

    fn channel(
        inbound: Vec<Result<Option<EnginePacket>>>,
    ) -> (SocketChannel, Arc<Mutex<Vec<String>>>, Arc<Mutex<u32>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(Mutex::new(0));
        let transport = ScriptedTransport {
            handshake: OpenHandshake {
                sid: "sid-1".into(),
                upgrades: vec![],
                ping_interval: 25_000,
                ping_timeout: 20_000,
                max_payload: None,
            },
            inbound: inbound.into(),
            sent: Arc::clone(&sent),
            closes: Arc::clone(&closes),
        };
        (
            SocketChannel::from_transport(Box::new(transport)),
            sent,
            closes,
        )
    }

    fn msg(raw: &str) -> Result<Option<EnginePacket>> {
        Ok(Some(EnginePacket::Message(raw.to_string())))
    }

    #[test]
    fn connect_packet_marks_channel_connected() {
        let (mut ch, _, _) = channel(vec![msg(r#"0{"sid":"x"}"#)]);
        assert!(!ch.is_connected());
        assert_eq!(ch.next_event(Duration::ZERO), Some(ChannelEvent::Connect));
        assert!(ch.is_connected());
    }

    #[test]
    fn ping_is_answered_and_not_surfaced() {
        let (mut ch, sent, _) = channel(vec![Ok(Some(EnginePacket::Ping(String::new())))]);
        assert_eq!(ch.next_event(Duration::ZERO), None);
        assert_eq!(sent.lock().unwrap().as_slice(), ["3"]);
    }

    #[test]
    fn named_events_are_surfaced() {
        let (mut ch, _, _) = channel(vec![msg(r#"2["notification",{"id":"n1"}]"#)]);
        assert_eq!(
            ch.next_event(Duration::ZERO),
            Some(ChannelEvent::Named {
                name: "notification".into(),
                payload: json!({"id": "n1"}),
            })
        );
    }

    #[test]
    fn other_namespaces_are_ignored() {
        let (mut ch, _, _) = channel(vec![msg(r#"2/admin,["frame",{}]"#)]);
        assert_eq!(ch.next_event(Duration::ZERO), None);
    }

    #[test]
    fn emit_requires_connection() {
        let (mut ch, sent, _) = channel(vec![msg("0")]);
        assert!(ch.emit("get_frame", json!({})).is_err());
        ch.next_event(Duration::ZERO);
        ch.emit("get_frame", json!({})).unwrap();
        assert_eq!(sent.lock().unwrap().as_slice(), [r#"42["get_frame",{}]"#]);
    }

    #[test]
    fn transport_error_becomes_disconnect() {
        let (mut ch, _, closes) = channel(vec![Err(anyhow::anyhow!("reset by peer"))]);
        match ch.next_event(Duration::ZERO) {
            Some(ChannelEvent::Disconnect { reason }) => assert!(reason.contains("reset by peer")),
            other => panic!("expected disconnect, got {other:?}"),
        }
        assert!(ch.is_closed());
        assert_eq!(*closes.lock().unwrap(), 1);
        assert_eq!(ch.next_event(Duration::ZERO), None);
    }

    #[test]
    fn connect_error_becomes_disconnect() {
        let (mut ch, _, _) = channel(vec![msg(r#"4{"message":"unauthorized"}"#)]);
        assert_eq!(
            ch.next_event(Duration::ZERO),
            Some(ChannelEvent::Disconnect {
                reason: "connect error: unauthorized".into()
            })
        );
    }

    #[test]
    fn close_happens_exactly_once() {
        let (mut ch, sent, closes) = channel(vec![]);
        ch.close();
        ch.close();
        drop(ch);
        assert_eq!(*closes.lock().unwrap(), 1);
        assert_eq!(sent.lock().unwrap().as_slice(), ["41"]);
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ChannelListener for Recorder {
        fn on_connect(&mut self, out: &mut dyn Emit, _now: Instant) {
            self.events.push("connect".into());
            out.emit("get_frame", json!({})).unwrap();
        }
        fn on_disconnect(&mut self, reason: &str, _now: Instant) {
            self.events.push(format!("disconnect:{reason}"));
        }
        fn on_event(&mut self, name: &str, _payload: &Value, _out: &mut dyn Emit, _now: Instant) {
            self.events.push(name.to_string());
        }
    }

    #[test]
    fn run_dispatches_until_disconnect() {
        let (mut ch, sent, closes) = channel(vec![
            msg("0"),
            msg(r#"2["frame",{}]"#),
            Ok(None),
            Ok(Some(EnginePacket::Close)),
        ]);
        let mut rec = Recorder::default();
        ch.run(&mut rec, |_| false);
        assert_eq!(
            rec.events,
            ["connect", "frame", "disconnect:transport close"]
        );
        assert_eq!(sent.lock().unwrap()[0], r#"42["get_frame",{}]"#);
        assert_eq!(*closes.lock().unwrap(), 1);
    }

    #[test]
    fn run_stops_when_asked() {
        let (mut ch, _, closes) = channel(vec![msg("0"), msg(r#"2["frame",{}]"#)]);
        let mut rec = Recorder::default();
        ch.run(&mut rec, |r| r.events.len() >= 1);
        assert_eq!(rec.events, ["connect"]);
        assert!(ch.is_closed());
        assert_eq!(*closes.lock().unwrap(), 1);
    }
}
