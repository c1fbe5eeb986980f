//! Engine.IO v4 and Socket.IO v5 text packet codec.
//!
//! Engine.IO frames carry a one-digit type prefix (`0` open … `6` noop).
//! A `4` (message) frame wraps a Socket.IO packet, which has its own type
//! digit, an optional `/namespace,` prefix, an optional numeric ack id, and a
//! JSON body. Long-polling bodies join several Engine.IO frames with the
//! record separator `\x1e`.
//!
//! ```text
//! 0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000}
//! 40
//! 42["frame",{"image":"…","stats":{"lights_on":2,"lights_off":1}}]
//! 42/admin,7["get_frame",{}]
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record separator between packets in a long-polling payload.
pub const RECORD_SEPARATOR: char = '\x1e';

/// Default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

// ---------------------------------------------------------------------------
// Engine.IO
// ---------------------------------------------------------------------------

/// Handshake data sent by the server in the `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// A single Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    /// Payload is a raw Socket.IO packet.
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Decode one Engine.IO text packet.
    pub fn decode(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let kind = chars.next().context("empty engine.io packet")?;
        let body = chars.as_str();
        let packet = match kind {
            '0' => {
                let handshake: OpenHandshake =
                    serde_json::from_str(body).context("malformed engine.io open packet")?;
                Self::Open(handshake)
            }
            '1' => Self::Close,
            '2' => Self::Ping(body.to_string()),
            '3' => Self::Pong(body.to_string()),
            '4' => Self::Message(body.to_string()),
            '5' => Self::Upgrade,
            '6' => Self::Noop,
            other => bail!("unknown engine.io packet type '{other}'"),
        };
        Ok(packet)
    }

    /// Encode this packet for the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Split a long-polling body into individual Engine.IO packets.
pub fn split_payload(body: &str) -> Vec<&str> {
    body.split(RECORD_SEPARATOR)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Join packets into a long-polling body.
pub fn join_payload(packets: &[String]) -> String {
    packets.join(&RECORD_SEPARATOR.to_string())
}

// ---------------------------------------------------------------------------
// Socket.IO
// ---------------------------------------------------------------------------

/// A Socket.IO packet carried inside an Engine.IO `message`.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        payload: Value,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Value,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
    /// Binary events and acks. Attachments are not supported by this client.
    Binary,
}

impl SocketPacket {
    /// Build a default-namespace event.
    pub fn event(name: &str, payload: Value) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.to_string(),
            payload,
        }
    }

    /// Decode a Socket.IO packet (the body of an Engine.IO `message`).
    pub fn decode(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let kind = chars.next().context("empty socket.io packet")?;
        if matches!(kind, '5' | '6') {
            return Ok(Self::Binary);
        }
        let mut rest = chars.as_str();

        let mut namespace = DEFAULT_NAMESPACE.to_string();
        if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            namespace = rest[..end].to_string();
            rest = rest.get(end + 1..).unwrap_or("");
        }

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack_id = if digits > 0 {
            Some(rest[..digits].parse::<u64>().context("ack id out of range")?)
        } else {
            None
        };
        let body = &rest[digits..];
        let data: Option<Value> = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_str(body).context("malformed socket.io packet body")?)
        };

        let packet = match kind {
            '0' => Self::Connect { namespace, data },
            '1' => Self::Disconnect { namespace },
            '2' => {
                let Some(Value::Array(mut args)) = data else {
                    bail!("socket.io event without an argument array");
                };
                if args.is_empty() {
                    bail!("socket.io event without a name");
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => bail!("socket.io event name is not a string: {other}"),
                };
                let payload = match args.len() {
                    0 => Value::Null,
                    1 => args.remove(0),
                    _ => Value::Array(args),
                };
                Self::Event {
                    namespace,
                    ack_id,
                    name,
                    payload,
                }
            }
            '3' => Self::Ack {
                namespace,
                ack_id: ack_id.context("socket.io ack without an id")?,
                args: data.unwrap_or(Value::Null),
            },
            '4' => {
                let message = match data {
                    Some(Value::Object(map)) => map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("connection refused")
                        .to_string(),
                    Some(Value::String(s)) => s,
                    _ => "connection refused".to_string(),
                };
                Self::ConnectError { namespace, message }
            }
            other => bail!("unknown socket.io packet type '{other}'"),
        };
        Ok(packet)
    }

    /// Encode this packet for the wire (without the Engine.IO `4` prefix).
    pub fn encode(&self) -> String {
        fn ns_prefix(namespace: &str) -> String {
            if namespace == DEFAULT_NAMESPACE {
                String::new()
            } else {
                format!("{namespace},")
            }
        }

        match self {
            Self::Connect { namespace, data } => {
                let body = data.as_ref().map(Value::to_string).unwrap_or_default();
                format!("0{}{body}", ns_prefix(namespace))
            }
            Self::Disconnect { namespace } => format!("1{}", ns_prefix(namespace)),
            Self::Event {
                namespace,
                ack_id,
                name,
                payload,
            } => {
                let args = if payload.is_null() {
                    serde_json::json!([name])
                } else {
                    serde_json::json!([name, payload])
                };
                let id = ack_id.map(|i| i.to_string()).unwrap_or_default();
                format!("2{}{id}{args}", ns_prefix(namespace))
            }
            Self::Ack {
                namespace,
                ack_id,
                args,
            } => format!("3{}{ack_id}{args}", ns_prefix(namespace)),
            Self::ConnectError { namespace, message } => format!(
                "4{}{}",
                ns_prefix(namespace),
                serde_json::json!({ "message": message })
            ),
            Self::Binary => String::new(),
        }
    }

    /// Wrap this packet in an Engine.IO message frame.
    pub fn to_engine(&self) -> EnginePacket {
        EnginePacket::Message(self.encode())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
