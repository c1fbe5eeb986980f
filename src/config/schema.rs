/// Configuration schema and defaults for the VoltGuard client.
///
/// Defines the TOML-serializable configuration structure with all sections:
/// `[socket]`, `[feed]`, `[notifications]`, `[completion]`, `[tools]`, and
/// `[logging]`.
///
/// Every field has a sensible built-in default. Users only need to set the
/// values they want to override.
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level VoltGuard configuration.
///
/// Maps directly to the `~/.voltguard/config.toml` and `.voltguard.toml`
/// file schemas. All sections and fields are optional — missing values fall
/// back to built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltGuardConfig {
    pub socket: SocketConfig,
    pub feed: FeedConfig,
    pub notifications: NotificationsConfig,
    pub completion: CompletionConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// [socket]
// ---------------------------------------------------------------------------

/// Transport kinds for the socket channel, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Full-duplex WebSocket (low latency).
    Websocket,
    /// HTTP long-polling (fallback).
    Polling,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Websocket => write!(f, "websocket"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

/// Socket channel settings (video feed and notifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Backend base URL (`http://` or `https://`).
    pub url: String,
    /// Socket.IO endpoint path.
    pub path: String,
    /// Transport preference order. The first one that completes a handshake wins.
    pub transports: Vec<TransportKind>,
    /// Handshake timeout per transport attempt.
    pub connect_timeout_ms: u64,
    /// Event pump tick. Bounds how late a listener timer can fire.
    pub tick_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            path: "/socket.io/".to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            connect_timeout_ms: 5000,
            tick_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// [feed]
// ---------------------------------------------------------------------------

/// Frame pull-loop retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Delay before re-requesting a frame after an `error` event.
    pub retry_interval_ms: u64,
    /// Maximum consecutive retries. `0` means unbounded.
    pub retry_max_attempts: u32,
    /// Multiplier applied to the delay after each consecutive error.
    pub retry_backoff: f64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 1000,
            retry_max_attempts: 0,
            retry_backoff: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// [notifications]
// ---------------------------------------------------------------------------

/// Notification list and banner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Number of notifications kept in the displayed list.
    pub max_displayed: usize,
    /// How long a banner stays visible.
    pub banner_ms: u64,
    /// Bound on remembered notification ids. `0` means unbounded.
    pub seen_capacity: usize,
    /// Whether to raise desktop alerts (terminal bell + highlighted line).
    pub desktop_alerts: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            max_displayed: 10,
            banner_ms: 5000,
            seen_capacity: 0,
            desktop_alerts: true,
        }
    }
}

// ---------------------------------------------------------------------------
// [completion]
// ---------------------------------------------------------------------------

/// OpenAI-compatible completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL up to and including the API version segment.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Optional bearer token. Local servers usually ignore it.
    pub api_key: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in milliseconds. `0` means none.
    pub timeout_ms: u64,
    /// Override for the built-in system instruction. Empty uses the default.
    pub system_prompt: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "qwen2.5-7b-instruct".to_string(),
            api_key: String::new(),
            temperature: 0.2,
            timeout_ms: 120_000,
            system_prompt: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// [tools]
// ---------------------------------------------------------------------------

/// MCP transport flavours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum McpTransportKind {
    /// Single endpoint, POST per request, JSON or SSE responses.
    #[default]
    StreamableHttp,
    /// Long-lived `GET /sse` stream plus a POST endpoint announced on it.
    Sse,
}

impl std::fmt::Display for McpTransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StreamableHttp => write!(f, "streamable-http"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

/// Tool server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tool server endpoint URL.
    pub url: String,
    /// Transport used to reach the tool server.
    pub transport: McpTransportKind,
    /// Per-call timeout in milliseconds. `0` means none.
    pub call_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/lou/mcp/sse".to_string(),
            transport: McpTransportKind::Sse,
            call_timeout_ms: 60_000,
        }
    }
}

// ---------------------------------------------------------------------------
// [logging]
// ---------------------------------------------------------------------------

/// Event log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether event logging is enabled.
    pub enabled: bool,
    /// Path to the event log file. `~` is expanded to the home directory.
    pub path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.voltguard/events.jsonl".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default TOML content
// ---------------------------------------------------------------------------

impl VoltGuardConfig {
    /// Generate the annotated default TOML config file content.
    ///
    /// Used by `voltguard config init` to create a starting config file with
    /// all settings documented.
    pub fn default_toml() -> String {
        r#"# VoltGuard client configuration
#
# Configuration hierarchy (highest precedence wins):
#   1. Environment variables (VOLTGUARD_*)
#   2. Project config (.voltguard.toml in current directory)
#   3. User global config (~/.voltguard/config.toml)
#   4. Built-in defaults

[socket]
url = "http://localhost:8000"
path = "/socket.io/"
transports = ["websocket", "polling"]
connect_timeout_ms = 5000
tick_ms = 100

[feed]
retry_interval_ms = 1000
retry_max_attempts = 0     # 0 = retry forever
retry_backoff = 1.0        # 1.0 = fixed delay

[notifications]
max_displayed = 10
banner_ms = 5000
seen_capacity = 0          # 0 = remember every id for the session
desktop_alerts = true

[completion]
base_url = "http://localhost:1234/v1"
model = "qwen2.5-7b-instruct"
api_key = ""
temperature = 0.2
timeout_ms = 120000
system_prompt = ""         # empty = built-in energy assistant instruction

[tools]
url = "http://localhost:8000/lou/mcp/sse"
transport = "sse"          # sse | streamable-http
call_timeout_ms = 60000    # 0 = wait forever

[logging]
enabled = true
path = "~/.voltguard/events.jsonl"
"#
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
