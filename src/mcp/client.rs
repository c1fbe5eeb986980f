/// MCP client: connect once, list tools once, invoke tools on demand.
///
/// The tool list is fetched during [`McpClient::connect`] and cached for the
/// lifetime of the connection. A client that failed to connect is
/// represented by [`McpClient::offline`] and reports `is_connected() ==
/// false`, which the chat orchestrator checks before every turn.
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};

use super::ToolInvoker;
use super::protocol::{
    self, CallToolResult, InitializeResult, ListToolsResult, ServerInfo, Tool,
};
use super::transport::{McpTransport, SseTransport, StreamableHttpTransport};
use crate::config::schema::{McpTransportKind, ToolsConfig};

/// Time allowed for connection setup, `initialize` and `tools/list`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on `tools/list` pages followed.
const MAX_TOOL_PAGES: usize = 32;

pub struct McpClient {
    transport: Option<Box<dyn McpTransport>>,
    next_id: u64,
    tools: Vec<Tool>,
    server_info: Option<ServerInfo>,
    call_timeout: Option<Duration>,
}

impl McpClient {
    /// Connect using the configured transport, initialize, and list tools.
    pub fn connect(config: &ToolsConfig) -> Result<Self> {
        let transport: Box<dyn McpTransport> = match config.transport {
            McpTransportKind::StreamableHttp => {
                Box::new(StreamableHttpTransport::new(&config.url, HANDSHAKE_TIMEOUT))
            }
            McpTransportKind::Sse => Box::new(
                SseTransport::connect(&config.url, HANDSHAKE_TIMEOUT)
                    .with_context(|| format!("failed to open tool stream at {}", config.url))?,
            ),
        };
        let call_timeout =
            (config.call_timeout_ms > 0).then(|| Duration::from_millis(config.call_timeout_ms));
        Self::with_transport(transport, call_timeout)
    }

    /// Run the handshake over an already-open transport.
    pub fn with_transport(
        transport: Box<dyn McpTransport>,
        call_timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut client = Self {
            transport: Some(transport),
            next_id: 1,
            tools: Vec::new(),
            server_info: None,
            call_timeout,
        };
        client.initialize()?;
        client.tools = client.list_tools()?;
        Ok(client)
    }

    /// A client with no connection. Every call fails.
    pub fn offline() -> Self {
        Self {
            transport: None,
            next_id: 1,
            tools: Vec::new(),
            server_info: None,
            call_timeout: None,
        }
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    fn call(&mut self, method: &str, params: Value, timeout: Option<Duration>) -> Result<Value> {
        let Some(transport) = self.transport.as_mut() else {
            bail!("not connected to a tool server");
        };
        let id = self.next_id;
        self.next_id += 1;
        transport
            .request(id, &protocol::request(id, method, params), timeout)
            .with_context(|| format!("{method} failed"))?
            .into_result()
    }

    fn initialize(&mut self) -> Result<()> {
        let version = match self.transport.as_ref() {
            Some(t) => t.protocol_version(),
            None => bail!("not connected to a tool server"),
        };
        let result = self.call(
            "initialize",
            protocol::initialize_params(version),
            Some(HANDSHAKE_TIMEOUT),
        )?;
        let init: InitializeResult =
            serde_json::from_value(result).context("malformed initialize result")?;
        self.server_info = init.server_info;
        if let Some(transport) = self.transport.as_mut() {
            transport.notify(&protocol::notification("notifications/initialized"))?;
        }
        Ok(())
    }

    fn list_tools(&mut self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_TOOL_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.call("tools/list", params, Some(HANDSHAKE_TIMEOUT))?;
            let page: ListToolsResult =
                serde_json::from_value(result).context("malformed tools/list result")?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
        Ok(tools)
    }

    /// Release the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

impl ToolInvoker for McpClient {
    fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Returns the first text item of the result. A result flagged
    /// `isError`, or one without text content, is an error.
    fn execute_tool(&mut self, name: &str, arguments: Value) -> Result<String> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let timeout = self.call_timeout;
        let result = self.call(
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
            timeout,
        )?;
        let result: CallToolResult =
            serde_json::from_value(result).context("malformed tools/call result")?;
        let text = result.first_text().map(str::to_string);
        match (result.is_error, text) {
            (true, Some(text)) => bail!("tool {name} failed: {text}"),
            (true, None) => bail!("tool {name} failed"),
            (false, Some(text)) => Ok(text),
            (false, None) => bail!("tool {name} returned no text content"),
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::RpcMessage;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replies to each request with the next scripted result.
    struct ScriptedTransport {
        replies: VecDeque<Value>,
        log: Arc<Mutex<Vec<Value>>>,
    }

    impl McpTransport for ScriptedTransport {
        fn request(&mut self, id: u64, body: &Value, _timeout: Option<Duration>) -> Result<RpcMessage> {
            self.log.lock().unwrap().push(body.clone());
            let mut reply = self.replies.pop_front().expect("unexpected request");
            reply["id"] = json!(id);
            reply["jsonrpc"] = json!("2.0");
            Ok(serde_json::from_value(reply)?)
        }
        fn notify(&mut self, body: &Value) -> Result<()> {
            self.log.lock().unwrap().push(body.clone());
            Ok(())
        }
        fn protocol_version(&self) -> &'static str {
            protocol::SSE_PROTOCOL_VERSION
        }
        fn close(&mut self) {
            self.log.lock().unwrap().push(json!("closed"));
        }
    }

    fn client(replies: Vec<Value>) -> (Result<McpClient>, Arc<Mutex<Vec<Value>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            replies: replies.into(),
            log: Arc::clone(&log),
        };
        (McpClient::with_transport(Box::new(transport), None), log)
    }

    fn init_reply() -> Value {
        json!({"result": {"protocolVersion": "2024-11-05", "serverInfo": {"name": "EnergyDatabase", "version": "1.0"}}})
    }

    #[test]
    fn connect_initializes_and_follows_tool_pages() {
        let (client, log) = client(vec![
            init_reply(),
            json!({"result": {"tools": [{"name": "get_recent_logs"}], "nextCursor": "p2"}}),
            json!({"result": {"tools": [{"name": "get_top_offending_devices"}]}}),
        ]);
        let client = client.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.server_info().unwrap().name, "EnergyDatabase");
        let names: Vec<_> = client.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["get_recent_logs", "get_top_offending_devices"]);

        let log = log.lock().unwrap();
        assert_eq!(log[0]["method"], "initialize");
        assert_eq!(log[1]["method"], "notifications/initialized");
        assert!(log[1].get("id").is_none());
        assert_eq!(log[3]["params"]["cursor"], "p2");
    }

    #[test]
    fn execute_tool_returns_first_text() {
        let (client, log) = client(vec![
            init_reply(),
            json!({"result": {"tools": []}}),
            json!({"result": {"content": [{"type": "text", "text": "[{\"device\": \"lamp\"}]"}]}}),
        ]);
        let mut client = client.unwrap();
        let out = client
            .execute_tool("get_top_offending_devices", json!({"limit": 3}))
            .unwrap();
        assert_eq!(out, "[{\"device\": \"lamp\"}]");
        let log = log.lock().unwrap();
        assert_eq!(log[3]["params"]["name"], "get_top_offending_devices");
        assert_eq!(log[3]["params"]["arguments"]["limit"], 3);
    }

    #[test]
    fn tool_error_results_are_errors() {
        let (client, _) = client(vec![
            init_reply(),
            json!({"result": {"tools": []}}),
            json!({"result": {"content": [{"type": "text", "text": "db down"}], "isError": true}}),
            json!({"result": {"content": []}}),
            json!({"error": {"code": -32602, "message": "Unknown tool"}}),
        ]);
        let mut client = client.unwrap();
        let err = client.execute_tool("a", Value::Null).unwrap_err();
        assert!(format!("{err:#}").contains("db down"));
        assert!(client.execute_tool("b", Value::Null).is_err());
        let err = client.execute_tool("c", Value::Null).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown tool"));
    }

    #[test]
    fn failed_initialize_fails_connect() {
        let (client, _) = client(vec![json!({"error": {"code": -32603, "message": "boom"}})]);
        assert!(client.is_err());
    }

    #[test]
    fn offline_client_refuses_calls() {
        let mut client = McpClient::offline();
        assert!(!client.is_connected());
        assert!(client.tools().is_empty());
        assert!(client.execute_tool("x", json!({})).is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let (client, log) = client(vec![init_reply(), json!({"result": {"tools": []}})]);
        let mut client = client.unwrap();
        client.close();
        client.close();
        drop(client);
        let closes = log
            .lock()
            .unwrap()
            .iter()
            .filter(|v| **v == json!("closed"))
            .count();
        assert_eq!(closes, 1);
    }
}
