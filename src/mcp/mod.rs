//! Tool discovery and invocation over the Model Context Protocol.

pub mod client;
pub mod protocol;
pub mod sse;
pub mod transport;

use anyhow::Result;
use serde_json::Value;

pub use client::McpClient;
pub use protocol::Tool;

/// What the chat orchestrator needs from a tool server.
pub trait ToolInvoker {
    fn is_connected(&self) -> bool;

    /// Tools discovered when the connection was made.
    fn tools(&self) -> &[Tool];

    /// Call a tool and return its text output.
    fn execute_tool(&mut self, name: &str, arguments: Value) -> Result<String>;
}
