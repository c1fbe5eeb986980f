//! Language-model access for the energy assistant.
//!
//! The assistant talks to a locally hosted model through an OpenAI-compatible
//! `POST /chat/completions` endpoint (LM Studio, llama.cpp server, Ollama's
//! `/v1` shim, …). This module owns the wire types, the HTTP client, the
//! fixed system instruction, and the mapping between tool-server tool names
//! and the function names the completion endpoint accepts.
//!
//! The chat orchestrator depends only on the [`Completer`] trait so its
//! two-phase protocol can be exercised without a model.
use anyhow::Result;

pub mod completion;
pub mod prompts;
pub mod tools;

pub use completion::{AssistantReply, ChatMessage, CompletionClient, Role, ToolCall};
pub use tools::{ToolCatalog, ToolSpec};

/// One chat-completion round trip.
pub trait Completer {
    /// Send `messages`. When `tools` is `Some`, the model may answer with
    /// tool calls (`tool_choice: "auto"`); when `None`, no tools are offered.
    fn complete(&self, messages: &[ChatMessage], tools: Option<&[ToolSpec]>)
    -> Result<AssistantReply>;
}
