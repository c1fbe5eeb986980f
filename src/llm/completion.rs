/// OpenAI-compatible chat-completion client.
///
/// Uses the synchronous `ureq` client. Only non-streaming requests are made;
/// a reply is either natural-language content or a list of tool calls.
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Completer;
use super::tools::ToolSpec;
use crate::config::schema::CompletionConfig;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the outbound conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// The assistant turn that requested `calls`.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// A tool result, linked to the call that produced it.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Decode the argument string. An empty string means no arguments.
    pub fn parse_arguments(&self) -> Result<Value> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(raw).with_context(|| {
            format!(
                "malformed arguments for tool call {} ({})",
                self.id, self.function.name
            )
        })
    }
}

/// What the model answered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSpec]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Response body from `GET /models`.
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Synchronous chat-completion client.
#[derive(Debug)]
pub struct CompletionClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout: Option<Duration>,
}

impl CompletionClient {
    /// Build a client from the resolved config.
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: (!config.api_key.is_empty()).then(|| config.api_key.clone()),
            temperature: config.temperature,
            timeout: (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms)),
        }
    }

    fn url(&self, path: &str) -> String {
        // "localhost" may try IPv6 first while local servers bind IPv4 only.
        format!("{}{path}", self.base_url).replace("://localhost", "://127.0.0.1")
    }

    fn authorize(&self, req: ureq::Request) -> ureq::Request {
        match &self.api_key {
            Some(key) => req.set("Authorization", &format!("Bearer {key}")),
            None => req,
        }
    }

    /// Model ids served by the endpoint. Short timeout.
    pub fn list_models(&self) -> Result<Vec<String>> {
        let req = ureq::get(&self.url("/models")).timeout(Duration::from_secs(5));
        let resp = self
            .authorize(req)
            .call()
            .context("completion endpoint is unreachable")?;
        let models: ModelsResponse = resp.into_json().context("malformed models list")?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    /// Whether the endpoint answers and serves at least one model.
    pub fn is_healthy(&self) -> bool {
        self.list_models().is_ok_and(|models| !models.is_empty())
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

impl Completer for CompletionClient {
    fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> Result<AssistantReply> {
        let tools = tools.filter(|t| !t.is_empty());
        let body = ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice: tools.map(|_| "auto"),
            temperature: self.temperature,
            stream: false,
        };

        let mut req = ureq::post(&self.url("/chat/completions"));
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let resp = self.authorize(req).send_json(&body).map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let detail = resp.into_string().unwrap_or_default();
                anyhow!("completion endpoint returned HTTP {code}: {}", detail.trim())
            }
            other => anyhow!("completion request failed: {other}"),
        })?;

        let parsed: ChatResponse = resp
            .into_json()
            .context("failed to parse completion response")?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("completion response has no choices")?;

        let reply = AssistantReply {
            content: choice.message.content.filter(|c| !c.trim().is_empty()),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        };
        if reply.content.is_none() && reply.tool_calls.is_empty() {
            bail!("completion endpoint returned an empty reply");
        }
        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
