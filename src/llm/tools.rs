//! Tool descriptors in the completion endpoint's function format.
//!
//! OpenAI-compatible endpoints only accept function names matching
//! `^[a-zA-Z0-9_-]{1,64}$`. Tool-server names outside that grammar are
//! rewritten, de-duplicated, and mapped back when the model calls them.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::mcp::Tool;

/// Maximum function-name length accepted by the completion endpoint.
pub const MAX_FUNCTION_NAME: usize = 64;

static FUNCTION_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("function name regex must compile")
});

static INVALID_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("invalid char regex must compile"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// `{"type": "function", "function": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

/// Whether `name` is already a valid function name.
pub fn is_valid_function_name(name: &str) -> bool {
    FUNCTION_NAME_RE.is_match(name)
}

/// Map an arbitrary tool name into the function-name grammar.
pub fn sanitize_function_name(name: &str) -> String {
    if is_valid_function_name(name) {
        return name.to_string();
    }
    let mut cleaned = INVALID_CHAR_RE.replace_all(name, "_").into_owned();
    cleaned.truncate(MAX_FUNCTION_NAME);
    if cleaned.is_empty() {
        cleaned.push_str("tool");
    }
    cleaned
}

/// Tools offered to the model, plus the reverse name mapping.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    specs: Vec<ToolSpec>,
    originals: HashMap<String, String>,
}

impl ToolCatalog {
    pub fn from_tools(tools: &[Tool]) -> Self {
        let mut catalog = Self::default();
        for tool in tools {
            let base = sanitize_function_name(&tool.name);
            let mut name = base.clone();
            let mut n = 2;
            while catalog.originals.contains_key(&name) {
                let suffix = format!("_{n}");
                let keep = MAX_FUNCTION_NAME.saturating_sub(suffix.len()).min(base.len());
                name = format!("{}{suffix}", &base[..keep]);
                n += 1;
            }
            let parameters = tool
                .input_schema
                .clone()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
            catalog.specs.push(ToolSpec {
                kind: "function".to_string(),
                function: FunctionSpec {
                    name: name.clone(),
                    description: tool.description.clone(),
                    parameters,
                },
            });
            catalog.originals.insert(name, tool.name.clone());
        }
        catalog
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Tool-server name for a function name the model used. Unknown names
    /// pass through unchanged so the tool server can reject them.
    pub fn original_name<'a>(&'a self, function: &'a str) -> &'a str {
        self.originals
            .get(function)
            .map(String::as_str)
            .unwrap_or(function)
    }
}
